//! Tickstack scheduler.
//!
//! Turns wall-clock time into frames: each frame emits a `Tick`, drains the
//! bus under a per-frame budget and sleeps off whatever is left of the
//! target frame duration.

mod handle;
mod scheduler;

pub use handle::{SchedulerHandle, SchedulerPhase};
pub use scheduler::{RunSummary, Scheduler};
