//! Shared test doubles and utilities for the Tickstack runtime.

mod clock;
mod recorder;
mod state;

pub use clock::{FixedClock, ManualClock};
pub use recorder::{EventRecorder, RecordingSink};
pub use state::{
    EmptyFactory, FailingFactory, LifecycleCall, LifecycleLog, RecordingFactory, RecordingState,
};
