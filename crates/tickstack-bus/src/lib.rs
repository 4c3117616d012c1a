//! Tickstack event bus.
//!
//! A publish/subscribe mediator with a FIFO queue. Producers on any thread
//! `emit`; the owning thread `drain`s under an iteration cap and dispatches
//! to exact-name subscribers first, then wildcard subscribers.

mod bus;
mod stats;
mod subscription;

pub use bus::{EventBus, WeakEventBus};
pub use stats::{BusStats, DrainOutcome, SlowHandler};
pub use subscription::{Subscription, SubscriptionId};
