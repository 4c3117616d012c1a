//! Tickstack Core — shared runtime abstractions.
//!
//! This crate defines the event model, the active-state traits, the clock
//! seam and the configuration surface that the bus, the state machine and
//! the scheduler all depend on. It contains no dispatch logic.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod state;
