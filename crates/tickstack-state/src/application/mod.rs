//! Application layer: transition handlers, persistence and the bus adapter.

pub mod adapter;
pub mod persistence;
pub mod transition_handlers;
