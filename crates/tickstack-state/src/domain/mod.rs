//! Domain layer: the state stack and its persistence model.

pub mod registry;
pub mod snapshot;
pub mod stack;
