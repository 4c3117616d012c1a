//! Tickstack state machine.
//!
//! Holds the stack of active states and the transition adapter, the only
//! component allowed to mutate it. States ask for transitions by emitting
//! `PushState`, `PopState` or `ChangeState` on the bus; the adapter applies
//! them and announces the result with `EnterState`/`ExitState`.

pub mod application;
pub mod domain;

pub use application::adapter::StateTransitionAdapter;
pub use domain::registry::StateRegistry;
pub use domain::snapshot::{SNAPSHOT_FORMAT_VERSION, SnapshotEntry, StackSnapshot};
pub use domain::stack::StateStack;
