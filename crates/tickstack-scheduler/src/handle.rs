//! Cross-thread scheduler control.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tickstack_bus::WeakEventBus;
use tickstack_core::event::EventKind;
use tickstack_core::state::EventSink;
use tracing::{debug, info};

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;

/// Lifecycle phase of a [`crate::Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Not running; `run` may be called.
    Stopped,
    /// Producing frames.
    Running,
    /// Shutdown observed; the current frame is the last one.
    Stopping,
}

impl SchedulerPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            RUNNING => Self::Running,
            STOPPING => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

/// Shared phase cell.
#[derive(Debug, Clone, Default)]
pub(crate) struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    pub(crate) fn get(&self) -> SchedulerPhase {
        SchedulerPhase::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Stopped → Running. Returns the phase found on failure.
    pub(crate) fn start(&self) -> Result<(), SchedulerPhase> {
        self.0
            .compare_exchange(STOPPED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(SchedulerPhase::from_u8)
    }

    /// Running → Stopping. Returns `false` if the scheduler was not running.
    pub(crate) fn request_stop(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, STOPPING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn stopped(&self) {
        self.0.store(STOPPED, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn force_running(&self) {
        self.0.store(RUNNING, Ordering::SeqCst);
    }
}

/// Cloneable control handle, usable from any thread or a signal handler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    pub(crate) bus: WeakEventBus,
    pub(crate) phase: PhaseCell,
}

impl SchedulerHandle {
    /// Returns the scheduler's current phase.
    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        self.phase.get()
    }

    /// Returns `true` while frames are being produced.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase() == SchedulerPhase::Running
    }

    /// Requests a graceful stop by emitting a deferred `Shutdown`. The
    /// scheduler finishes its current frame first.
    ///
    /// Returns `false` (and emits nothing) if the scheduler is not running.
    pub fn shutdown(&self) -> bool {
        if !self.is_running() {
            debug!(phase = %self.phase(), "shutdown ignored: scheduler not running");
            return false;
        }
        info!("scheduler shutdown requested");
        self.bus.emit(EventKind::Shutdown);
        true
    }
}
