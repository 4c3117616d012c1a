//! The frame loop.

use std::fmt;
use std::sync::Arc;

use tickstack_bus::{EventBus, Subscription};
use tickstack_core::clock::{Clock, elapsed_between};
use tickstack_core::config::SchedulerConfig;
use tickstack_core::error::CoreError;
use tickstack_core::event::{EventKind, SHUTDOWN, TransitionRequest};
use tracing::{debug, info, warn};

use crate::handle::{PhaseCell, SchedulerHandle, SchedulerPhase};

/// What a finished run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Frames executed.
    pub frames: u64,
    /// Frames that overran the target duration by more than the tolerance.
    pub overruns: u64,
    /// Frames that ended with events still queued.
    pub backlog_frames: u64,
}

/// Drives the bus at a fixed target frame rate.
pub struct Scheduler {
    bus: EventBus,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    phase: PhaseCell,
}

/// Announces termination exactly once, however the loop exits.
struct TerminationGuard<'a> {
    bus: &'a EventBus,
    phase: &'a PhaseCell,
    shutdown_listener: Subscription,
}

impl Drop for TerminationGuard<'_> {
    fn drop(&mut self) {
        self.shutdown_listener.unsubscribe();
        self.bus.emit_immediate(EventKind::Shutdown);
        self.phase.stopped();
    }
}

impl Scheduler {
    /// Creates a stopped scheduler.
    #[must_use]
    pub fn new(bus: EventBus, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            bus,
            clock,
            config,
            phase: PhaseCell::default(),
        }
    }

    /// Returns a handle for querying and stopping the scheduler.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            bus: self.bus.downgrade(),
            phase: self.phase.clone(),
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        self.phase.get()
    }

    /// Requests a graceful stop. See [`SchedulerHandle::shutdown`].
    pub fn shutdown(&self) -> bool {
        self.handle().shutdown()
    }

    /// Runs until shutdown is requested or the state stack empties.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::SchedulerState` if the scheduler is not stopped.
    pub fn run(&self, initial: Option<TransitionRequest>) -> Result<RunSummary, CoreError> {
        self.run_loop(initial, None)
    }

    /// Runs at most `frames` frames.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::SchedulerState` if the scheduler is not stopped.
    pub fn run_frames(
        &self,
        initial: Option<TransitionRequest>,
        frames: u64,
    ) -> Result<RunSummary, CoreError> {
        self.run_loop(initial, Some(frames))
    }

    fn run_loop(
        &self,
        initial: Option<TransitionRequest>,
        frame_limit: Option<u64>,
    ) -> Result<RunSummary, CoreError> {
        self.phase.start().map_err(|found| {
            CoreError::SchedulerState(format!("cannot start a scheduler that is {found}"))
        })?;

        let phase = self.phase.clone();
        let shutdown_listener = self.bus.subscribe(SHUTDOWN, move |_| {
            if phase.request_stop() {
                debug!("shutdown observed; finishing current frame");
            }
            Ok(())
        });
        let _guard = TerminationGuard {
            bus: &self.bus,
            phase: &self.phase,
            shutdown_listener,
        };

        let frame_budget = self.config.target_frame_duration();
        let tolerance = self.config.overrun_tolerance();
        info!(
            target_fps = self.config.target_fps,
            frame_limit = ?frame_limit,
            "scheduler started"
        );

        if let Some(request) = initial {
            self.bus.emit_immediate(EventKind::PushState(request));
        }
        self.bus.emit(EventKind::Init);

        let mut summary = RunSummary::default();
        let mut previous = self.clock.now();
        while self.phase.get() == SchedulerPhase::Running
            && frame_limit.is_none_or(|limit| summary.frames < limit)
        {
            let frame_start = self.clock.now();
            let dt = elapsed_between(previous, frame_start);
            previous = frame_start;

            self.bus.emit(EventKind::Tick { dt });
            let outcome = self.bus.drain(self.config.max_iterations_per_frame);
            summary.frames += 1;
            if outcome.backlog_remaining() {
                summary.backlog_frames += 1;
                warn!(
                    frame = summary.frames,
                    processed = outcome.processed,
                    backlog = outcome.backlog,
                    "frame ended with events still queued"
                );
            }

            let elapsed = elapsed_between(frame_start, self.clock.now());
            match frame_budget.checked_sub(elapsed) {
                Some(remaining) if !remaining.is_zero() => self.clock.sleep(remaining),
                Some(_) => {}
                None => {
                    let overrun = elapsed.saturating_sub(frame_budget);
                    if overrun > tolerance {
                        summary.overruns += 1;
                        warn!(
                            frame = summary.frames,
                            elapsed = ?elapsed,
                            budget = ?frame_budget,
                            "frame overrun"
                        );
                    }
                }
            }
        }

        info!(
            frames = summary.frames,
            overruns = summary.overruns,
            backlog_frames = summary.backlog_frames,
            "scheduler stopped"
        );
        Ok(summary)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("phase", &self.phase.get())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
