//! Runtime configuration.
//!
//! Defaults match the values the runtime was tuned for: 60 frames per second,
//! 100 events drained per frame, 1000 per bare drain, a 4ms slow-handler
//! threshold and a 100ms stale-event threshold.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Environment variable for [`SchedulerConfig::target_fps`].
pub const TARGET_FPS_VAR: &str = "TICKSTACK_TARGET_FPS";
/// Environment variable for [`SchedulerConfig::max_iterations_per_frame`].
pub const FRAME_DRAIN_CAP_VAR: &str = "TICKSTACK_FRAME_DRAIN_CAP";
/// Environment variable for [`BusConfig::default_drain_cap`].
pub const DRAIN_CAP_VAR: &str = "TICKSTACK_DRAIN_CAP";
/// Environment variable for [`BusConfig::slow_handler_threshold_ms`].
pub const SLOW_HANDLER_MS_VAR: &str = "TICKSTACK_SLOW_HANDLER_MS";
/// Environment variable for [`BusConfig::stale_event_threshold_ms`].
pub const STALE_EVENT_MS_VAR: &str = "TICKSTACK_STALE_EVENT_MS";

/// Event bus tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Cap used by a drain call that does not specify one.
    pub default_drain_cap: usize,
    /// Callbacks slower than this are recorded as slow handlers.
    pub slow_handler_threshold_ms: u64,
    /// Events queued longer than this are logged as stale when dispatched.
    pub stale_event_threshold_ms: u64,
    /// Number of slow-handler observations retained.
    pub slow_handler_history: usize,
    /// Fraction of the drain cap at which an "approaching cap" warning fires.
    pub approaching_cap_ratio: f64,
}

impl BusConfig {
    /// Returns the slow-handler threshold as a duration.
    #[must_use]
    pub fn slow_handler_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_handler_threshold_ms)
    }

    /// Returns the stale-event threshold as a duration.
    #[must_use]
    pub fn stale_event_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_event_threshold_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_drain_cap: 1000,
            slow_handler_threshold_ms: 4,
            stale_event_threshold_ms: 100,
            slow_handler_history: 64,
            approaching_cap_ratio: 0.9,
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Target frames per second.
    pub target_fps: u32,
    /// Maximum events drained per frame.
    pub max_iterations_per_frame: usize,
    /// Overruns smaller than this are not reported.
    pub overrun_tolerance_ms: u64,
}

impl SchedulerConfig {
    /// Returns the target duration of one frame.
    #[must_use]
    pub fn target_frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.target_fps.max(1)))
    }

    /// Returns the overrun tolerance as a duration.
    #[must_use]
    pub fn overrun_tolerance(&self) -> Duration {
        Duration::from_millis(self.overrun_tolerance_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            max_iterations_per_frame: 100,
            overrun_tolerance_ms: 2,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Event bus tuning.
    pub bus: BusConfig,
    /// Scheduler tuning.
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    /// Reads configuration overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if a variable is set but unparseable, or
    /// the resulting configuration fails validation.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration overrides through `lookup`, starting from the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` if a value is unparseable or the
    /// resulting configuration fails validation.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let mut config = Self::default();
        if let Some(fps) = parse_var(&lookup, TARGET_FPS_VAR)? {
            config.scheduler.target_fps = fps;
        }
        if let Some(cap) = parse_var(&lookup, FRAME_DRAIN_CAP_VAR)? {
            config.scheduler.max_iterations_per_frame = cap;
        }
        if let Some(cap) = parse_var(&lookup, DRAIN_CAP_VAR)? {
            config.bus.default_drain_cap = cap;
        }
        if let Some(ms) = parse_var(&lookup, SLOW_HANDLER_MS_VAR)? {
            config.bus.slow_handler_threshold_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, STALE_EVENT_MS_VAR)? {
            config.bus.stale_event_threshold_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` naming the first invalid value.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scheduler.target_fps == 0 {
            return Err(CoreError::Config("target_fps must be positive".into()));
        }
        if self.scheduler.max_iterations_per_frame == 0 {
            return Err(CoreError::Config(
                "max_iterations_per_frame must be positive".into(),
            ));
        }
        if self.bus.default_drain_cap == 0 {
            return Err(CoreError::Config("default_drain_cap must be positive".into()));
        }
        if !(self.bus.approaching_cap_ratio > 0.0 && self.bus.approaching_cap_ratio <= 1.0) {
            return Err(CoreError::Config(
                "approaching_cap_ratio must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, CoreError>
where
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| CoreError::Config(format!("{key} must be a number: {e}")))
        })
        .transpose()
}
