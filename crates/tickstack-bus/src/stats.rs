//! Bus counters and drain results.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::subscription::SubscriptionId;

/// One callback invocation that exceeded the slow-handler threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowHandler {
    /// Event type being dispatched.
    pub event_type: String,
    /// The registration that was slow.
    pub subscription: SubscriptionId,
    /// Time spent in the callback.
    pub elapsed: Duration,
}

/// Process-wide bus counters. Only [`crate::EventBus::reset_stats`] clears them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events dispatched, deferred and immediate.
    pub events_processed: u64,
    /// Events dispatched per event type.
    pub events_by_type: HashMap<String, u64>,
    /// Most recent slow-handler observations, oldest first.
    pub slow_handlers: VecDeque<SlowHandler>,
    /// Callbacks that returned an error or panicked.
    pub handler_faults: u64,
    /// Drains that came close to their cap while events were still queued.
    pub near_cap_warnings: u64,
    /// Drains that hit their cap with events still queued.
    pub backlog_warnings: u64,
    /// Events that waited in the queue longer than the stale threshold.
    pub stale_events: u64,
}

impl BusStats {
    pub(crate) fn record_dispatch(&mut self, event_type: &str) {
        self.events_processed += 1;
        *self.events_by_type.entry(event_type.to_owned()).or_insert(0) += 1;
    }

    pub(crate) fn record_slow(&mut self, observation: SlowHandler, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.slow_handlers.len() >= capacity {
            self.slow_handlers.pop_front();
        }
        self.slow_handlers.push_back(observation);
    }

    /// Returns the number of dispatches recorded for `event_type`.
    #[must_use]
    pub fn count_for(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }
}

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Events dispatched by this pass.
    pub processed: usize,
    /// Events still queued when the pass returned.
    pub backlog: usize,
}

impl DrainOutcome {
    /// Returns `true` if the cap stopped the pass before the queue emptied.
    #[must_use]
    pub fn backlog_remaining(&self) -> bool {
        self.backlog > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(n: u64) -> SlowHandler {
        SlowHandler {
            event_type: "tick".to_owned(),
            subscription: SubscriptionId(n),
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_record_slow_keeps_most_recent_within_capacity() {
        let mut stats = BusStats::default();

        for n in 0..5 {
            stats.record_slow(observation(n), 3);
        }

        let ids: Vec<u64> = stats.slow_handlers.iter().map(|s| s.subscription.0).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_record_dispatch_counts_per_type() {
        let mut stats = BusStats::default();

        stats.record_dispatch("tick");
        stats.record_dispatch("tick");
        stats.record_dispatch("X");

        assert_eq!(stats.events_processed, 3);
        assert_eq!(stats.count_for("tick"), 2);
        assert_eq!(stats.count_for("X"), 1);
        assert_eq!(stats.count_for("missing"), 0);
    }
}
