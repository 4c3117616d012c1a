//! The event bus.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tickstack_core::clock::{Clock, elapsed_between};
use tickstack_core::config::BusConfig;
use tickstack_core::error::HandlerError;
use tickstack_core::event::{Event, EventKind, EventMetadata, WILDCARD};
use tickstack_core::state::EventSink;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::stats::{BusStats, DrainOutcome, SlowHandler};
use crate::subscription::{Callback, Registration, Subscription, SubscriptionId};

#[derive(Default)]
struct EventQueue {
    events: VecDeque<Event>,
    next_sequence: u64,
}

pub(crate) struct BusInner {
    clock: Arc<dyn Clock>,
    config: BusConfig,
    subscribers: Mutex<HashMap<String, Vec<Registration>>>,
    queue: Mutex<EventQueue>,
    stats: Mutex<BusStats>,
    next_subscription: AtomicU64,
}

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Callbacks never run under these locks, so a poisoned guard can only come
/// from a panic inside the bus bookkeeping itself; the data is still valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BusInner {
    pub(crate) fn remove_registration(&self, event_type: &str, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let Some(list) = subscribers.get_mut(event_type) else {
            return false;
        };
        let Some(position) = list.iter().position(|r| r.id == id) else {
            return false;
        };
        list.remove(position);
        if list.is_empty() {
            subscribers.remove(event_type);
        }
        trace!(event_type, subscription = %id, "unsubscribed");
        true
    }

    fn stamp(&self, kind: EventKind, sequence_number: u64) -> Event {
        Event {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                sequence_number,
                emitted_at: self.clock.now(),
            },
            kind,
        }
    }

    fn enqueue(&self, kind: EventKind) {
        let mut queue = lock(&self.queue);
        let sequence_number = queue.next_sequence;
        queue.next_sequence += 1;
        let event = self.stamp(kind, sequence_number);
        trace!(event_type = event.event_type(), sequence_number, "event queued");
        queue.events.push_back(event);
    }

    fn next_immediate(&self, kind: EventKind) -> Event {
        let mut queue = lock(&self.queue);
        let sequence_number = queue.next_sequence;
        queue.next_sequence += 1;
        drop(queue);
        self.stamp(kind, sequence_number)
    }

    /// Copies the matching registrations: exact-name first, then wildcard.
    fn matching(&self, event_type: &str) -> Vec<Registration> {
        let subscribers = lock(&self.subscribers);
        let exact = subscribers.get(event_type).into_iter().flatten();
        let wildcard = if event_type == WILDCARD {
            None
        } else {
            subscribers.get(WILDCARD)
        };
        exact.chain(wildcard.into_iter().flatten()).cloned().collect()
    }

    fn dispatch(&self, event: &Event) {
        let event_type = event.event_type();
        let registrations = self.matching(event_type);
        let threshold = self.config.slow_handler_threshold();

        for registration in registrations {
            let started = self.clock.now();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| (registration.callback)(event)));
            let elapsed = elapsed_between(started, self.clock.now());

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        event_type,
                        subscription = %registration.id,
                        error = %err,
                        "event handler failed"
                    );
                    lock(&self.stats).handler_faults += 1;
                }
                Err(payload) => {
                    error!(
                        event_type,
                        subscription = %registration.id,
                        panic = %panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                    lock(&self.stats).handler_faults += 1;
                }
            }

            if elapsed > threshold {
                warn!(
                    event_type,
                    subscription = %registration.id,
                    elapsed = ?elapsed,
                    "slow event handler"
                );
                lock(&self.stats).record_slow(
                    SlowHandler {
                        event_type: event_type.to_owned(),
                        subscription: registration.id,
                        elapsed,
                    },
                    self.config.slow_handler_history,
                );
            }
        }

        lock(&self.stats).record_dispatch(event_type);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Publish/subscribe mediator with a deferred FIFO queue.
///
/// Cloning is cheap and every clone addresses the same bus. `emit` may be
/// called from any thread; `drain` and `emit_immediate` run callbacks on the
/// calling thread and are meant for the scheduler thread.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus stamping events with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, config: BusConfig) -> Self {
        debug!(?config, "event bus initialized");
        Self {
            inner: Arc::new(BusInner {
                clock,
                config,
                subscribers: Mutex::new(HashMap::new()),
                queue: Mutex::new(EventQueue::default()),
                stats: Mutex::new(BusStats::default()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Returns the clock used to stamp events.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    /// Registers `callback` for `event_type` (or [`WILDCARD`]).
    ///
    /// Callbacks for the same name run in registration order. The returned
    /// handle removes exactly this registration.
    pub fn subscribe<F>(&self, event_type: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let callback: Callback = Arc::new(callback);
        lock(&self.inner.subscribers)
            .entry(event_type.clone())
            .or_default()
            .push(Registration { id, callback });
        trace!(event_type = %event_type, subscription = %id, "subscribed");
        Subscription::new(Arc::downgrade(&self.inner), event_type, id)
    }

    /// Enqueues an event for the next drain. Never dispatches and never
    /// waits on dispatch.
    pub fn emit(&self, kind: EventKind) {
        self.inner.enqueue(kind);
    }

    /// Dispatches an event synchronously on the calling thread, bypassing
    /// the queue.
    pub fn emit_immediate(&self, kind: EventKind) {
        let event = self.inner.next_immediate(kind);
        trace!(event_type = event.event_type(), "immediate dispatch");
        self.inner.dispatch(&event);
    }

    /// Dispatches up to `max_iterations` queued events in FIFO order.
    ///
    /// Events enqueued by callbacks during the pass are eligible while the
    /// cap allows. Returns early when the queue empties; the outcome reports
    /// how many events were dispatched and how many remain queued.
    pub fn drain(&self, max_iterations: usize) -> DrainOutcome {
        let approaching_at =
            approaching_threshold(max_iterations, self.inner.config.approaching_cap_ratio);
        let stale_after = self.inner.config.stale_event_threshold();
        let mut processed = 0;
        let mut warned_approaching = false;

        while processed < max_iterations {
            let Some(event) = lock(&self.inner.queue).events.pop_front() else {
                break;
            };

            let waited = elapsed_between(event.metadata.emitted_at, self.inner.clock.now());
            if waited > stale_after {
                warn!(
                    event_type = event.event_type(),
                    waited = ?waited,
                    "stale event dispatched"
                );
                lock(&self.inner.stats).stale_events += 1;
            }

            self.inner.dispatch(&event);
            processed += 1;

            if !warned_approaching
                && processed >= approaching_at
                && processed < max_iterations
                && self.pending() > 0
            {
                warn!(
                    processed,
                    cap = max_iterations,
                    "drain approaching iteration cap; possible event amplification"
                );
                lock(&self.inner.stats).near_cap_warnings += 1;
                warned_approaching = true;
            }
        }

        let backlog = self.pending();
        if backlog > 0 && processed >= max_iterations {
            warn!(
                processed,
                cap = max_iterations,
                backlog,
                "drain cap reached with backlog remaining"
            );
            lock(&self.inner.stats).backlog_warnings += 1;
        }

        DrainOutcome { processed, backlog }
    }

    /// Drains with the configured default cap.
    pub fn drain_pending(&self) -> DrainOutcome {
        self.drain(self.inner.config.default_drain_cap)
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.inner.queue).events.len()
    }

    /// Returns the number of registrations for exactly `event_type`.
    #[must_use]
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        lock(&self.inner.subscribers).get(event_type).map_or(0, Vec::len)
    }

    /// Returns `true` if `event_type` has an entry in the subscriber table.
    #[must_use]
    pub fn has_subscribers(&self, event_type: &str) -> bool {
        lock(&self.inner.subscribers).contains_key(event_type)
    }

    /// Returns a copy of the counters.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        lock(&self.inner.stats).clone()
    }

    /// Clears the counters.
    pub fn reset_stats(&self) {
        *lock(&self.inner.stats) = BusStats::default();
    }

    /// Returns a handle that does not keep the bus alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn approaching_threshold(cap: usize, ratio: f64) -> usize {
    ((cap as f64) * ratio).ceil() as usize
}

impl EventSink for EventBus {
    fn emit(&self, kind: EventKind) {
        EventBus::emit(self, kind);
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.pending())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Non-owning bus handle for callbacks and states registered on the same
/// bus, so that they do not keep it alive.
#[derive(Clone)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    /// Returns the bus if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

impl EventSink for WeakEventBus {
    fn emit(&self, kind: EventKind) {
        match self.upgrade() {
            Some(bus) => bus.emit(kind),
            None => debug!(event_type = kind.event_type(), "event dropped: bus is gone"),
        }
    }
}

impl fmt::Debug for WeakEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEventBus")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
