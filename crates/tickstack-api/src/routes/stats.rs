//! Routes for bus statistics.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tickstack_bus::{BusStats, SlowHandler};
use tracing::{info, instrument};

use crate::state::AppState;

/// One slow callback invocation.
#[derive(Debug, Serialize)]
pub struct SlowHandlerResponse {
    /// Event type being dispatched.
    pub event_type: String,
    /// Subscription that was slow.
    pub subscription: u64,
    /// Time spent in the callback, in milliseconds.
    pub elapsed_ms: f64,
}

impl From<&SlowHandler> for SlowHandlerResponse {
    #[allow(clippy::cast_precision_loss)]
    fn from(observation: &SlowHandler) -> Self {
        Self {
            event_type: observation.event_type.clone(),
            subscription: observation.subscription.0,
            elapsed_ms: observation.elapsed.as_micros() as f64 / 1000.0,
        }
    }
}

/// Response body for GET /.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Events dispatched since the last reset.
    pub events_processed: u64,
    /// Dispatch counts by event type.
    pub events_by_type: BTreeMap<String, u64>,
    /// Most recent slow callbacks, oldest first.
    pub slow_handlers: Vec<SlowHandlerResponse>,
    /// Callbacks that failed or panicked.
    pub handler_faults: u64,
    /// Drains that came close to their cap with events still queued.
    pub near_cap_warnings: u64,
    /// Drains that ended with events still queued.
    pub backlog_warnings: u64,
    /// Events that waited too long in the queue.
    pub stale_events: u64,
    /// Events currently queued.
    pub pending: usize,
}

impl StatsResponse {
    fn new(stats: &BusStats, pending: usize) -> Self {
        Self {
            events_processed: stats.events_processed,
            events_by_type: stats
                .events_by_type
                .iter()
                .map(|(name, count)| (name.clone(), *count))
                .collect(),
            slow_handlers: stats.slow_handlers.iter().map(Into::into).collect(),
            handler_faults: stats.handler_faults,
            near_cap_warnings: stats.near_cap_warnings,
            backlog_warnings: stats.backlog_warnings,
            stale_events: stats.stale_events,
            pending,
        }
    }
}

/// GET /
#[instrument(skip(state))]
async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(&state.bus.stats(), state.bus.pending()))
}

/// DELETE /
#[instrument(skip(state))]
async fn reset_stats(State(state): State<AppState>) -> StatusCode {
    state.bus.reset_stats();
    info!("bus statistics reset");
    StatusCode::NO_CONTENT
}

/// Returns the router for bus statistics.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_stats).delete(reset_stats))
}
