//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tickstack_bus::EventBus;
use tickstack_core::clock::Clock;
use tickstack_core::config::{BusConfig, SchedulerConfig};
use tickstack_scheduler::Scheduler;
use tickstack_state::StateTransitionAdapter;
use tickstack_test_support::FixedClock;
use tower::ServiceExt;

use tickstack_api::build_router;
use tickstack_api::demo;
use tickstack_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// A wired runtime without a running scheduler. Tests drain the bus
/// themselves to stand in for the scheduler thread.
pub struct TestApp {
    pub state: AppState,
    pub adapter: StateTransitionAdapter,
    pub scheduler: Scheduler,
}

impl TestApp {
    /// Build the runtime with the built-in demo registry.
    pub fn new() -> Self {
        let clock = fixed_clock();
        let bus = EventBus::new(clock.clone(), BusConfig::default());
        let scheduler = Scheduler::new(bus.clone(), clock, SchedulerConfig::default());
        let (state, _subscriptions) =
            AppState::attach(bus.clone(), scheduler.handle(), demo::registry(), 16);
        let adapter = StateTransitionAdapter::install(&bus);
        Self {
            state,
            adapter,
            scheduler,
        }
    }

    /// Build the full app router. Uses the same route structure as `main.rs`.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Dispatch everything queued, as one scheduler frame would.
    pub fn drain(&self) {
        self.state.bus.drain_pending();
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a DELETE request and return the response.
pub async fn delete(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}
