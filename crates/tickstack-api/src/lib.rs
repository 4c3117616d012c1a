//! Tickstack API host.
//!
//! Runs the scheduler on its own thread and exposes a small HTTP surface for
//! emitting events, inspecting bus statistics and driving the state stack.

pub mod bridge;
pub mod demo;
pub mod error;
pub mod routes;
pub mod state;
pub mod view;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full application router.
pub fn build_router(app_state: AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/events", routes::events::router())
        .nest("/api/v1/stats", routes::stats::router())
        .nest("/api/v1/states", routes::states::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
