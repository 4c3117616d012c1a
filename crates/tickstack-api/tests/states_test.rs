//! Integration tests for the state stack endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use tickstack_scheduler::SchedulerPhase;

use common::TestApp;

#[tokio::test]
async fn test_push_then_pop_round_trip() {
    // Arrange
    let app = TestApp::new();

    // Act
    let (push_status, _) = common::post_json(
        app.router(),
        "/api/v1/states/push",
        &json!({ "factory": "idle" }),
    )
    .await;
    app.drain();
    let (_, after_push) = common::get_json(app.router(), "/api/v1/states/current").await;
    let (pop_status, _) =
        common::post_json(app.router(), "/api/v1/states/pop", &json!({})).await;
    app.drain();
    let (_, after_pop) = common::get_json(app.router(), "/api/v1/states/current").await;

    // Assert
    assert_eq!(push_status, StatusCode::ACCEPTED);
    assert_eq!(after_push["depth"], 1);
    assert_eq!(after_push["current"]["name"], "idle");
    assert_eq!(pop_status, StatusCode::ACCEPTED);
    assert_eq!(after_pop["depth"], 0);
    assert!(after_pop["current"].is_null());
    assert!(!app.adapter.is_active());
}

#[tokio::test]
async fn test_push_with_rejected_params_leaves_stack_unchanged() {
    // Arrange
    let app = TestApp::new();

    // Act
    let (status, _) = common::post_json(
        app.router(),
        "/api/v1/states/push",
        &json!({ "factory": "countdown", "params": { "ticks": 0 } }),
    )
    .await;
    app.drain();

    // Assert
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(app.adapter.depth(), 0);
    assert_eq!(app.state.bus.stats().handler_faults, 0);
}

#[tokio::test]
async fn test_push_unknown_factory_returns_404() {
    let app = TestApp::new();

    let (status, json) = common::post_json(
        app.router(),
        "/api/v1/states/push",
        &json!({ "factory": "nowhere" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "unknown_factory");
}

#[tokio::test]
async fn test_scheduler_stops_when_countdown_empties_stack() {
    // Arrange
    let app = TestApp::new();
    common::post_json(
        app.router(),
        "/api/v1/states/push",
        &json!({ "factory": "countdown", "params": { "ticks": 3 } }),
    )
    .await;

    // Act
    let summary = app.scheduler.run_frames(None, 100).unwrap();

    // Assert
    assert!(summary.frames < 100);
    assert_eq!(app.scheduler.phase(), SchedulerPhase::Stopped);
    let (_, json) = common::get_json(app.router(), "/api/v1/states/current").await;
    assert_eq!(json["depth"], 0);
}
