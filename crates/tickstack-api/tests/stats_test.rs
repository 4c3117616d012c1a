//! Integration tests for bus statistics.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn test_stats_count_dispatched_events() {
    // Arrange
    let app = TestApp::new();
    for _ in 0..3 {
        common::post_json(
            app.router(),
            "/api/v1/events",
            &json!({ "event_type": "ping" }),
        )
        .await;
    }
    app.drain();

    // Act
    let (status, json) = common::get_json(app.router(), "/api/v1/stats").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events_processed"], 3);
    assert_eq!(json["events_by_type"]["ping"], 3);
    assert_eq!(json["pending"], 0);
}

#[tokio::test]
async fn test_delete_stats_resets_counters() {
    // Arrange
    let app = TestApp::new();
    common::post_json(
        app.router(),
        "/api/v1/events",
        &json!({ "event_type": "ping" }),
    )
    .await;
    app.drain();

    // Act
    let (status, _) = common::delete(app.router(), "/api/v1/stats").await;
    let (_, json) = common::get_json(app.router(), "/api/v1/stats").await;

    // Assert
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(json["events_processed"], 0);
    assert_eq!(json["events_by_type"], json!({}));
}
