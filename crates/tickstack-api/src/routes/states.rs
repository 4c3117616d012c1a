//! Routes for inspecting and driving the state stack.
//!
//! Transitions are only ever requested here: each POST enqueues a
//! `PushState`, `ChangeState` or `PopState` event and returns `202`. The
//! scheduler thread applies it on its next drain.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tickstack_core::error::CoreError;
use tickstack_core::event::{EventKind, StateRef};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;

/// Response body for GET /current.
#[derive(Debug, Serialize)]
pub struct CurrentStateResponse {
    /// The top of the stack, if any.
    pub current: Option<StateRef>,
    /// Number of states on the stack.
    pub depth: usize,
    /// Every state, bottom first.
    pub states: Vec<StateRef>,
}

/// Response body for GET /factories.
#[derive(Debug, Serialize)]
pub struct FactoriesResponse {
    /// Registered factory names, sorted.
    pub factories: Vec<String>,
}

/// Request body for POST /push and POST /change.
#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    /// Registered factory name.
    pub factory: String,
    /// Construction parameters handed to the factory.
    #[serde(default)]
    pub params: Value,
}

/// Response body for an accepted transition request.
#[derive(Debug, Serialize)]
pub struct TransitionAccepted {
    /// Event type that was queued.
    pub requested: String,
}

/// GET /current
#[instrument(skip(state))]
async fn current_state(State(state): State<AppState>) -> Json<CurrentStateResponse> {
    let states = state.view.states();
    Json(CurrentStateResponse {
        current: states.last().cloned(),
        depth: states.len(),
        states,
    })
}

/// GET /factories
async fn list_factories(State(state): State<AppState>) -> Json<FactoriesResponse> {
    Json(FactoriesResponse {
        factories: state.registry.names(),
    })
}

/// POST /push
#[instrument(skip(state, request), fields(factory = %request.factory))]
async fn push_state(
    State(state): State<AppState>,
    Json(request): Json<TransitionBody>,
) -> Result<(StatusCode, Json<TransitionAccepted>), ApiError> {
    let transition = state.registry.request(&request.factory, request.params)?;
    let kind = EventKind::PushState(transition);
    Ok(enqueue(&state, kind))
}

/// POST /change
#[instrument(skip(state, request), fields(factory = %request.factory))]
async fn change_state(
    State(state): State<AppState>,
    Json(request): Json<TransitionBody>,
) -> Result<(StatusCode, Json<TransitionAccepted>), ApiError> {
    let transition = state.registry.request(&request.factory, request.params)?;
    let kind = EventKind::ChangeState(transition);
    Ok(enqueue(&state, kind))
}

/// POST /pop
#[instrument(skip(state))]
async fn pop_state(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<TransitionAccepted>), ApiError> {
    if state.view.depth() == 0 {
        return Err(CoreError::InvalidTransition("state stack is empty".into()).into());
    }
    Ok(enqueue(&state, EventKind::PopState))
}

fn enqueue(state: &AppState, kind: EventKind) -> (StatusCode, Json<TransitionAccepted>) {
    let requested = kind.event_type().to_owned();
    state.bus.emit(kind);
    info!(%requested, "state transition queued");
    (StatusCode::ACCEPTED, Json(TransitionAccepted { requested }))
}

/// Returns the router for the state stack.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/current", get(current_state))
        .route("/factories", get(list_factories))
        .route("/push", post(push_state))
        .route("/change", post(change_state))
        .route("/pop", post(pop_state))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tickstack_state::StateTransitionAdapter;
    use tower::ServiceExt;

    use crate::routes::test_app_state;

    fn post(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_push_known_factory_returns_202_and_enqueues() {
        // Arrange
        let state = test_app_state();
        let adapter = StateTransitionAdapter::install(&state.bus);
        let app = router().with_state(state.clone());

        // Act
        let response = app
            .oneshot(post("/push", &json!({ "factory": "idle" })))
            .await
            .unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["requested"], "push_state");
        assert_eq!(adapter.depth(), 0);
        state.bus.drain_pending();
        assert_eq!(adapter.current().map(|s| s.name), Some("idle".to_owned()));
        assert_eq!(state.view.depth(), 1);
    }

    #[tokio::test]
    async fn test_push_unknown_factory_returns_404() {
        // Arrange
        let state = test_app_state();
        let app = router().with_state(state.clone());

        // Act
        let response = app
            .oneshot(post("/push", &json!({ "factory": "ghost" })))
            .await
            .unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "unknown_factory");
        assert_eq!(state.bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_change_replaces_current_state() {
        // Arrange
        let state = test_app_state();
        let _adapter = StateTransitionAdapter::install(&state.bus);
        router()
            .with_state(state.clone())
            .oneshot(post("/push", &json!({ "factory": "idle" })))
            .await
            .unwrap();
        state.bus.drain_pending();

        // Act
        let response = router()
            .with_state(state.clone())
            .oneshot(post(
                "/change",
                &json!({ "factory": "countdown", "params": { "ticks": 5 } }),
            ))
            .await
            .unwrap();
        state.bus.drain_pending();

        // Assert
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let names: Vec<String> = state.view.states().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["countdown"]);
    }

    #[tokio::test]
    async fn test_pop_on_empty_stack_returns_409() {
        let state = test_app_state();
        let app = router().with_state(state.clone());

        let response = app.oneshot(post("/pop", &json!({}))).await.unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(state.bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_current_reports_mirrored_stack() {
        // Arrange
        let state = test_app_state();
        let _adapter = StateTransitionAdapter::install(&state.bus);
        let request = state.registry.request("idle", Value::Null).unwrap();
        state.bus.emit(EventKind::PushState(request));
        state.bus.drain_pending();
        let app = router().with_state(state);

        // Act
        let response = app.oneshot(get_request("/current")).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["depth"], 1);
        assert_eq!(json["current"]["name"], "idle");
        assert_eq!(json["states"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_factories_lists_registered_names() {
        let app = router().with_state(test_app_state());

        let response = app.oneshot(get_request("/factories")).await.unwrap();

        assert_eq!(
            body_json(response).await,
            json!({ "factories": ["countdown", "idle"] })
        );
    }
}
