//! Routes for submitting domain events.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct EmitEventRequest {
    /// Domain event type.
    pub event_type: String,
    /// Event payload; must be a JSON object when present.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Response body for an accepted event.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    /// Always `true`; the event is queued, not yet dispatched.
    pub accepted: bool,
    /// The event type that was queued.
    pub event_type: String,
}

/// POST /
#[instrument(skip(state, request), fields(event_type = %request.event_type))]
async fn emit_event(
    State(state): State<AppState>,
    Json(request): Json<EmitEventRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let payload = match request.payload {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(object @ Value::Object(_)) => object,
        Some(_) => {
            return Err(ApiError::BadRequest("payload must be a JSON object".into()));
        }
    };

    state.bridge.submit(&request.event_type, payload)?;
    info!("domain event queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            accepted: true,
            event_type: request.event_type.trim().to_owned(),
        }),
    ))
}

/// Returns the router for event submission.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(emit_event))
}
