//! Tickstack API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tickstack_core::error::CoreError;

/// Startup and shutdown errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The runtime rejected its configuration or failed to start.
    #[error("engine error: {0}")]
    Engine(#[from] CoreError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    /// The scheduler thread panicked instead of returning.
    #[error("scheduler thread panicked")]
    SchedulerPanicked,
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A runtime error surfaced by a request.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The request itself was malformed.
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::Core(CoreError::UnknownFactory(_)) => (StatusCode::NOT_FOUND, "unknown_factory"),
            Self::Core(CoreError::InvalidTransition(_)) => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            Self::Core(CoreError::SchedulerState(_)) => (StatusCode::CONFLICT, "scheduler_state"),
            Self::Core(CoreError::StateConstruction { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "state_construction_failed")
            }
            Self::Core(CoreError::Snapshot(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "snapshot_error")
            }
            Self::Core(CoreError::Config(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
        };

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
