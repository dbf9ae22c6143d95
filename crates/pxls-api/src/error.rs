//! Error types for the Pxls HTTP layer.
//!
//! [`ApiError`] unifies request-scoped failures into a single enum that is
//! converted into an Axum response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Clients
//! always get a structured `{"error": ...}` body, never internal detail.

use std::any::Any;
use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pxls_core::PlacementError;
use serde::Serialize;

/// Errors that can occur while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The placement coordinates are off the board.
    #[error("Invalid coordinates")]
    InvalidCoordinates,

    /// The placement color is not in the palette.
    #[error("Invalid color")]
    InvalidColor,

    /// The client is still cooling down.
    #[error("Cooldown has not expired")]
    RateLimited {
        /// Time left before the client may place again.
        wait: Duration,
    },

    /// The request could not be parsed.
    #[error("{0}")]
    BadRequest(String),

    /// No operator token is configured, so the operator surface is hidden.
    #[error("not found")]
    NotFound,

    /// The operator token is missing or wrong.
    #[error("forbidden")]
    Forbidden,
}

impl From<PlacementError> for ApiError {
    fn from(e: PlacementError) -> Self {
        match e {
            PlacementError::InvalidCoordinates { .. } => Self::InvalidCoordinates,
            PlacementError::InvalidColor { .. } => Self::InvalidColor,
            PlacementError::RateLimited { wait } => Self::RateLimited { wait },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait: Option<f64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, wait) = match &self {
            Self::InvalidCoordinates | Self::InvalidColor | Self::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, None)
            }
            // Rate limiting keeps the classic teapot status.
            Self::RateLimited { wait } => (StatusCode::IM_A_TEAPOT, Some(wait.as_secs_f64())),
            Self::NotFound => return StatusCode::NOT_FOUND.into_response(),
            Self::Forbidden => return StatusCode::FORBIDDEN.into_response(),
        };

        let body = ErrorBody {
            error: self.to_string(),
            wait,
        };
        (status, Json(body)).into_response()
    }
}

/// Response for a handler panic caught by
/// [`CatchPanicLayer`](tower_http::catch_panic::CatchPanicLayer).
pub fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("handler panicked");
    internal_error()
}

fn internal_error() -> Response {
    let body = ErrorBody {
        error: String::from("internal error"),
        wait: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
