//! Canvas endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/boardinfo` | Board dimensions and palette |
//! | `GET` | `/boarddata` | Raw board bytes, one per cell, row-major |
//! | `GET` | `/cooldown` | Seconds the caller must still wait |
//! | `POST` | `/place` | Place one pixel |

use std::sync::Arc;

use axum::extract::{FromRequest, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{Form, Json};
use pxls_core::PlacementRequest;
use serde::Serialize;

use crate::error::ApiError;
use crate::identity::ClientIp;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Response body for `GET /boardinfo`.
#[derive(Debug, Serialize)]
pub struct BoardInfo {
    /// Width in cells.
    pub width: u32,
    /// Height in cells.
    pub height: u32,
    /// Color values in id order.
    pub palette: Vec<String>,
}

/// Response body for a successful `POST /place`.
#[derive(Debug, Serialize)]
pub struct PlaceResponse {
    /// Seconds until the caller may place again.
    pub wait: f64,
}

// ---------------------------------------------------------------------------
// GET /boardinfo
// ---------------------------------------------------------------------------

/// Return the board dimensions and palette.
pub async fn board_info(State(state): State<Arc<AppState>>) -> Json<BoardInfo> {
    let board = state.board();
    Json(BoardInfo {
        width: board.width(),
        height: board.height(),
        palette: board.palette().colors().to_vec(),
    })
}

// ---------------------------------------------------------------------------
// GET /boarddata
// ---------------------------------------------------------------------------

/// Return every cell as one byte, row-major.
pub async fn board_data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "application/octet-stream")],
        state.board().snapshot(),
    )
}

// ---------------------------------------------------------------------------
// GET /cooldown
// ---------------------------------------------------------------------------

/// Return the caller's remaining wait in seconds as a bare JSON number.
pub async fn cooldown(
    State(state): State<Arc<AppState>>,
    ClientIp(identity): ClientIp,
) -> Json<f64> {
    Json(state.placement.time_until_allowed(&identity).as_secs_f64())
}

// ---------------------------------------------------------------------------
// POST /place
// ---------------------------------------------------------------------------

/// Place one pixel for the calling client.
///
/// On success the response carries the cooldown the client must now wait.
/// The accepted pixel is also pushed to every live subscriber, the
/// caller's own connection included.
pub async fn place(
    State(state): State<Arc<AppState>>,
    ClientIp(identity): ClientIp,
    PlaceParams(request): PlaceParams,
) -> Result<Json<PlaceResponse>, ApiError> {
    let receipt = state.placement.place(&identity, request)?;
    Ok(Json(PlaceResponse {
        wait: receipt.cooldown.as_secs_f64(),
    }))
}

/// Placement fields read from the query string, or else from a
/// form-encoded or JSON body.
///
/// A query string carrying all of `x`, `y` and `color` wins; the body is
/// then not read.
#[derive(Debug, Clone, Copy)]
pub struct PlaceParams(pub PlacementRequest);

impl<S: Send + Sync> FromRequest<S> for PlaceParams {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if let Ok(Query(request)) = Query::<PlacementRequest>::try_from_uri(req.uri()) {
            return Ok(Self(request));
        }

        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(request) = Json::<PlacementRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(request))
        } else {
            let Form(request) = Form::<PlacementRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(request))
        }
    }
}
