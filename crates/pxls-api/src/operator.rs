//! Operator endpoints for runtime control.
//!
//! Every route under `/admin` is gated by [`require_admin_token`], which
//! compares the `token` query parameter against the configured secret.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/admin/changeCooldown?cooldown=N` | Set the cooldown to N seconds |
//! | `GET` | `/admin/alert?message=M` | Push an alert to every live client |

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// The token carried by every operator request.
#[derive(Debug, serde::Deserialize)]
pub struct TokenQuery {
    /// Shared secret.
    pub token: Option<String>,
}

/// Query for `GET /admin/changeCooldown`.
#[derive(Debug, serde::Deserialize)]
pub struct ChangeCooldownQuery {
    /// New cooldown in whole seconds.
    pub cooldown: Option<String>,
}

/// Query for `GET /admin/alert`.
#[derive(Debug, serde::Deserialize)]
pub struct AlertQuery {
    /// Text to broadcast.
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Reject operator requests without the right token.
///
/// No configured token hides the operator surface entirely (404); a
/// missing or wrong token is refused (403).
pub async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return ApiError::NotFound.into_response();
    };
    let authorized = query
        .token
        .as_deref()
        .is_some_and(|given| constant_time_eq(given.as_bytes(), expected.as_bytes()));
    if !authorized {
        warn!(path = %request.uri().path(), "rejected operator request");
        return ApiError::Forbidden.into_response();
    }
    next.run(request).await
}

/// Compare two byte strings without short-circuiting on the first
/// mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ---------------------------------------------------------------------------
// GET /admin/changeCooldown
// ---------------------------------------------------------------------------

/// Change the cooldown applied to every future placement check.
///
/// Already recorded placements keep their timestamps, so a shorter
/// cooldown frees waiting clients immediately.
pub async fn change_cooldown(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChangeCooldownQuery>,
) -> Result<String, ApiError> {
    let seconds: u64 = query
        .cooldown
        .as_deref()
        .map(str::trim)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| {
            ApiError::BadRequest("cooldown must be a non-negative whole number".to_owned())
        })?;

    let prev = state.cooldowns().set_cooldown(Duration::from_secs(seconds));
    info!(
        previous_seconds = prev.as_secs(),
        new_seconds = seconds,
        "cooldown changed"
    );

    Ok(format!("Cooldown changed to {seconds}"))
}

// ---------------------------------------------------------------------------
// GET /admin/alert
// ---------------------------------------------------------------------------

/// Broadcast an alert message to every live subscriber.
pub async fn alert(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> Result<String, ApiError> {
    let message = query
        .message
        .ok_or_else(|| ApiError::BadRequest("message is required".to_owned()))?;

    let delivered = state.hub().alert(message.clone());
    info!(delivered, message = %message, "alert broadcast");

    Ok(format!("Alerted {message}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_plain_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret!"));
        assert!(constant_time_eq(b"", b""));
    }
}
