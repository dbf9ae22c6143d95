//! Axum router construction for the Pxls API.
//!
//! Assembles all routes (REST + `WebSocket` + operator) into a single
//! [`Router`] with tracing, panic recovery and CORS middleware.

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::panic_response;
use crate::handlers;
use crate::operator;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /boardinfo` -- dimensions and palette
/// - `GET /boarddata` -- raw board bytes
/// - `GET /cooldown` -- caller's remaining wait
/// - `POST /place` -- place a pixel
/// - `GET /ws` -- live update stream
/// - `GET /admin/changeCooldown` -- operator: set cooldown
/// - `GET /admin/alert` -- operator: broadcast an alert
///
/// Identity falls back to the peer address only when the router is served
/// with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route("/changeCooldown", get(operator::change_cooldown))
        .route("/alert", get(operator::alert))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            operator::require_admin_token,
        ));

    Router::new()
        // Board
        .route("/boardinfo", get(handlers::board_info))
        .route("/boarddata", get(handlers::board_data))
        .route("/cooldown", get(handlers::cooldown))
        .route("/place", post(handlers::place))
        // WebSocket
        .route("/ws", get(ws::ws_updates))
        // Operator
        .nest("/admin", admin)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
