//! HTTP and `WebSocket` surface for the Pxls shared canvas.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **Board endpoints** (`/boardinfo`, `/boarddata`) for reading the
//!   canvas
//! - **Placement endpoints** (`/place`, `/cooldown`) gated by the
//!   per-client cooldown
//! - **`WebSocket` endpoint** (`/ws`) pushing every accepted pixel and
//!   operator alert to connected clients
//! - **Operator endpoints** (`/admin/*`) behind a shared-secret token
//!
//! # Architecture
//!
//! Handlers are thin: they derive the client identity, parse the request,
//! and call into [`pxls_core::PlacementService`]. All shared state lives
//! in the core crate and is reached through [`AppState`].

pub mod error;
pub mod handlers;
pub mod identity;
pub mod operator;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;
