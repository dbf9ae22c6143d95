//! Shared application state for the Pxls HTTP server.
//!
//! [`AppState`] wraps the [`PlacementService`], which in turn owns the
//! board, the cooldown table and the broadcast hub. Handlers reach every
//! piece of the core through it.

use std::sync::Arc;

use pxls_core::{Board, BroadcastHub, CooldownTracker, PlacementService};

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug)]
pub struct AppState {
    /// The placement pipeline and, through it, the board, cooldowns and hub.
    pub placement: Arc<PlacementService>,
    /// Shared secret for the operator routes. `None` hides them.
    pub admin_token: Option<String>,
}

impl AppState {
    /// Create state with the operator routes disabled.
    pub const fn new(placement: Arc<PlacementService>) -> Self {
        Self {
            placement,
            admin_token: None,
        }
    }

    /// Enable the operator routes behind `token`.
    #[must_use]
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }

    /// The shared board.
    pub fn board(&self) -> &Board {
        self.placement.board()
    }

    /// The live-update hub.
    pub fn hub(&self) -> &BroadcastHub {
        self.placement.hub()
    }

    /// The cooldown table.
    pub fn cooldowns(&self) -> &CooldownTracker {
        self.placement.cooldowns()
    }
}
