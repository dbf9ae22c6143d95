//! Error types for the server binary.
//!
//! [`LaunchError`] is the top-level error type that wraps every failure
//! mode between process start and a clean shutdown.

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: pxls_core::config::ConfigError,
    },

    /// The configured board could not be allocated.
    #[error("board error: {source}")]
    Board {
        /// The underlying board error.
        #[from]
        source: pxls_core::BoardError,
    },

    /// The persisted board could not be read.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying storage error.
        #[from]
        source: pxls_core::StorageError,
    },

    /// The HTTP server failed to start or died.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: pxls_api::ServerError,
    },

    /// The background persister task did not finish cleanly.
    #[error("persister error: {message}")]
    Persister {
        /// Description of the failure.
        message: String,
    },
}
