//! Configuration loading and typed config structures for Pxls.
//!
//! The configuration lives in `pxls-config.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure, applies
//! environment overrides, and validates the result. Every field has a
//! default, so an empty or missing file yields a working server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::board::cell_count;
use crate::palette::{MAX_PALETTE_LEN, Palette, PaletteError, default_colors};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but describes an unusable setup.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

impl From<PaletteError> for ConfigError {
    fn from(e: PaletteError) -> Self {
        Self::Invalid {
            reason: e.to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PxlsConfig {
    /// Board dimensions, palette and storage file.
    #[serde(default)]
    pub board: BoardConfig,

    /// Placement rules.
    #[serde(default)]
    pub game: GameConfig,

    /// HTTP listener and operator settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PxlsConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `PXLS_PORT` overrides `server.port`
    /// - `PXLS_ADMIN_TOKEN` overrides `server.admin_token`
    /// - `PXLS_BOARD_FILE` overrides `board.file`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `PXLS_*` environment overrides.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PXLS_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!(value = %val, error = %e, "ignoring invalid PXLS_PORT"),
            }
        }
        if let Ok(val) = std::env::var("PXLS_ADMIN_TOKEN") {
            self.server.admin_token = Some(val);
        }
        if let Ok(val) = std::env::var("PXLS_BOARD_FILE") {
            self.board.file = PathBuf::from(val);
        }
    }

    /// Check that the configuration describes a usable board.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero or overflowing
    /// dimensions, an empty or oversized palette, a cooldown retention
    /// shorter than the cooldown, or an empty admin token.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if cell_count(self.board.width, self.board.height).is_none() {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "board dimensions {}x{} must be non-zero and addressable",
                    self.board.width, self.board.height
                ),
            });
        }
        if self.board.palette.is_empty() || self.board.palette.len() > MAX_PALETTE_LEN {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "palette must have between 1 and {MAX_PALETTE_LEN} colors, got {}",
                    self.board.palette.len()
                ),
            });
        }
        if self.game.cooldown_retention_seconds < self.game.cooldown_seconds {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "game.cooldown_retention_seconds ({}) must be at least game.cooldown_seconds ({})",
                    self.game.cooldown_retention_seconds, self.game.cooldown_seconds
                ),
            });
        }
        if self.server.admin_token.as_deref() == Some("") {
            return Err(ConfigError::Invalid {
                reason: "server.admin_token must not be empty; omit it to disable admin".to_owned(),
            });
        }
        Ok(())
    }

    /// Build the palette described by `board.palette`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the palette is empty or too large.
    pub fn palette(&self) -> Result<Palette, ConfigError> {
        Ok(Palette::new(self.board.palette.clone())?)
    }
}

/// Board configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BoardConfig {
    /// Width in cells.
    #[serde(default = "default_board_side")]
    pub width: u32,

    /// Height in cells.
    #[serde(default = "default_board_side")]
    pub height: u32,

    /// Where the board blob is persisted.
    #[serde(default = "default_board_file")]
    pub file: PathBuf,

    /// Ordered color values; the index is the color id.
    #[serde(default = "default_colors")]
    pub palette: Vec<String>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: default_board_side(),
            height: default_board_side(),
            file: default_board_file(),
            palette: default_colors(),
        }
    }
}

/// Placement rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameConfig {
    /// Seconds a client must wait between accepted placements.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Seconds a client's last placement is remembered before being swept.
    #[serde(default = "default_cooldown_retention_seconds")]
    pub cooldown_retention_seconds: u64,

    /// Seconds between cooldown table sweeps.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl GameConfig {
    /// The cooldown as a [`Duration`].
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    /// The retention window as a [`Duration`].
    pub const fn cooldown_retention(&self) -> Duration {
        Duration::from_secs(self.cooldown_retention_seconds)
    }

    /// The sweep interval as a [`Duration`], at least one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: default_cooldown_seconds(),
            cooldown_retention_seconds: default_cooldown_retention_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret for `/admin/*`. Unset disables the operator routes.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Events queued per live subscriber before it is dropped.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: None,
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_board_side() -> u32 {
    1000
}

fn default_board_file() -> PathBuf {
    PathBuf::from("board.dat")
}

const fn default_cooldown_seconds() -> u64 {
    10
}

const fn default_cooldown_retention_seconds() -> u64 {
    24 * 60 * 60
}

const fn default_sweep_interval_seconds() -> u64 {
    300
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    4567
}

const fn default_subscriber_buffer() -> usize {
    crate::broadcast::DEFAULT_SUBSCRIBER_BUFFER
}

fn default_log_level() -> String {
    String::from("info")
}
