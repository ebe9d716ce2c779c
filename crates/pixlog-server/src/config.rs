//! TOML-based configuration for the viewer server.
//!
//! The config file is optional: every field has a default, so the server
//! runs correctly with no file at all, and older files missing newer fields
//! keep working. CLI flags override file values.
//!
//! ```toml
//! port = 42007
//! interface = "127.0.0.1"
//! tick_rate_hz = 30
//! log_level = "info"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// First port to try binding; probing continues upward from here.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address to bind the listening socket to.
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Target tick rate of the dispatcher loop.
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    /// Overridden by `RUST_LOG` when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            interface: default_interface(),
            tick_rate_hz: default_tick_rate(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Reads and parses the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> u16 {
    42007
}

fn default_interface() -> String {
    "127.0.0.1".to_string()
}

fn default_tick_rate() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
