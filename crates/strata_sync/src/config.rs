//! # Engine Configuration
//!
//! Tunables for the sync loop, loadable from a TOML file. Every field
//! has a default so an empty file (or no file) is a valid deployment.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{FRAME_PREFIX_SIZE, HEADER_SIZE};
use crate::transport::MAX_DATAGRAM;

/// Default payload cap: the largest payload whose framed form still
/// fits one UDP datagram, so no single frame can wedge a
/// datagram-limited transport.
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_DATAGRAM - FRAME_PREFIX_SIZE - HEADER_SIZE;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read {path}: {source}")]
    Read {
        /// Path as given by the caller.
        path: String,
        /// Underlying I/O failure.
        source: io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}

/// Sync-loop tunables.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Largest component payload the engine will frame, in bytes.
    /// Oversize writes are dropped with a warning instead of stalling
    /// the drain behind an unsendable frame. Defaults to
    /// [`DEFAULT_MAX_PAYLOAD`]; raising it past a transport's buffer
    /// limit makes those payloads undeliverable on that transport.
    pub max_payload: usize,

    /// Maximum received buffers merged per transport per frame.
    /// Bounds worst-case frame time when a peer floods.
    pub inbox_budget: usize,

    /// Forward accepted remote frames to the other attached
    /// transports (never back to the one that delivered them).
    pub rebroadcast: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
            inbox_budget: 64,
            rebroadcast: true,
        }
    }
}

impl SyncConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
