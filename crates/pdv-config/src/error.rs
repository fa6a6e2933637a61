//! Configuration errors.
//!
//! Writes fail loudly. Reads degrade to defaults with a warning; only
//! [`try_section`](crate::ConfigResolver::try_section) hands back a `Json`
//! error instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown config domain: {0}")]
    UnknownDomain(String),

    #[error("Invalid key path: '{0}'")]
    InvalidPath(String),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
