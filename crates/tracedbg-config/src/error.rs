use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file at {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// Creating the config directory or the commented default file failed.
    #[error("cannot write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// `origin` names the layer that failed: a file path, `overlay`, or
    /// `defaults`.
    #[error("{origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("invalid {field}: {message}")]
    Validation {
        /// Dotted key, e.g. `trace.page_size`.
        field: String,
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn parse(origin: impl Into<String>, err: impl fmt::Display) -> Self {
        ConfigError::Parse {
            origin: origin.into(),
            message: err.to_string().trim_end().to_string(),
        }
    }
}
