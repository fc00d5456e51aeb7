//! Error types for option loading and environment files.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// An option or config source has the wrong shape
    #[error("Invalid value for '{field}': {message}\n\nHint: {hint}")]
    InvalidArgument {
        field: String,
        message: String,
        hint: String,
    },

    /// A config or manifest file could not be parsed
    #[error("Failed to parse {}: {message}\n\nHint: Check the file syntax", .path.display())]
    Parse { path: PathBuf, message: String },

    /// An environment file exists but could not be loaded
    #[error("Failed to load environment file {}: {message}", .path.display())]
    EnvFile { path: PathBuf, message: String },

    /// Defaults could not be layered under the user options
    #[error("Invalid project options: {0}\n\nHint: Check field names and types in your stitch config")]
    Options(String),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(
        field: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidArgument {
            field: field.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Options(err.to_string())
    }
}
