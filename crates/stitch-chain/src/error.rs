//! Error types for chainable configuration building.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("rule '{name}' not found\n\nHint: declare it with `rule(\"{name}\")` before modifying it")]
    RuleNotFound { name: String },

    #[error("use '{name}' not found in rule '{rule}'\n\nHint: declare it with `rule(\"{rule}\").use_entry(\"{name}\")` first")]
    UseNotFound { rule: String, name: String },

    #[error("oneOf rule '{name}' not found in rule '{rule}'")]
    OneOfNotFound { rule: String, name: String },

    #[error("plugin '{name}' not found\n\nHint: declare it with `plugin(\"{name}\")` before tapping it")]
    PluginNotFound { name: String },

    #[error("invalid config path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}
