//! Service error types.
//!
//! Every variant a user can hit carries the field or option involved and a
//! `Hint:` with the corrective action.

use stitch_chain::ChainError;
use stitch_config::ConfigError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// An argument or option has the wrong shape
    #[error("Invalid value for '{field}': {message}\n\nHint: {hint}")]
    InvalidArgument {
        field: String,
        message: String,
        hint: String,
    },

    /// A plugin requires a core version the running service does not satisfy
    #[error(
        "Plugin '{plugin}' requires stitch {required}, but the running version is {actual}\n\nHint: Upgrade stitch or install a version of the plugin compatible with {actual}"
    )]
    IncompatibleVersion {
        plugin: String,
        required: String,
        actual: String,
    },

    /// An operation that needs a ready service was called too early
    #[error(
        "{operation} was called before the service finished initializing\n\nHint: Resolve the configuration from a command handler or after Service::init"
    )]
    Initialization { operation: String },

    /// The resolved configuration broke an invariant owned by the options
    #[error("Configuration Error: {message}\n\nHint: {hint}")]
    InvariantViolation {
        field: String,
        message: String,
        hint: String,
    },

    #[error("command \"{name}\" does not exist\n\nHint: Run 'stitch help' to list the available commands")]
    CommandNotFound { name: String },

    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Logged as a warning when an optional plugin cannot be loaded
    #[error("Optional dependency {id} is not installed")]
    OptionalDependencyUnavailable { id: String },

    #[error(
        "Failed to load plugin '{id}': {message}\n\nHint: Check that the plugin is installed and listed in package.json"
    )]
    PluginLoad { id: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Bundler error: {0}")]
    Bundler(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    pub(crate) fn invalid(
        field: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        ServiceError::InvalidArgument {
            field: field.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub(crate) fn invariant(
        field: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        ServiceError::InvariantViolation {
            field: field.into(),
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Whether this error belongs to the not-found class (unknown command,
    /// rule, use or plugin entry).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::CommandNotFound { .. }
                | ServiceError::Chain(
                    ChainError::RuleNotFound { .. }
                        | ChainError::UseNotFound { .. }
                        | ChainError::OneOfNotFound { .. }
                        | ChainError::PluginNotFound { .. }
                )
        )
    }
}
