//! CLI errors and their conversion into miette reports.

use std::path::PathBuf;

use miette::Report;
use stitch_service::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The `--cwd` directory does not exist
    #[error("Project directory not found: {}\n\nHint: Pass an existing directory to --cwd", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Split a `...\n\nHint: ...` message into the message and its hint.
fn split_hint(message: &str) -> (&str, Option<&str>) {
    match message.split_once("\n\nHint: ") {
        Some((message, hint)) => (message, Some(hint)),
        None => (message, None),
    }
}

/// Convert a CLI error into a report, carrying the hint as miette help
/// text and a stable diagnostic code per error class.
pub fn cli_error_to_miette(err: CliError) -> Report {
    let code = match &err {
        CliError::Service(err) if err.is_not_found() => "stitch::not_found",
        CliError::Service(ServiceError::InvalidArgument { .. }) => "stitch::invalid_argument",
        CliError::Service(ServiceError::IncompatibleVersion { .. }) => "stitch::incompatible_version",
        CliError::Service(ServiceError::InvariantViolation { .. }) => "stitch::invariant_violation",
        CliError::Service(ServiceError::PluginLoad { .. }) => "stitch::plugin_load",
        CliError::Service(ServiceError::Config(_)) => "stitch::config",
        CliError::Service(ServiceError::Bundler(_)) => "stitch::bundler",
        CliError::Service(ServiceError::Server(_)) => "stitch::server",
        CliError::ProjectNotFound(_) => "stitch::project_not_found",
        _ => "stitch::error",
    };

    let rendered = err.to_string();
    match split_hint(&rendered) {
        (message, Some(hint)) => miette::miette!(code = code, help = hint, "{message}"),
        (message, None) => miette::miette!(code = code, "{message}"),
    }
}
