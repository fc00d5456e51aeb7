//! The `stitch` command line.
//!
//! Global flags are parsed here, the rest of the command line is dispatched
//! to a [`stitch_service::Service`] built for the project directory, with
//! an external-process bundler and a static dev server attached.

pub mod bundler;
pub mod cli;
pub mod dev_server;
pub mod error;
pub mod logger;
pub mod ui;

use std::path::PathBuf;

use serde_json::Value;
use stitch_service::Service;

pub use error::{CliError, Result};

use crate::bundler::ProcessBundler;
use crate::cli::Cli;
use crate::dev_server::StaticDevServer;
use crate::ui::TerminalReporter;

/// Resolve the project directory from `--cwd` or the current directory.
pub fn project_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.cwd {
        Some(dir) if dir.is_dir() => Ok(dir.clone()),
        Some(dir) => Err(CliError::ProjectNotFound(dir.clone())),
        None => Ok(std::env::current_dir()?),
    }
}

/// Build the service for the project and run the requested command.
pub async fn run(cli: Cli) -> Result<Value> {
    let context = project_dir(&cli)?;
    let mut service = Service::builder(context)
        .bundler(ProcessBundler::new(cli.bundler.clone()))
        .dev_server(StaticDevServer)
        .reporter(TerminalReporter::new(cli.quiet))
        .build()?;

    let args = cli.command_args();
    let value = service
        .run(cli.command_name(), args, cli.args.clone())
        .await?;
    Ok(value)
}
