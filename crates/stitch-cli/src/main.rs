//! Entry point of the `stitch` binary.

use clap::Parser;
use miette::Result;
use stitch_cli::{cli, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    stitch_cli::run(args)
        .await
        .map(|_| ())
        .map_err(error::cli_error_to_miette)
}
