//! Command-line interface definition.
//!
//! Only the global flags are parsed by clap. Everything after them is the
//! command name and its arguments, handed to the service untouched: plugins
//! register commands at runtime, so their flags cannot be declared here.

use std::path::PathBuf;

use clap::Parser;
use stitch_service::{CommandArgs, DEFAULT_BOOLEAN_FLAGS};

/// Stitch - plugin-driven build configuration
#[derive(Parser, Debug)]
#[command(
    name = "stitch",
    version,
    about = "Plugin-driven build configuration for webpack-style bundlers",
    long_about = "Stitch loads the plugins listed in package.json, lets them contribute to one\n\
                  shared build configuration and register commands, then runs the command.\n\n\
                  Run `stitch help` to list the commands available in this project."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// External bundler executable, invoked with the resolved configuration
    #[arg(long, env = "STITCH_BUNDLER", default_value = "webpack", value_name = "CMD")]
    pub bundler: String,

    /// Command to run followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub args: Vec<String>,
}

impl Cli {
    /// The command name: the first trailing argument, unless it is a flag.
    pub fn command_name(&self) -> Option<&str> {
        self.args
            .first()
            .map(String::as_str)
            .filter(|arg| !arg.starts_with('-'))
    }

    pub fn command_args(&self) -> CommandArgs {
        CommandArgs::parse(&self.args, DEFAULT_BOOLEAN_FLAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("stitch").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn command_flags_are_left_to_the_service() {
        let cli = parse(&["--verbose", "build", "--watch", "--dest", "out"]);
        assert!(cli.verbose);
        assert_eq!(cli.command_name(), Some("build"));

        let args = cli.command_args();
        assert_eq!(args.positional(), ["build"]);
        assert!(args.get_bool("watch"));
        assert_eq!(args.get_str("dest").as_deref(), Some("out"));
    }

    #[test]
    fn leading_flag_is_not_a_command() {
        let cli = parse(&["--", "--mode", "production"]);
        assert_eq!(cli.command_name(), None);
    }

    #[test]
    fn no_arguments_runs_help() {
        let cli = parse(&[]);
        assert_eq!(cli.command_name(), None);
        assert!(cli.args.is_empty());
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["stitch", "-v", "-q", "help"]).is_err());
    }

    #[test]
    fn cwd_and_bundler() {
        let cli = parse(&["--cwd", "/tmp/app", "--bundler", "rspack", "serve"]);
        assert_eq!(cli.cwd, Some(PathBuf::from("/tmp/app")));
        assert_eq!(cli.bundler, "rspack");
        assert_eq!(cli.args, ["serve"]);
    }
}
