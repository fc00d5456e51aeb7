use std::fmt::Write as _;

use serde_json::Value;
use stitch_config::ProjectOptions;

use crate::api::{Command, CommandOptions, ExtensionApi};
use crate::context::ServiceContext;
use crate::error::Result;
use crate::plugin::Plugin;
use crate::service::HELP_COMMAND;

/// `help [command]`: list the commands, or show one command's usage.
#[derive(Debug, Default, Clone, Copy)]
pub struct HelpCommand;

impl Plugin for HelpCommand {
    fn apply(&self, api: &mut dyn ExtensionApi, _options: &ProjectOptions) -> Result<()> {
        api.command(
            HELP_COMMAND,
            CommandOptions::new().description("show help for a command"),
            |ctx, args, _raw| async move {
                let text = match args.first() {
                    None => main_help(&ctx),
                    Some(name) => command_help(name, ctx.command(name)),
                };
                ctx.reporter().print(&text);
                Ok(Value::String(text))
            },
        );
        Ok(())
    }
}

fn pad_length<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(0) + 2
}

fn main_help(ctx: &ServiceContext) -> String {
    let commands: Vec<&Command> = ctx
        .commands()
        .filter(|command| command.name != HELP_COMMAND)
        .collect();
    let pad = pad_length(commands.iter().map(|c| c.name.as_str()));

    let mut out = String::from("\n  Usage: stitch <command> [options]\n\n  Commands:\n\n");
    for command in commands {
        let description = command.options.description.as_deref().unwrap_or_default();
        let _ = writeln!(out, "    {:<pad$}{description}", command.name);
    }
    out.push_str("\n  run stitch help [command] for usage of a specific command.\n");
    out
}

fn command_help(name: &str, command: Option<&Command>) -> String {
    let Some(command) = command else {
        return format!("\n  command \"{name}\" does not exist.\n");
    };

    let mut out = String::new();
    if let Some(description) = &command.options.description {
        let _ = write!(out, "\n  {description}\n");
    }
    if let Some(usage) = &command.options.usage {
        let _ = write!(out, "\n  Usage: {usage}\n");
    }
    let flags = &command.options.flags;
    if !flags.is_empty() {
        out.push_str("\n  Options:\n\n");
        let pad = pad_length(flags.keys().map(String::as_str));
        for (flag, description) in flags {
            let _ = writeln!(out, "    {flag:<pad$}{description}");
        }
    }
    out
}
