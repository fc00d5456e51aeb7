use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Value};
use stitch_config::{ProjectOptions, BUILD_TARGET};
use tracing::debug;

use crate::api::{CommandOptions, ExtensionApi};
use crate::args::CommandArgs;
use crate::bundler::BuildOutcome;
use crate::context::ServiceContext;
use crate::error::{Result, ServiceError};
use crate::paths::path_string;
use crate::plugin::Plugin;
use crate::validate::APP_TARGET;

use super::shutdown::shutdown_signal;

/// `build [entry]`: produce a production bundle in the output directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildCommand;

impl Plugin for BuildCommand {
    fn apply(&self, api: &mut dyn ExtensionApi, options: &ProjectOptions) -> Result<()> {
        let command = CommandOptions::new()
            .description("build for production")
            .usage("stitch build [options] [entry]")
            .flag("--mode", "specify env mode (default: production)")
            .flag(
                "--dest",
                format!("specify output directory (default: {})", options.output_dir),
            )
            .flag("--target", "app (default: app)")
            .flag("--no-clean", "do not remove the dist directory before building the project")
            .flag("--watch", "watch for changes")
            .flag("--skip-plugins", "comma-separated list of plugin names to skip for this run");

        api.command("build", command, build);
        Ok(())
    }

    fn default_modes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("build".to_string(), "production".to_string())])
    }
}

async fn build(ctx: ServiceContext, args: CommandArgs, _raw: Vec<String>) -> Result<Value> {
    let target = args.get_str("target").unwrap_or_else(|| APP_TARGET.to_string());
    if target != APP_TARGET {
        return Err(ServiceError::invalid(
            "--target",
            format!("unknown build target \"{target}\""),
            format!("Use --target {APP_TARGET}"),
        ));
    }

    let mut ctx = ctx.with_env_var(BUILD_TARGET, &target);
    let dest = args.get_str("dest");
    if let Some(dest) = dest.clone() {
        ctx = ctx.with_options(|options| options.output_dir = dest);
    }
    let output_dir = ctx.resolve(&ctx.options().output_dir);

    let mut chain = ctx.resolve_chainable_config()?;
    if dest.is_some() {
        chain.set("output.path", path_string(&output_dir))?;
    }
    let mut config = ctx.resolve_configuration(Some(chain))?;
    if let Some(entry) = args.first() {
        let entry = ctx.resolve(entry);
        if let Some(map) = config.value_mut().as_object_mut() {
            map.insert("entry".into(), json!({ "app": [path_string(&entry)] }));
        }
    }
    ctx.validate(&config, APP_TARGET)?;

    let watch = args.get_bool("watch");
    if watch {
        if let Some(map) = config.value_mut().as_object_mut() {
            map.insert("watch".into(), Value::Bool(true));
        }
    }

    let clean = args.get("clean") != Some(&Value::Bool(false));
    if clean && !watch {
        clean_output_dir(&output_dir).await?;
    }

    let reporter = ctx.reporter();
    reporter.info(&format!(
        "Building for {}...",
        ctx.environment().node_env().unwrap_or("production")
    ));

    let bundler = ctx.bundler()?;
    let mut compiler = bundler.compile(&config, ctx.environment(), watch).await?;

    if !watch {
        return match compiler.next_outcome().await {
            Some(BuildOutcome::Success { warnings, .. }) => {
                for warning in &warnings {
                    reporter.warning(warning);
                }
                reporter.success(&format!(
                    "Build complete. The {} directory is ready to be deployed.",
                    ctx.options().output_dir
                ));
                Ok(json!({ "outputDir": path_string(&output_dir) }))
            }
            Some(BuildOutcome::Failed { errors }) => {
                for error in &errors {
                    reporter.warning(error);
                }
                Err(ServiceError::Bundler("Build failed with errors.".into()))
            }
            None => Err(ServiceError::Bundler(format!(
                "{} stopped without reporting a build",
                bundler.name()
            ))),
        };
    }

    let signal = shutdown_signal(false);
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => {
                compiler.stop();
                break;
            }
            outcome = compiler.next_outcome() => match outcome {
                Some(BuildOutcome::Success { warnings, .. }) => {
                    for warning in &warnings {
                        reporter.warning(warning);
                    }
                    reporter.success("Build complete. Watching for changes...");
                }
                Some(BuildOutcome::Failed { errors }) => {
                    reporter.warning(&format!("Build failed with errors.\n\n{}", errors.join("\n\n")));
                }
                None => break,
            },
        }
    }
    Ok(json!({ "outputDir": path_string(&output_dir) }))
}

async fn clean_output_dir(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await? {
        debug!(dir = %dir.display(), "removing previous build output");
        tokio::fs::remove_dir_all(dir).await?;
    }
    Ok(())
}
