use std::collections::BTreeMap;

use serde_json::{Map, Value};
use stitch_chain::ResolvedConfig;
use stitch_config::ProjectOptions;

use crate::api::{CommandOptions, ExtensionApi};
use crate::args::CommandArgs;
use crate::error::{Result, ServiceError};
use crate::plugin::Plugin;

use super::lookup;

const NAMELESS_RULE: &str = "Nameless Rule (*)";

/// `inspect [paths...]`: print the resolved configuration, or parts of it.
#[derive(Debug, Default, Clone, Copy)]
pub struct InspectCommand;

impl Plugin for InspectCommand {
    fn apply(&self, api: &mut dyn ExtensionApi, _options: &ProjectOptions) -> Result<()> {
        let options = CommandOptions::new()
            .description("inspect the resolved build configuration")
            .usage("stitch inspect [options] [...paths]")
            .flag("--mode", "specify env mode (default: development)")
            .flag("--rule <ruleName>", "inspect a specific module rule")
            .flag("--plugin <pluginName>", "inspect a specific plugin")
            .flag("--rules", "list all module rule names")
            .flag("--plugins", "list all plugin names")
            .flag("--skip-plugins", "comma-separated list of plugin names to skip for this run");

        api.command("inspect", options, |ctx, args, _raw| async move {
            let config = ctx.resolve_configuration(None)?;
            let inspection = inspect(&config, &args)?;
            ctx.reporter().print(&serde_json::to_string_pretty(&inspection.value)?);
            if inspection.has_nameless_rule {
                ctx.reporter().print(
                    "--- Footnotes ---\n*: Nameless Rules were added through a raw contribution \
                     (possibly by a plugin) instead of a chain function. Run `stitch inspect --rules` \
                     to see the names of the chained rules.",
                );
            }
            Ok(inspection.value)
        });
        Ok(())
    }

    fn default_modes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("inspect".to_string(), "development".to_string())])
    }
}

#[derive(Debug, PartialEq)]
struct Inspection {
    value: Value,
    has_nameless_rule: bool,
}

fn inspect(config: &ResolvedConfig, args: &CommandArgs) -> Result<Inspection> {
    let annotated = config.annotated();
    let rules: &[Value] = config.rules().map(Vec::as_slice).unwrap_or_default();
    let plugins: &[Value] = config
        .value()
        .get("plugins")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut has_nameless_rule = false;

    let value = if let Some(name) = args.get_str("rule") {
        let position = (0..rules.len())
            .find(|&i| config.rule_names(&[i]).and_then(<[String]>::first) == Some(&name))
            .ok_or_else(|| ServiceError::from(stitch_chain::ChainError::RuleNotFound { name }))?;
        annotated["module"]["rules"][position].clone()
    } else if let Some(name) = args.get_str("plugin") {
        plugins
            .iter()
            .find(|plugin| plugin.get("name").and_then(Value::as_str) == Some(name.as_str()))
            .cloned()
            .ok_or_else(|| ServiceError::from(stitch_chain::ChainError::PluginNotFound { name }))?
    } else if args.get_bool("rules") {
        let names = (0..rules.len())
            .map(|i| match config.rule_names(&[i]).and_then(<[String]>::first) {
                Some(name) => Value::String(name.clone()),
                None => {
                    has_nameless_rule = true;
                    Value::String(NAMELESS_RULE.into())
                }
            })
            .collect();
        Value::Array(names)
    } else if args.get_bool("plugins") {
        plugins
            .iter()
            .map(|plugin| plugin.get("name").cloned().unwrap_or(Value::Null))
            .collect()
    } else {
        match args.positional() {
            [] => annotated,
            [path] => lookup(&annotated, path).cloned().unwrap_or(Value::Null),
            paths => {
                let selected: Map<String, Value> = paths
                    .iter()
                    .map(|path| (path.clone(), lookup(&annotated, path).cloned().unwrap_or(Value::Null)))
                    .collect();
                Value::Object(selected)
            }
        }
    };

    Ok(Inspection {
        value,
        has_nameless_rule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::DEFAULT_BOOLEAN_FLAGS;
    use serde_json::json;
    use stitch_chain::{apply_raw_contributions, ChainableConfig, RawContribution};

    fn config() -> ResolvedConfig {
        let mut chain = ChainableConfig::new();
        chain.set("output.path", "/project/dist").unwrap();
        chain.rule("images").test(r"\.png$");
        chain.rule("fonts").test(r"\.woff$");
        chain.plugin("define").use_factory("DefinePlugin", vec![json!({})]);
        let raw = [RawContribution::merge(json!({
            "module": { "rules": [{ "test": "\\.txt$" }] }
        }))];
        apply_raw_contributions(chain.to_config(), &raw)
    }

    fn run(argv: &[&str]) -> Result<Inspection> {
        inspect(&config(), &CommandArgs::parse(argv, DEFAULT_BOOLEAN_FLAGS))
    }

    #[test]
    fn rule_names_with_nameless_footnote() {
        let inspection = run(&["--rules"]).unwrap();
        assert_eq!(inspection.value, json!(["images", "fonts", NAMELESS_RULE]));
        assert!(inspection.has_nameless_rule);
    }

    #[test]
    fn single_rule_and_plugin() {
        let rule = run(&["--rule", "fonts"]).unwrap().value;
        assert_eq!(rule["test"], json!(r"\.woff$"));
        assert_eq!(rule["__ruleNames"], json!(["fonts"]));

        let plugin = run(&["--plugin", "define"]).unwrap().value;
        assert_eq!(plugin["factory"], json!("DefinePlugin"));

        assert!(run(&["--rule", "missing"]).unwrap_err().is_not_found());
        assert_eq!(run(&["--plugins"]).unwrap().value, json!(["define"]));
    }

    #[test]
    fn paths() {
        assert_eq!(run(&["output.path"]).unwrap().value, json!("/project/dist"));
        assert_eq!(
            run(&["output.path", "devtool"]).unwrap().value,
            json!({ "output.path": "/project/dist", "devtool": null })
        );
    }
}
