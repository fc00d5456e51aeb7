//! Declarative chain operations.
//!
//! Option files and declarative plugins cannot carry closures, so they
//! describe their builder mutations as data. Each operation maps onto one
//! [`ChainableConfig`] call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chain::ChainableConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChainOp {
    Set {
        path: String,
        value: Value,
    },
    Add {
        path: String,
        value: Value,
    },
    Merge {
        path: String,
        value: Value,
    },
    Delete {
        path: String,
    },
    Entry {
        name: String,
        #[serde(default)]
        files: Vec<String>,
    },
    Alias {
        key: String,
        target: String,
    },
    Rule {
        name: String,
        #[serde(default)]
        test: Option<String>,
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
        #[serde(default)]
        uses: Vec<UseSpec>,
    },
    /// Merge options into a loader step declared by an earlier contribution.
    UseOptions {
        rule: String,
        #[serde(rename = "use")]
        use_name: String,
        options: Value,
    },
    Plugin {
        name: String,
        factory: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Replace the arguments of a plugin declared by an earlier contribution.
    PluginArgs {
        name: String,
        args: Vec<Value>,
    },
    RemovePlugin {
        name: String,
    },
    RemoveRule {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseSpec {
    pub name: String,
    pub loader: String,
    #[serde(default)]
    pub options: Option<Value>,
}

impl ChainOp {
    pub fn apply(&self, config: &mut ChainableConfig) -> Result<()> {
        match self {
            ChainOp::Set { path, value } => {
                config.set(path, value.clone())?;
            }
            ChainOp::Add { path, value } => {
                config.add(path, value.clone())?;
            }
            ChainOp::Merge { path, value } => {
                config.merge(path, value.clone())?;
            }
            ChainOp::Delete { path } => {
                config.delete(path);
            }
            ChainOp::Entry { name, files } => {
                let entry = config.entry(name);
                for file in files {
                    entry.add(file.clone());
                }
            }
            ChainOp::Alias { key, target } => {
                config.alias(key, target.clone())?;
            }
            ChainOp::Rule {
                name,
                test,
                include,
                exclude,
                uses,
            } => {
                let rule = config.rule(name);
                if let Some(test) = test {
                    rule.test(test.clone());
                }
                for path in include {
                    rule.include(path.clone());
                }
                for path in exclude {
                    rule.exclude(path.clone());
                }
                for spec in uses {
                    let entry = rule.use_entry(&spec.name);
                    entry.loader(spec.loader.clone());
                    if let Some(options) = &spec.options {
                        entry.options(options.clone());
                    }
                }
            }
            ChainOp::UseOptions {
                rule,
                use_name,
                options,
            } => {
                config
                    .try_rule(rule)?
                    .try_use(use_name)?
                    .merge_options(options.clone());
            }
            ChainOp::Plugin {
                name,
                factory,
                args,
            } => {
                config.plugin(name).use_factory(factory.clone(), args.clone());
            }
            ChainOp::PluginArgs { name, args } => {
                config.try_plugin(name)?.tap(|_| args.clone());
            }
            ChainOp::RemovePlugin { name } => {
                config.remove_plugin(name);
            }
            ChainOp::RemoveRule { name } => {
                config.remove_rule(name);
            }
        }
        Ok(())
    }
}

/// Apply a sequence of operations in order, stopping at the first failure.
pub fn apply_ops(ops: &[ChainOp], config: &mut ChainableConfig) -> Result<()> {
    ops.iter().try_for_each(|op| op.apply(config))
}
