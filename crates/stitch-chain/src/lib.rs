//! Configuration composition primitives for Stitch.
//!
//! Plugins contribute to one shared build configuration in two ways:
//!
//! - **chain contributions** mutate a [`ChainableConfig`], a path-addressable
//!   builder whose rules, entries and plugins are keyed by name;
//! - **raw contributions** ([`RawContribution`]) are deep-merged into the
//!   materialized value, or transform it directly.
//!
//! [`ChainableConfig::to_config`] materializes the builder into a
//! [`ResolvedConfig`], and [`apply_raw_contributions`] folds the raw
//! contributions on top while keeping per-rule metadata attached.
//!
//! ```
//! use serde_json::json;
//! use stitch_chain::{apply_raw_contributions, ChainableConfig, RawContribution};
//!
//! let mut chain = ChainableConfig::new();
//! chain.set("output.filename", "[name].js").unwrap();
//! chain.rule("images").test(r"\.png$").use_entry("url").loader("url-loader");
//!
//! let raw = vec![RawContribution::merge(json!({ "devtool": "source-map" }))];
//! let config = apply_raw_contributions(chain.to_config(), &raw);
//!
//! assert_eq!(config.value()["devtool"], json!("source-map"));
//! assert_eq!(config.rule_names(&[0]).unwrap(), ["images"]);
//! ```

pub mod chain;
pub mod error;
pub mod merge;
pub mod ops;
pub mod path;
pub mod plugin;
pub mod resolved;
pub mod rule;

pub use chain::{ChainableConfig, EntryPoint};
pub use error::{ChainError, Result};
pub use merge::{apply_raw_contributions, deep_merge, merged, RawContribution, TransformFn};
pub use ops::{apply_ops, ChainOp, UseSpec};
pub use path::ConfigPath;
pub use plugin::PluginSlot;
pub use resolved::{reattach_rule_meta, ResolvedConfig, RuleMeta};
pub use rule::{Enforce, Rule, UseEntry};
