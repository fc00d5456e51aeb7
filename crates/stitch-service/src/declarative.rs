//! Plugins described by a data file instead of code.
//!
//! ```toml
//! requires = "^0.4"
//!
//! [defaultModes]
//! "lint" = "development"
//!
//! [[chain]]
//! op = "alias"
//! key = "~"
//! target = "src"
//!
//! [configure]
//! performance = { hints = false }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use stitch_chain::{apply_ops, ChainOp, RawContribution};
use stitch_config::{read_config_file, ProjectOptions};

use crate::api::ExtensionApi;
use crate::error::Result;
use crate::plugin::Plugin;
use crate::version::VersionSpec;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeclarativePlugin {
    /// Core version requirement, a major number or a semver range.
    pub requires: Option<Value>,
    pub default_modes: BTreeMap<String, String>,
    pub chain: Vec<ChainOp>,
    pub configure: Option<Value>,
}

impl DeclarativePlugin {
    /// Read a `.toml` or `.json` plugin file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let value = read_config_file(path)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Plugin for DeclarativePlugin {
    fn apply(&self, api: &mut dyn ExtensionApi, _options: &ProjectOptions) -> Result<()> {
        if let Some(requires) = &self.requires {
            api.assert_version(&VersionSpec::from_value(requires)?)?;
        }
        if !self.chain.is_empty() {
            let ops = self.chain.clone();
            api.chain_config(Arc::new(move |chain| apply_ops(&ops, chain)));
        }
        if let Some(configure) = &self.configure {
            api.configure(RawContribution::merge(configure.clone()));
        }
        Ok(())
    }

    fn default_modes(&self) -> BTreeMap<String, String> {
        self.default_modes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn reads_toml_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stitch-plugin.toml");
        fs::write(
            &path,
            r#"
requires = 0

[defaultModes]
lint = "development"

[[chain]]
op = "alias"
key = "~"
target = "src"

[configure]
performance = { hints = false }
"#,
        )
        .unwrap();

        let plugin = DeclarativePlugin::from_file(&path).unwrap();
        assert_eq!(plugin.requires, Some(json!(0)));
        assert_eq!(plugin.default_modes()["lint"], "development");
        assert_eq!(
            plugin.chain,
            [ChainOp::Alias {
                key: "~".into(),
                target: "src".into()
            }]
        );
        assert_eq!(plugin.configure, Some(json!({ "performance": { "hints": false } })));
    }

    #[test]
    fn unknown_operations_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stitch-plugin.json");
        fs::write(&path, r#"{ "chain": [{ "op": "explode" }] }"#).unwrap();
        assert!(DeclarativePlugin::from_file(&path).is_err());
    }
}
