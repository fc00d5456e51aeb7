//! `package.json` reading.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::options::type_name;

/// Field holding inline project options.
pub const OPTIONS_FIELD: &str = "stitch";
/// Field holding plugin discovery settings (`resolveFrom`, `service`).
pub const PLUGINS_FIELD: &str = "stitchPlugins";

/// The subset of `package.json` the service reads.
///
/// Dependency tables keep their declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: IndexMap<String, Value>,
    #[serde(default)]
    pub dev_dependencies: IndexMap<String, Value>,
    #[serde(default)]
    pub optional_dependencies: IndexMap<String, Value>,
    #[serde(default, rename = "stitch")]
    pub options: Option<Value>,
    #[serde(default, rename = "stitchPlugins")]
    pub plugins: Option<Value>,
}

impl PackageManifest {
    /// Read `package.json` from `dir`. A missing file is an empty manifest.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join("package.json");
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(err) => return Err(ConfigError::io(path, err)),
        };
        serde_json::from_str(&content).map_err(|err| ConfigError::Parse {
            path,
            message: err.to_string(),
        })
    }

    /// Read the manifest for `context`, following `stitchPlugins.resolveFrom`.
    ///
    /// Returns the manifest and the directory it was read from; local plugin
    /// files are resolved against that directory.
    pub fn resolve(context: &Path) -> Result<(Self, PathBuf)> {
        let mut dir = context.to_path_buf();
        let mut manifest = Self::read(&dir)?;
        while let Some(from) = manifest.resolve_from() {
            let next = dir.join(from);
            if next == dir {
                break;
            }
            debug!(from = %dir.display(), to = %next.display(), "following resolveFrom");
            manifest = Self::read(&next)?;
            dir = next;
        }
        Ok((manifest, dir))
    }

    pub fn resolve_from(&self) -> Option<&str> {
        self.plugins
            .as_ref()
            .and_then(|plugins| plugins.get("resolveFrom"))
            .and_then(Value::as_str)
    }

    /// Local plugin files declared under `stitchPlugins.service`.
    pub fn local_plugins(&self) -> Result<Vec<String>> {
        let Some(service) = self.plugins.as_ref().and_then(|p| p.get("service")) else {
            return Ok(Vec::new());
        };
        let Value::Array(files) = service else {
            return Err(ConfigError::invalid(
                format!("{PLUGINS_FIELD}.service"),
                format!("expected an array, got {}", type_name(service)),
                "List local plugin files as an array of paths",
            ));
        };
        files
            .iter()
            .map(|file| {
                file.as_str().map(str::to_string).ok_or_else(|| {
                    ConfigError::invalid(
                        format!("{PLUGINS_FIELD}.service"),
                        format!("expected a path, got {}", type_name(file)),
                        "Each local plugin entry must be a file path string",
                    )
                })
            })
            .collect()
    }

    /// Dependency names in discovery order: dev dependencies first.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dev_dependencies
            .keys()
            .chain(self.dependencies.keys())
            .map(String::as_str)
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.optional_dependencies.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn manifest(value: Value) -> PackageManifest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn missing_manifest_is_empty() {
        let dir = TempDir::new().unwrap();
        assert_eq!(PackageManifest::read(dir.path()).unwrap(), PackageManifest::default());
    }

    #[test]
    fn malformed_manifest_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{ nope").unwrap();
        let err = PackageManifest::read(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn dependency_order_is_dev_first() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{
                "dependencies": { "zeta": "1", "alpha": "1" },
                "devDependencies": { "stitch-plugin-b": "1", "stitch-plugin-a": "1" }
            }"#,
        )
        .unwrap();
        let pkg = PackageManifest::read(dir.path()).unwrap();
        let names: Vec<_> = pkg.dependency_names().collect();
        assert_eq!(names, ["stitch-plugin-b", "stitch-plugin-a", "zeta", "alpha"]);
    }

    #[test]
    fn local_plugins_must_be_an_array() {
        let pkg = manifest(json!({ "stitchPlugins": { "service": "plugin.toml" } }));
        let err = pkg.local_plugins().unwrap_err();
        assert!(err.to_string().contains("stitchPlugins.service"));

        let pkg = manifest(json!({ "stitchPlugins": { "service": ["a.toml", "b.json"] } }));
        assert_eq!(pkg.local_plugins().unwrap(), ["a.toml", "b.json"]);
    }

    #[test]
    fn resolve_from_redirects_lookup() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".config")).unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "root", "stitchPlugins": { "resolveFrom": ".config" } }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(".config/package.json"),
            r#"{ "name": "nested", "devDependencies": { "stitch-plugin-x": "1.0.0" } }"#,
        )
        .unwrap();

        let (pkg, pkg_dir) = PackageManifest::resolve(dir.path()).unwrap();
        assert_eq!(pkg.name.as_deref(), Some("nested"));
        assert_eq!(pkg_dir, dir.path().join(".config"));
    }
}
