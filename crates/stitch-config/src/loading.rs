//! User option discovery.
//!
//! Sources, highest priority first:
//! 1. a programmatic factory, or the config file (`STITCH_CONFIG_PATH`,
//!    `stitch.config.toml`, `stitch.config.json`)
//! 2. the `"stitch"` field of `package.json`
//! 3. inline options passed by the embedder

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::options::{type_name, ProjectOptions};
use crate::package::{PackageManifest, OPTIONS_FIELD};

pub const CONFIG_FILES: [&str; 2] = ["stitch.config.toml", "stitch.config.json"];
/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "STITCH_CONFIG_PATH";

/// Zero-argument producer of user options, used instead of a config file.
pub type OptionsFactory = Arc<dyn Fn() -> Result<Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsSource {
    File(PathBuf),
    Factory,
    PackageField,
    Inline,
}

impl fmt::Display for OptionsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionsSource::File(path) => match path.file_name() {
                Some(name) => write!(f, "{}", name.to_string_lossy()),
                None => write!(f, "{}", path.display()),
            },
            OptionsSource::Factory => f.write_str("options factory"),
            OptionsSource::PackageField => write!(f, "\"{OPTIONS_FIELD}\" field in package.json"),
            OptionsSource::Inline => f.write_str("inline options"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedOptions {
    pub options: ProjectOptions,
    pub source: OptionsSource,
}

pub struct OptionsLoader<'a> {
    context: &'a Path,
    manifest: &'a PackageManifest,
    config_path: Option<PathBuf>,
    factory: Option<OptionsFactory>,
    inline: Option<Value>,
}

impl<'a> OptionsLoader<'a> {
    pub fn new(context: &'a Path, manifest: &'a PackageManifest) -> Self {
        Self {
            context,
            manifest,
            config_path: None,
            factory: None,
            inline: None,
        }
    }

    /// Explicit config file, relative to the project root unless absolute.
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn factory(mut self, factory: Option<OptionsFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn inline(mut self, inline: Option<Value>) -> Self {
        self.inline = inline;
        self
    }

    /// The config file that would be used, if any.
    pub fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            let path = self.context.join(path);
            return path.exists().then_some(path);
        }
        CONFIG_FILES
            .iter()
            .map(|name| self.context.join(name))
            .find(|path| path.exists())
    }

    pub fn load(&self) -> Result<LoadedOptions> {
        let primary = match &self.factory {
            Some(factory) => Some((factory()?, OptionsSource::Factory)),
            None => match self.find_config_file() {
                Some(path) => Some((read_config_file(&path)?, OptionsSource::File(path))),
                None => None,
            },
        };

        let package_value = self.package_value();

        let (value, source) = match (primary, package_value) {
            (Some((value, source)), package_value) => {
                if package_value.is_some() {
                    warn!(
                        "\"{OPTIONS_FIELD}\" field in package.json ignored due to presence of {source}."
                    );
                    warn!("You should migrate it into {source} and remove it from package.json.");
                }
                (value, source)
            }
            (None, Some(value)) => (value, OptionsSource::PackageField),
            (None, None) => (
                self.inline
                    .clone()
                    .unwrap_or_else(|| Value::Object(Default::default())),
                OptionsSource::Inline,
            ),
        };

        debug!(%source, "loading user options");
        let options = ProjectOptions::from_user_value(value, &source.to_string())?;
        Ok(LoadedOptions { options, source })
    }

    /// The package field, when it is usable.
    fn package_value(&self) -> Option<Value> {
        match &self.manifest.options {
            None | Some(Value::Null) => None,
            Some(value @ Value::Object(_)) => Some(value.clone()),
            Some(other) => {
                warn!(
                    "Error loading config in package.json: the \"{OPTIONS_FIELD}\" field should be an object, got {}.",
                    type_name(other)
                );
                None
            }
        }
    }
}

/// Parse a config file by extension: `.toml`, otherwise JSON.
pub fn read_config_file(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::io(path, err))?;
    let parsed = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str::<Value>(&content).map_err(|err| err.to_string())
    } else {
        serde_json::from_str::<Value>(&content).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn inline_options_are_the_fallback() {
        let dir = TempDir::new().unwrap();
        let manifest = PackageManifest::default();
        let loaded = OptionsLoader::new(dir.path(), &manifest)
            .inline(Some(json!({ "outputDir": "www" })))
            .load()
            .unwrap();
        assert_eq!(loaded.source, OptionsSource::Inline);
        assert_eq!(loaded.options.output_dir, "www");
    }

    #[test]
    fn factory_wins_over_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stitch.config.json"), r#"{ "outputDir": "file" }"#).unwrap();
        let manifest = PackageManifest::default();
        let factory: OptionsFactory = Arc::new(|| Ok(json!({ "outputDir": "factory" })));

        let loaded = OptionsLoader::new(dir.path(), &manifest)
            .factory(Some(factory))
            .load()
            .unwrap();
        assert_eq!(loaded.source, OptionsSource::Factory);
        assert_eq!(loaded.options.output_dir, "factory");
    }

    #[test]
    fn explicit_config_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("custom.json"), r#"{ "assetsDir": "static" }"#).unwrap();
        let manifest = PackageManifest::default();

        let loaded = OptionsLoader::new(dir.path(), &manifest)
            .config_path(Some(PathBuf::from("custom.json")))
            .load()
            .unwrap();
        assert_eq!(loaded.options.assets_dir, "static");
        assert_eq!(loaded.source.to_string(), "custom.json");
    }

    #[test]
    fn non_object_package_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        let manifest: PackageManifest =
            serde_json::from_value(json!({ "stitch": "nope" })).unwrap();
        let loaded = OptionsLoader::new(dir.path(), &manifest).load().unwrap();
        assert_eq!(loaded.source, OptionsSource::Inline);
    }
}
