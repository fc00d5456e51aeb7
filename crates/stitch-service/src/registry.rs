//! Plugin identity, discovery and loading.
//!
//! Plugins come from three places, applied in this order:
//!
//! 1. the built-in plugins, unless an inline list opts out of them;
//! 2. an inline list passed by the embedder, or otherwise every dependency
//!    of the project whose name follows the plugin naming convention;
//! 3. local plugin files listed under `stitchPlugins.service`, with ids of
//!    the form `local:<file>`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use stitch_config::PackageManifest;
use tracing::{debug, warn};

use crate::builtin::builtin_plugins;
use crate::declarative::DeclarativePlugin;
use crate::error::{Result, ServiceError};
use crate::plugin::{NoopPlugin, Plugin, PluginEntry};
use crate::paths::resolve_path;

static PLUGIN_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@stitch/|stitch-|@[\w-]+(\.)?[\w-]+/stitch-)plugin-").expect("valid regex")
});

static OFFICIAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^@stitch/").expect("valid regex"));

static SCOPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(@[\w-]+(\.)?[\w-]+/)(.+)$").expect("valid regex"));

/// Plugin file names looked up inside an installed package.
pub const PLUGIN_FILES: [&str; 2] = ["stitch-plugin.toml", "stitch-plugin.json"];

/// Whether a package name follows the plugin naming convention.
pub fn is_plugin(id: &str) -> bool {
    PLUGIN_ID.is_match(id)
}

/// Expand a short plugin name to its full package name.
///
/// `@stitch/router` → `@stitch/plugin-router`,
/// `@acme/lint` → `@acme/stitch-plugin-lint`, `lint` → `stitch-plugin-lint`.
/// Full names are returned unchanged.
pub fn resolve_plugin_id(id: &str) -> String {
    if is_plugin(id) {
        return id.to_string();
    }
    if let Some(short) = id.strip_prefix("@stitch/") {
        return format!("@stitch/plugin-{short}");
    }
    if let Some(captures) = SCOPED.captures(id) {
        return format!("{}stitch-plugin-{}", &captures[1], &captures[3]);
    }
    format!("stitch-plugin-{id}")
}

/// Whether `input` names the plugin `full_id`, in full or in short form.
///
/// Matching is case-sensitive.
pub fn matches_plugin_id(input: &str, full_id: &str) -> bool {
    let short = PLUGIN_ID.replace(full_id, "");
    input == full_id || input == short || OFFICIAL.replace(input, "") == short
}

/// Turns plugin ids and local plugin files into plugins.
pub trait PluginLoader: Send + Sync {
    /// Load the plugin published as `id`, installed for the project in `dir`.
    fn load(&self, id: &str, dir: &Path) -> Result<Arc<dyn Plugin>>;

    /// Load a local plugin file, relative to `dir`.
    fn load_local(&self, file: &str, dir: &Path) -> Result<Arc<dyn Plugin>>;
}

type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// The default [`PluginLoader`].
///
/// Plugins compiled into the binary are registered by id. Anything else is
/// looked up as a declarative plugin file: `node_modules/<id>/stitch-plugin.*`
/// for packages, the file itself for local plugins.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled-in plugin. For local plugins use the file path
    /// as listed in `package.json` as the id.
    pub fn register<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    fn load_error(id: &str, message: impl Into<String>) -> ServiceError {
        ServiceError::PluginLoad {
            id: id.to_string(),
            message: message.into(),
        }
    }

    fn load_file(id: &str, path: &Path) -> Result<Arc<dyn Plugin>> {
        let plugin = DeclarativePlugin::from_file(path)
            .map_err(|err| Self::load_error(id, err.to_string()))?;
        debug!(plugin = id, path = %path.display(), "loaded declarative plugin");
        Ok(Arc::new(plugin))
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginLoader for PluginCatalog {
    fn load(&self, id: &str, dir: &Path) -> Result<Arc<dyn Plugin>> {
        if let Some(factory) = self.factories.get(id) {
            return Ok(factory());
        }
        let package_dir = dir.join("node_modules").join(id);
        match PLUGIN_FILES
            .iter()
            .map(|name| package_dir.join(name))
            .find(|path| path.exists())
        {
            Some(path) => Self::load_file(id, &path),
            None => Err(Self::load_error(
                id,
                format!("no {} found in {}", PLUGIN_FILES.join(" or "), package_dir.display()),
            )),
        }
    }

    fn load_local(&self, file: &str, dir: &Path) -> Result<Arc<dyn Plugin>> {
        if let Some(factory) = self.factories.get(file) {
            return Ok(factory());
        }
        let id = format!("local:{file}");
        let path = resolve_path(dir, file);
        if !path.exists() {
            return Err(Self::load_error(&id, format!("{} does not exist", path.display())));
        }
        Self::load_file(&id, &path)
    }
}

/// Which plugins to use instead of discovering them.
#[derive(Clone, Default)]
pub struct InlinePlugins {
    pub plugins: Vec<PluginEntry>,
    /// Keep the built-in plugins in front of the inline list.
    pub use_builtin: bool,
}

/// Build the ordered plugin list for a project.
///
/// `dir` is the directory the manifest was read from.
pub fn resolve_plugins(
    dir: &Path,
    manifest: &PackageManifest,
    inline: Option<InlinePlugins>,
    loader: &dyn PluginLoader,
) -> Result<Vec<PluginEntry>> {
    let mut plugins = match inline {
        Some(InlinePlugins {
            plugins,
            use_builtin: true,
        }) => builtin_plugins().into_iter().chain(plugins).collect(),
        Some(InlinePlugins {
            plugins,
            use_builtin: false,
        }) => plugins,
        None => {
            let mut plugins = builtin_plugins();
            for id in manifest.dependency_names().filter(|id| is_plugin(id)) {
                plugins.push(load_dependency(id, dir, manifest, loader)?);
            }
            plugins
        }
    };

    for file in manifest.local_plugins()? {
        let plugin = loader.load_local(&file, dir)?;
        plugins.push(PluginEntry::from_arc(format!("local:{file}"), plugin));
    }

    debug!(
        plugins = ?plugins.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
        "resolved plugins"
    );
    Ok(plugins)
}

fn load_dependency(
    id: &str,
    dir: &Path,
    manifest: &PackageManifest,
    loader: &dyn PluginLoader,
) -> Result<PluginEntry> {
    match loader.load(id, dir) {
        Ok(plugin) => Ok(PluginEntry::from_arc(id, plugin)),
        Err(err) if manifest.is_optional(id) => {
            debug!(plugin = id, error = %err, "optional plugin failed to load");
            warn!(
                "{}",
                ServiceError::OptionalDependencyUnavailable { id: id.to_string() }
            );
            Ok(PluginEntry::new(id, NoopPlugin))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn naming_convention() {
        assert!(is_plugin("@stitch/plugin-router"));
        assert!(is_plugin("stitch-plugin-lint"));
        assert!(is_plugin("@acme/stitch-plugin-lint"));
        assert!(!is_plugin("stitch"));
        assert!(!is_plugin("@acme/plugin-lint"));
        assert!(!is_plugin("lodash"));
    }

    #[test]
    fn short_names_expand() {
        assert_eq!(resolve_plugin_id("@stitch/router"), "@stitch/plugin-router");
        assert_eq!(resolve_plugin_id("@acme/lint"), "@acme/stitch-plugin-lint");
        assert_eq!(resolve_plugin_id("lint"), "stitch-plugin-lint");
        assert_eq!(resolve_plugin_id("stitch-plugin-lint"), "stitch-plugin-lint");
    }

    #[test]
    fn matching_accepts_short_and_full_forms() {
        assert!(matches_plugin_id("router", "@stitch/plugin-router"));
        assert!(matches_plugin_id("@stitch/router", "@stitch/plugin-router"));
        assert!(matches_plugin_id("@stitch/plugin-router", "@stitch/plugin-router"));
        assert!(matches_plugin_id("lint", "@acme/stitch-plugin-lint"));
        assert!(!matches_plugin_id("router", "stitch-plugin-lint"));
        assert!(matches_plugin_id("lint", "stitch-plugin-lint"));
        assert!(!matches_plugin_id("Lint", "stitch-plugin-lint"));
    }

    fn manifest(value: serde_json::Value) -> PackageManifest {
        serde_json::from_value(value).unwrap()
    }

    fn ids(plugins: &[PluginEntry]) -> Vec<&str> {
        plugins.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn discovery_order_and_optional_fallback() {
        let dir = TempDir::new().unwrap();
        let installed = dir.path().join("node_modules/stitch-plugin-installed");
        fs::create_dir_all(&installed).unwrap();
        fs::write(installed.join("stitch-plugin.json"), "{}").unwrap();

        let manifest = manifest(json!({
            "dependencies": { "stitch-plugin-installed": "1", "lodash": "4" },
            "devDependencies": { "stitch-plugin-missing": "1" },
            "optionalDependencies": { "stitch-plugin-missing": "1" },
        }));
        let plugins = resolve_plugins(dir.path(), &manifest, None, &PluginCatalog::new()).unwrap();
        let ids = ids(&plugins);
        assert_eq!(ids[..7], crate::builtin::BUILTIN_IDS);
        assert_eq!(ids[7..], ["stitch-plugin-missing", "stitch-plugin-installed"]);
    }

    #[test]
    fn missing_required_plugin_fails() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest(json!({ "devDependencies": { "stitch-plugin-gone": "1" } }));
        let err = resolve_plugins(dir.path(), &manifest, None, &PluginCatalog::new()).unwrap_err();
        assert!(matches!(err, ServiceError::PluginLoad { ref id, .. } if id == "stitch-plugin-gone"));
    }

    #[test]
    fn inline_lists_and_local_plugins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("my-plugin.toml"), "").unwrap();
        let manifest = manifest(json!({
            "devDependencies": { "stitch-plugin-ignored": "1" },
            "stitchPlugins": { "service": ["my-plugin.toml"] },
        }));

        let inline = InlinePlugins {
            plugins: vec![PluginEntry::new("custom", NoopPlugin)],
            use_builtin: false,
        };
        let plugins =
            resolve_plugins(dir.path(), &manifest, Some(inline), &PluginCatalog::new()).unwrap();
        assert_eq!(ids(&plugins), ["custom", "local:my-plugin.toml"]);
    }

    #[test]
    fn local_plugins_must_be_an_array() {
        let dir = TempDir::new().unwrap();
        let manifest = manifest(json!({ "stitchPlugins": { "service": "my-plugin.toml" } }));
        let inline = InlinePlugins::default();
        let err =
            resolve_plugins(dir.path(), &manifest, Some(inline), &PluginCatalog::new()).unwrap_err();
        assert!(err.to_string().contains("stitchPlugins.service"));
    }

    #[test]
    fn catalog_prefers_compiled_in_plugins() {
        let dir = TempDir::new().unwrap();
        let catalog = PluginCatalog::new().register("stitch-plugin-compiled", || Arc::new(NoopPlugin));
        let manifest = manifest(json!({ "dependencies": { "stitch-plugin-compiled": "1" } }));
        let plugins = resolve_plugins(dir.path(), &manifest, None, &catalog).unwrap();
        assert_eq!(plugins.last().unwrap().id, "stitch-plugin-compiled");
    }
}
