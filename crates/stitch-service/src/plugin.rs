//! The plugin contract.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use stitch_config::ProjectOptions;

use crate::api::ExtensionApi;
use crate::error::Result;

/// A unit of functionality applied once at startup.
///
/// `apply` registers commands and configuration contributions through the
/// [`ExtensionApi`] handle. Nothing it registers runs before the service is
/// ready.
pub trait Plugin: Send + Sync {
    fn apply(&self, api: &mut dyn ExtensionApi, options: &ProjectOptions) -> Result<()>;

    /// Mode used when one of the plugin's commands runs without `--mode`.
    fn default_modes(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// A plugin together with its identity.
#[derive(Clone)]
pub struct PluginEntry {
    pub id: String,
    pub plugin: Arc<dyn Plugin>,
}

impl PluginEntry {
    pub fn new(id: impl Into<String>, plugin: impl Plugin + 'static) -> Self {
        Self {
            id: id.into(),
            plugin: Arc::new(plugin),
        }
    }

    pub fn from_arc(id: impl Into<String>, plugin: Arc<dyn Plugin>) -> Self {
        Self {
            id: id.into(),
            plugin,
        }
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("id", &self.id)
            .field("default_modes", &self.plugin.default_modes())
            .finish()
    }
}

type ApplyFn = dyn Fn(&mut dyn ExtensionApi, &ProjectOptions) -> Result<()> + Send + Sync;

/// Plugin backed by a closure. See [`plugin_fn`].
pub struct FnPlugin {
    apply: Box<ApplyFn>,
    default_modes: BTreeMap<String, String>,
}

impl FnPlugin {
    pub fn with_default_mode(mut self, command: impl Into<String>, mode: impl Into<String>) -> Self {
        self.default_modes.insert(command.into(), mode.into());
        self
    }
}

impl Plugin for FnPlugin {
    fn apply(&self, api: &mut dyn ExtensionApi, options: &ProjectOptions) -> Result<()> {
        (self.apply)(api, options)
    }

    fn default_modes(&self) -> BTreeMap<String, String> {
        self.default_modes.clone()
    }
}

/// Wrap a closure as a plugin.
pub fn plugin_fn<F>(apply: F) -> FnPlugin
where
    F: Fn(&mut dyn ExtensionApi, &ProjectOptions) -> Result<()> + Send + Sync + 'static,
{
    FnPlugin {
        apply: Box::new(apply),
        default_modes: BTreeMap::new(),
    }
}

/// Stands in for an optional plugin that could not be loaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlugin;

impl Plugin for NoopPlugin {
    fn apply(&self, _api: &mut dyn ExtensionApi, _options: &ProjectOptions) -> Result<()> {
        Ok(())
    }
}
