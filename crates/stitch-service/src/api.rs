//! The handle plugins register through.
//!
//! Each plugin gets its own [`ExtensionApi`] during initialization. The
//! handle only queues contributions; they run later, on every resolution,
//! in the order they were registered.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use semver::Version;
use serde_json::{json, Value};
use stitch_chain::{ChainableConfig, RawContribution, ResolvedConfig};
use stitch_config::{Environment, ProjectOptions};
use tracing::debug;

use crate::args::CommandArgs;
use crate::bundler::DevServerSettings;
use crate::cache::{self, CacheConfig};
use crate::context::{ServiceContext, ServiceInfo};
use crate::error::{Result, ServiceError};
use crate::version::VersionSpec;

/// Mutates the shared builder.
pub type ChainFn = Arc<dyn Fn(&mut ChainableConfig) -> stitch_chain::Result<()> + Send + Sync>;

/// Adjusts the dev server settings before the server starts.
pub type DevServerFn = Arc<dyn Fn(&mut DevServerSettings) + Send + Sync>;

/// A command handler.
pub type CommandFn = Arc<
    dyn Fn(ServiceContext, CommandArgs, Vec<String>) -> BoxFuture<'static, Result<Value>>
        + Send
        + Sync,
>;

/// Box an async closure as a [`CommandFn`].
pub fn command_fn<F, Fut>(handler: F) -> CommandFn
where
    F: Fn(ServiceContext, CommandArgs, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx, args, raw_argv| Box::pin(handler(ctx, args, raw_argv)))
}

/// Help text of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    pub description: Option<String>,
    pub usage: Option<String>,
    /// Flag spelling (`--dest <dir>`) to its description.
    pub flags: BTreeMap<String, String>,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn flag(mut self, flag: impl Into<String>, description: impl Into<String>) -> Self {
        self.flags.insert(flag.into(), description.into());
        self
    }
}

#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub options: CommandOptions,
    pub handler: CommandFn,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// What a plugin can do while it is being applied.
///
/// Each plugin gets its own handle, so every command and contribution is
/// recorded with the plugin's id. Contributions are only queued here: chain
/// functions and transforms run when a command resolves the configuration
/// after initialization, never during `apply`.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use stitch_service::stitch_chain::RawContribution;
/// use stitch_service::stitch_config::ProjectOptions;
/// use stitch_service::{CommandOptions, ExtensionApi, Result, VersionSpec};
///
/// fn apply(api: &mut dyn ExtensionApi, options: &ProjectOptions) -> Result<()> {
///     api.assert_version(&VersionSpec::from(5u64))?;
///
///     let assets = options.asset_path("img/[name].[hash:8].[ext]");
///     api.chain(move |chain| {
///         chain
///             .rule("images")
///             .test(r"\.(png|jpe?g|gif)$")
///             .use_entry("url-loader")
///             .loader("url-loader")
///             .options(json!({ "name": assets }));
///         Ok(())
///     });
///     api.configure(RawContribution::merge(json!({ "performance": { "hints": false } })));
///
///     api.command(
///         "lint",
///         CommandOptions::new().description("lint the sources"),
///         |_ctx, _args, _argv| async { Ok(json!({ "errors": 0 })) },
///     );
///     Ok(())
/// }
/// ```
pub trait ExtensionApi {
    /// Identity of the plugin holding this handle.
    fn id(&self) -> &str;

    /// Project root.
    fn context(&self) -> &Path;

    /// Resolve a path against the project root.
    fn resolve(&self, path: &str) -> PathBuf;

    /// Version of the running service.
    fn version(&self) -> &Version;

    /// Mode the service was initialized with.
    fn mode(&self) -> Option<&str>;

    fn environment(&self) -> &Environment;

    /// Register a command. A later registration under the same name
    /// replaces the earlier one.
    fn register_command(&mut self, name: &str, options: Option<CommandOptions>, handler: CommandFn);

    /// Queue a builder mutation.
    fn chain_config(&mut self, chain: ChainFn);

    /// Queue a raw contribution, merged after every chain function ran.
    fn configure(&mut self, contribution: RawContribution);

    fn configure_dev_server(&mut self, configure: DevServerFn);

    /// Only available once the service is ready; use
    /// [`ServiceContext::resolve_configuration`] from command handlers.
    fn resolve_configuration(&self, prebuilt: Option<ChainableConfig>) -> Result<ResolvedConfig>;

    /// Fail with [`ServiceError::IncompatibleVersion`] unless the running
    /// version satisfies `range`.
    fn assert_version(&self, range: &VersionSpec) -> Result<()>;

    /// Cache location and identifier for a loader cache. See
    /// [`cache::derive_cache_config`].
    fn cache_config(&self, scope: &str, partial_identifier: &Value, extra_files: &[PathBuf])
    -> Result<CacheConfig>;
}

impl dyn ExtensionApi + '_ {
    /// [`ExtensionApi::chain_config`] for a plain closure.
    pub fn chain<F>(&mut self, chain: F)
    where
        F: Fn(&mut ChainableConfig) -> stitch_chain::Result<()> + Send + Sync + 'static,
    {
        self.chain_config(Arc::new(chain));
    }

    /// Queue a transform: `Some` is merged, `None` keeps in-place edits.
    pub fn configure_with<F>(&mut self, transform: F)
    where
        F: Fn(&mut Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.configure(RawContribution::transform(transform));
    }

    pub fn command<F, Fut>(&mut self, name: &str, options: CommandOptions, handler: F)
    where
        F: Fn(ServiceContext, CommandArgs, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register_command(name, Some(options), command_fn(handler));
    }

    pub fn dev_server<F>(&mut self, configure: F)
    where
        F: Fn(&mut DevServerSettings) + Send + Sync + 'static,
    {
        self.configure_dev_server(Arc::new(configure));
    }
}

/// A queued contribution and the plugin that registered it.
#[derive(Clone)]
pub(crate) struct Queued<T> {
    pub(crate) origin: String,
    pub(crate) item: T,
}

/// Everything plugins registered, in registration order.
#[derive(Clone, Default)]
pub(crate) struct Registrations {
    commands: IndexMap<String, Command>,
    chain_fns: Vec<Queued<ChainFn>>,
    raw: Vec<Queued<RawContribution>>,
    dev_server_fns: Vec<Queued<DevServerFn>>,
}

impl Registrations {
    pub(crate) fn register_command(&mut self, origin: &str, command: Command) {
        if self.commands.contains_key(&command.name) {
            debug!(command = %command.name, plugin = origin, "command replaced");
        }
        self.commands.insert(command.name.clone(), command);
    }

    pub(crate) fn push_chain(&mut self, origin: &str, chain: ChainFn) {
        self.chain_fns.push(Queued {
            origin: origin.to_string(),
            item: chain,
        });
    }

    pub(crate) fn push_raw(&mut self, origin: &str, contribution: RawContribution) {
        self.raw.push(Queued {
            origin: origin.to_string(),
            item: contribution,
        });
    }

    pub(crate) fn push_dev_server(&mut self, origin: &str, configure: DevServerFn) {
        self.dev_server_fns.push(Queued {
            origin: origin.to_string(),
            item: configure,
        });
    }

    pub(crate) fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub(crate) fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Run every chain function against a fresh builder.
    pub(crate) fn run_chain(&self) -> Result<ChainableConfig> {
        let mut chain = ChainableConfig::new();
        for queued in &self.chain_fns {
            (queued.item)(&mut chain)?;
        }
        debug!(count = self.chain_fns.len(), "chain functions applied");
        Ok(chain)
    }

    pub(crate) fn raw_contributions(&self) -> impl Iterator<Item = &RawContribution> {
        self.raw.iter().map(|queued| &queued.item)
    }

    pub(crate) fn dev_server_fns(&self) -> impl Iterator<Item = &DevServerFn> {
        self.dev_server_fns.iter().map(|queued| &queued.item)
    }

    /// Stable description of the contributions for cache keys.
    ///
    /// Closures have no serializable form. Once the service is ready, chain
    /// functions are described by the builder output they produce. While it
    /// is still initializing they are never run, and each one is described
    /// by its plugin and position in the queue instead. Transforms are
    /// always described by the plugin that registered them.
    pub(crate) fn fingerprint(&self, options: &ProjectOptions, materialize: bool) -> Value {
        let chain = if materialize {
            match self.run_chain() {
                Ok(chain) => {
                    let config = chain.to_config();
                    json!({ "value": config.value(), "rules": config.rule_meta() })
                }
                Err(err) => json!({ "error": err.to_string() }),
            }
        } else {
            let queued: Vec<Value> = self
                .chain_fns
                .iter()
                .enumerate()
                .map(|(index, queued)| json!({ "origin": queued.origin, "index": index }))
                .collect();
            json!({ "queued": queued })
        };
        let raw: Vec<Value> = self
            .raw
            .iter()
            .map(|queued| match &queued.item {
                RawContribution::Merge(value) => json!({ "merge": value }),
                RawContribution::Transform(_) => json!({ "transform": queued.origin }),
            })
            .collect();
        json!({
            "chain": chain,
            "raw": raw,
            "options": { "chain": options.chain, "configure": options.configure },
        })
    }
}

/// [`ExtensionApi`] over the registrations of a service that is still
/// initializing.
pub(crate) struct PluginApi<'a> {
    id: &'a str,
    info: &'a ServiceInfo,
    registrations: &'a mut Registrations,
}

impl<'a> PluginApi<'a> {
    pub(crate) fn new(id: &'a str, info: &'a ServiceInfo, registrations: &'a mut Registrations) -> Self {
        Self {
            id,
            info,
            registrations,
        }
    }
}

impl ExtensionApi for PluginApi<'_> {
    fn id(&self) -> &str {
        self.id
    }

    fn context(&self) -> &Path {
        &self.info.context
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.info.resolve(path)
    }

    fn version(&self) -> &Version {
        &self.info.version
    }

    fn mode(&self) -> Option<&str> {
        self.info.mode.as_deref()
    }

    fn environment(&self) -> &Environment {
        &self.info.environment
    }

    fn register_command(&mut self, name: &str, options: Option<CommandOptions>, handler: CommandFn) {
        self.registrations.register_command(
            self.id,
            Command {
                name: name.to_string(),
                options: options.unwrap_or_default(),
                handler,
            },
        );
    }

    fn chain_config(&mut self, chain: ChainFn) {
        self.registrations.push_chain(self.id, chain);
    }

    fn configure(&mut self, contribution: RawContribution) {
        self.registrations.push_raw(self.id, contribution);
    }

    fn configure_dev_server(&mut self, configure: DevServerFn) {
        self.registrations.push_dev_server(self.id, configure);
    }

    fn resolve_configuration(&self, _prebuilt: Option<ChainableConfig>) -> Result<ResolvedConfig> {
        Err(ServiceError::Initialization {
            operation: format!("resolve_configuration (plugin '{}')", self.id),
        })
    }

    fn assert_version(&self, range: &VersionSpec) -> Result<()> {
        assert_version(self.id, &self.info.version, range)
    }

    fn cache_config(
        &self,
        scope: &str,
        partial_identifier: &Value,
        extra_files: &[PathBuf],
    ) -> Result<CacheConfig> {
        let contributions = self.registrations.fingerprint(&self.info.options, false);
        cache::cache_config_for(self.info, &contributions, scope, partial_identifier, extra_files)
    }
}

pub(crate) fn assert_version(plugin: &str, version: &Version, range: &VersionSpec) -> Result<()> {
    if range.matches(version)? {
        Ok(())
    } else {
        Err(ServiceError::IncompatibleVersion {
            plugin: plugin.to_string(),
            required: range.display_range(),
            actual: version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ServiceInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn info() -> ServiceInfo {
        ServiceInfo::for_tests("/project", "5.2.0")
    }

    fn noop_command() -> CommandFn {
        command_fn(|_, _, _| async { Ok(Value::Null) })
    }

    #[test]
    fn chain_functions_run_in_order_on_a_fresh_builder() {
        let info = info();
        let mut registrations = Registrations::default();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let mut api = PluginApi::new("first", &info, &mut registrations);
            let api: &mut dyn ExtensionApi = &mut api;
            let counter = calls.clone();
            api.chain(move |chain| {
                counter.fetch_add(1, Ordering::SeqCst);
                assert!(chain.get("mode").is_none());
                chain.set("mode", "development")?;
                Ok(())
            });
        }
        {
            let mut api = PluginApi::new("second", &info, &mut registrations);
            let api: &mut dyn ExtensionApi = &mut api;
            api.chain(|chain| {
                chain.set("mode", "production")?;
                Ok(())
            });
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        for _ in 0..2 {
            let chain = registrations.run_chain().unwrap();
            assert_eq!(chain.get("mode"), Some(&json!("production")));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn last_command_registration_wins() {
        let info = info();
        let mut registrations = Registrations::default();
        let mut api = PluginApi::new("a", &info, &mut registrations);
        api.register_command("lint", Some(CommandOptions::new().description("first")), noop_command());
        api.register_command("test", None, noop_command());
        api.register_command("lint", Some(CommandOptions::new().description("second")), noop_command());

        let names: Vec<&str> = registrations.commands().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["lint", "test"]);
        assert_eq!(
            registrations.command("lint").unwrap().options.description.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn resolution_is_unavailable_during_init() {
        let info = info();
        let mut registrations = Registrations::default();
        let api = PluginApi::new("eager", &info, &mut registrations);
        let err = api.resolve_configuration(None).unwrap_err();
        assert!(matches!(err, ServiceError::Initialization { .. }));
        assert!(err.to_string().contains("eager"));
    }

    #[test]
    fn version_assertions() {
        let info = info();
        let mut registrations = Registrations::default();
        let api = PluginApi::new("versioned", &info, &mut registrations);
        api.assert_version(&VersionSpec::from(5u64)).unwrap();
        let err = api.assert_version(&VersionSpec::from(4u64)).unwrap_err();
        match err {
            ServiceError::IncompatibleVersion {
                plugin,
                required,
                actual,
            } => {
                assert_eq!(plugin, "versioned");
                assert_eq!(required, "^4.0.0-0");
                assert_eq!(actual, "5.2.0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fingerprint_names_transform_origins() {
        let info = info();
        let mut registrations = Registrations::default();
        let mut api = PluginApi::new("transformer", &info, &mut registrations);
        let api: &mut dyn ExtensionApi = &mut api;
        api.configure(RawContribution::merge(json!({ "devtool": false })));
        api.configure_with(|_| None);

        let fingerprint = registrations.fingerprint(&ProjectOptions::default(), true);
        assert_eq!(
            fingerprint["raw"],
            json!([{ "merge": { "devtool": false } }, { "transform": "transformer" }])
        );
    }

    #[test]
    fn cache_keys_during_init_leave_chain_functions_queued() {
        let info = info();
        let mut registrations = Registrations::default();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let mut api = PluginApi::new("loader", &info, &mut registrations);
            let api: &mut dyn ExtensionApi = &mut api;
            let counter = calls.clone();
            api.chain(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            api.cache_config("babel-loader", &json!({}), &[]).unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let fingerprint = registrations.fingerprint(&ProjectOptions::default(), false);
        assert_eq!(
            fingerprint["chain"],
            json!({ "queued": [{ "origin": "loader", "index": 0 }] })
        );
    }
}
