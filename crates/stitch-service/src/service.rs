//! The orchestrator.
//!
//! A [`Service`] owns the plugin list and moves through three states:
//! `Uninitialized` until [`Service::init`] is called, `Initializing` while
//! plugins are applied, and `Ready` once every plugin registered its
//! contributions. Only a ready service resolves configurations and runs
//! commands.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use semver::Version;
use serde_json::Value;
use stitch_chain::{apply_ops, ChainableConfig, RawContribution, ResolvedConfig};
use stitch_config::{Environment, OptionsFactory, OptionsLoader, PackageManifest, CONFIG_PATH_ENV};
use tracing::debug;

use crate::api::{ChainFn, PluginApi, Registrations};
use crate::args::CommandArgs;
use crate::bundler::{Bundler, DevServer, LogReporter, Reporter};
use crate::context::{ContextParts, ServiceContext, ServiceInfo};
use crate::error::{Result, ServiceError};
use crate::plugin::{Plugin, PluginEntry};
use crate::registry::{
    matches_plugin_id, resolve_plugin_id, resolve_plugins, InlinePlugins, PluginCatalog,
    PluginLoader,
};

/// Version of the running service, checked by plugin version requirements.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the command that runs when no (known) command is given.
pub const HELP_COMMAND: &str = "help";

/// Origin recorded for contributions coming from the project options.
const OPTIONS_ORIGIN: &str = "project options";
/// Origin recorded for contributions passed to the builder.
const BUILDER_ORIGIN: &str = "service builder";

/// Configures a [`Service`] before it is built.
///
/// Every setting is optional. Without [`plugins`](Self::plugins) or
/// [`plugin`](Self::plugin) the plugins are discovered from `package.json`,
/// and without [`environment`](Self::environment) the process environment
/// is snapshotted at [`Service::init`].
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use stitch_service::{plugin_fn, Service};
///
/// # fn main() -> stitch_service::Result<()> {
/// let mut service = Service::builder("/path/to/project")
///     .inline_options(json!({ "outputDir": "build" }))
///     .plugin(
///         "stitch-plugin-aliases",
///         plugin_fn(|api, _options| {
///             api.chain(|chain| {
///                 chain.alias("@", "src")?;
///                 Ok(())
///             });
///             Ok(())
///         }),
///     )
///     .chain(|chain| {
///         chain.set("devtool", "source-map")?;
///         Ok(())
///     })
///     .build()?;
///
/// service.init(Some("production"))?;
/// let config = service.resolve_configuration()?;
/// println!("{}", config.value()["devtool"]);
/// # Ok(())
/// # }
/// ```
pub struct ServiceBuilder {
    context: PathBuf,
    plugins: Option<InlinePlugins>,
    loader: Arc<dyn PluginLoader>,
    environment: Option<Environment>,
    inline_options: Option<Value>,
    options_factory: Option<OptionsFactory>,
    config_path: Option<PathBuf>,
    chain_fns: Vec<ChainFn>,
    raw: Vec<RawContribution>,
    bundler: Option<Arc<dyn Bundler>>,
    dev_server: Option<Arc<dyn DevServer>>,
    reporter: Arc<dyn Reporter>,
    version: Option<Version>,
}

impl ServiceBuilder {
    pub fn new(context: impl Into<PathBuf>) -> Self {
        Self {
            context: context.into(),
            plugins: None,
            loader: Arc::new(PluginCatalog::new()),
            environment: None,
            inline_options: None,
            options_factory: None,
            config_path: None,
            chain_fns: Vec::new(),
            raw: Vec::new(),
            bundler: None,
            dev_server: None,
            reporter: Arc::new(LogReporter),
            version: None,
        }
    }

    /// Use these plugins instead of discovering them from `package.json`.
    pub fn plugins(mut self, plugins: Vec<PluginEntry>, use_builtin: bool) -> Self {
        self.plugins = Some(InlinePlugins {
            plugins,
            use_builtin,
        });
        self
    }

    pub fn plugin(mut self, id: impl Into<String>, plugin: impl Plugin + 'static) -> Self {
        let inline = self.plugins.get_or_insert_with(|| InlinePlugins {
            plugins: Vec::new(),
            use_builtin: true,
        });
        inline.plugins.push(PluginEntry::new(id, plugin));
        self
    }

    pub fn loader(mut self, loader: impl PluginLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// Start from this environment instead of the process environment.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Options used when neither a config file nor the package field exist.
    pub fn inline_options(mut self, options: Value) -> Self {
        self.inline_options = Some(options);
        self
    }

    /// Produce the user options programmatically instead of reading a
    /// config file.
    pub fn options_factory(mut self, factory: OptionsFactory) -> Self {
        self.options_factory = Some(factory);
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Chain function applied after every plugin.
    pub fn chain<F>(mut self, chain: F) -> Self
    where
        F: Fn(&mut ChainableConfig) -> stitch_chain::Result<()> + Send + Sync + 'static,
    {
        self.chain_fns.push(Arc::new(chain));
        self
    }

    /// Raw contribution merged after every plugin.
    pub fn configure(mut self, contribution: RawContribution) -> Self {
        self.raw.push(contribution);
        self
    }

    pub fn bundler(mut self, bundler: impl Bundler + 'static) -> Self {
        self.bundler = Some(Arc::new(bundler));
        self
    }

    pub fn dev_server(mut self, dev_server: impl DevServer + 'static) -> Self {
        self.dev_server = Some(Arc::new(dev_server));
        self
    }

    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Override the version plugins are checked against.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Read the manifest and resolve the plugin list.
    pub fn build(self) -> Result<Service> {
        let (manifest, package_dir) = PackageManifest::resolve(&self.context)?;
        let plugins = resolve_plugins(&package_dir, &manifest, self.plugins, self.loader.as_ref())?;
        let version = match self.version {
            Some(version) => version,
            None => Version::parse(VERSION).map_err(|err| {
                ServiceError::invalid("version", err.to_string(), "Set a semver version")
            })?,
        };

        Ok(Service {
            context: self.context,
            manifest,
            plugins,
            skipped: BTreeSet::new(),
            environment: self.environment,
            inline_options: self.inline_options,
            options_factory: self.options_factory,
            config_path: self.config_path,
            chain_fns: self.chain_fns,
            raw: self.raw,
            bundler: self.bundler,
            dev_server: self.dev_server,
            reporter: self.reporter,
            version,
            state: State::Uninitialized,
        })
    }
}

enum State {
    Uninitialized,
    /// Also the state left behind by an init that failed partway.
    Initializing,
    Ready(ServiceContext),
}

pub struct Service {
    context: PathBuf,
    manifest: PackageManifest,
    plugins: Vec<PluginEntry>,
    skipped: BTreeSet<String>,
    environment: Option<Environment>,
    inline_options: Option<Value>,
    options_factory: Option<OptionsFactory>,
    config_path: Option<PathBuf>,
    chain_fns: Vec<ChainFn>,
    raw: Vec<RawContribution>,
    bundler: Option<Arc<dyn Bundler>>,
    dev_server: Option<Arc<dyn DevServer>>,
    reporter: Arc<dyn Reporter>,
    version: Version,
    state: State,
}

impl Service {
    pub fn builder(context: impl Into<PathBuf>) -> ServiceBuilder {
        ServiceBuilder::new(context)
    }

    pub fn plugins(&self) -> &[PluginEntry] {
        &self.plugins
    }

    pub fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Exclude plugins from initialization, by full id or short name.
    pub fn skip_plugins<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for input in ids {
            let input = input.as_ref().trim();
            if input.is_empty() {
                continue;
            }
            let resolved = resolve_plugin_id(input);
            for plugin in &self.plugins {
                if plugin.id == input
                    || plugin.id == resolved
                    || matches_plugin_id(input, &plugin.id)
                {
                    debug!(plugin = %plugin.id, "skipping plugin");
                    self.skipped.insert(plugin.id.clone());
                }
            }
        }
    }

    /// Mode a command runs in when no `--mode` is given. Later plugins
    /// override earlier ones.
    pub fn default_mode(&self, command: &str) -> Option<String> {
        let modes: BTreeMap<String, String> = self
            .plugins
            .iter()
            .flat_map(|entry| entry.plugin.default_modes())
            .collect();
        modes.get(command).cloned()
    }

    /// The ready context.
    pub fn context(&self) -> Result<ServiceContext> {
        match &self.state {
            State::Ready(ctx) => Ok(ctx.clone()),
            _ => Err(ServiceError::Initialization {
                operation: "Service::context".into(),
            }),
        }
    }

    /// Load the environment and options, then apply every plugin that is
    /// not skipped.
    ///
    /// Calling `init` on a ready service returns the existing context.
    pub fn init(&mut self, mode: Option<&str>) -> Result<ServiceContext> {
        match &self.state {
            State::Ready(ctx) => return Ok(ctx.clone()),
            State::Initializing => {
                return Err(ServiceError::Initialization {
                    operation: "Service::init after a failed init".into(),
                });
            }
            State::Uninitialized => {}
        }
        self.state = State::Initializing;
        debug!(mode, context = %self.context.display(), "initializing service");

        let mut environment = self
            .environment
            .clone()
            .unwrap_or_else(Environment::from_process);
        if let Some(mode) = mode {
            environment.load_files(&self.context, Some(mode))?;
            environment.apply_mode_defaults(mode);
        } else {
            environment.load_files(&self.context, None)?;
        }

        let config_path = self
            .config_path
            .clone()
            .or_else(|| environment.get(CONFIG_PATH_ENV).map(PathBuf::from));
        let loaded = OptionsLoader::new(&self.context, &self.manifest)
            .config_path(config_path)
            .factory(self.options_factory.clone())
            .inline(self.inline_options.clone())
            .load()?;
        debug!(source = %loaded.source, "user options loaded");

        let mut tool_versions = BTreeMap::new();
        if let Some(bundler) = &self.bundler {
            tool_versions.insert(
                bundler.name().to_string(),
                bundler.version().unwrap_or_default(),
            );
        }

        let info = ServiceInfo {
            context: self.context.clone(),
            mode: mode.map(str::to_string),
            version: self.version.clone(),
            environment,
            options: loaded.options,
            tool_versions,
        };

        let mut registrations = Registrations::default();
        let mut applied = Vec::new();
        for entry in &self.plugins {
            if self.skipped.contains(&entry.id) {
                continue;
            }
            let mut api = PluginApi::new(&entry.id, &info, &mut registrations);
            entry.plugin.apply(&mut api, &info.options)?;
            applied.push(entry.id.clone());
        }

        if !info.options.chain.is_empty() {
            let ops = info.options.chain.clone();
            registrations.push_chain(OPTIONS_ORIGIN, Arc::new(move |chain| apply_ops(&ops, chain)));
        }
        for chain in &self.chain_fns {
            registrations.push_chain(BUILDER_ORIGIN, chain.clone());
        }
        if let Some(configure) = &info.options.configure {
            registrations.push_raw(OPTIONS_ORIGIN, RawContribution::merge(configure.clone()));
        }
        for contribution in &self.raw {
            registrations.push_raw(BUILDER_ORIGIN, contribution.clone());
        }

        debug!(plugins = applied.len(), "service ready");
        let ctx = ServiceContext::new(ContextParts {
            info,
            registrations,
            plugin_ids: applied,
            bundler: self.bundler.clone(),
            dev_server: self.dev_server.clone(),
            reporter: self.reporter.clone(),
        });
        self.state = State::Ready(ctx.clone());
        Ok(ctx)
    }

    /// Run a command.
    ///
    /// The mode is `--mode`, or development for `build --watch`, or the
    /// default mode plugins declared for the command. A missing name, or
    /// `--help`/`-h`, runs the help command. When the command name is the
    /// first positional (and first raw argument) it is removed before the
    /// handler sees the arguments.
    pub async fn run(
        &mut self,
        name: Option<&str>,
        mut args: CommandArgs,
        mut raw_argv: Vec<String>,
    ) -> Result<Value> {
        let mode = args
            .get_str("mode")
            .or_else(|| {
                (name == Some("build") && args.get_bool("watch")).then(|| "development".to_string())
            })
            .or_else(|| name.and_then(|name| self.default_mode(name)));

        if let Some(skip) = args.get_str("skip-plugins") {
            self.skip_plugins(skip.split(','));
        }

        let ctx = self.init(mode.as_deref())?;

        let command = match name {
            Some(name) => match ctx.command(name) {
                Some(command) => Some(command.clone()),
                None => {
                    return Err(ServiceError::CommandNotFound {
                        name: name.to_string(),
                    });
                }
            },
            None => None,
        };

        let command = match command {
            Some(command) if !args.wants_help() => {
                args.shift_if(&command.name);
                if raw_argv.first() == Some(&command.name) {
                    raw_argv.remove(0);
                }
                command
            }
            _ => ctx
                .command(HELP_COMMAND)
                .cloned()
                .ok_or_else(|| ServiceError::CommandNotFound {
                    name: HELP_COMMAND.to_string(),
                })?,
        };

        debug!(command = %command.name, ?mode, "running command");
        (command.handler)(ctx, args, raw_argv).await
    }

    /// Resolve the final configuration. Repeatable once the service is
    /// ready.
    pub fn resolve_configuration(&self) -> Result<ResolvedConfig> {
        self.context()?.resolve_configuration(None)
    }
}
