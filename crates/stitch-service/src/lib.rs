//! Plugin orchestration for Stitch.
//!
//! A [`Service`] discovers plugins from the project's `package.json` (or takes
//! them inline), applies each one against an [`ExtensionApi`], and collects
//! their commands and configuration contributions. Once initialized it
//! resolves the build configuration and dispatches commands; compiling and
//! serving are delegated to a [`Bundler`] and a [`DevServer`].
//!
//! ```no_run
//! use stitch_service::{CommandArgs, Service};
//!
//! # async fn run() -> stitch_service::Result<()> {
//! let mut service = Service::builder("/path/to/project").build()?;
//! let argv = vec!["inspect".to_string(), "output.path".to_string()];
//! let args = CommandArgs::parse(&argv, stitch_service::DEFAULT_BOOLEAN_FLAGS);
//! service.run(Some("inspect"), args, argv).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod args;
pub mod builtin;
pub mod bundler;
pub mod cache;
pub mod context;
pub mod declarative;
pub mod error;
pub mod paths;
pub mod plugin;
pub mod registry;
pub mod service;
pub mod urls;
pub mod validate;
pub mod version;

pub use api::{command_fn, ChainFn, Command, CommandFn, CommandOptions, DevServerFn, ExtensionApi};
pub use args::{CommandArgs, DEFAULT_BOOLEAN_FLAGS};
pub use bundler::{
    BuildOutcome, Bundler, CompilerEvents, CompilerHandle, DevServer, DevServerSettings,
    HistoryRewrite, LogReporter, Reporter,
};
pub use cache::{derive_cache_config, CacheConfig, CacheInputs, LOCK_FILES};
pub use context::ServiceContext;
pub use declarative::DeclarativePlugin;
pub use error::{Result, ServiceError};
pub use plugin::{plugin_fn, FnPlugin, NoopPlugin, Plugin, PluginEntry};
pub use registry::{
    is_plugin, matches_plugin_id, resolve_plugin_id, InlinePlugins, PluginCatalog, PluginLoader,
};
pub use service::{Service, ServiceBuilder, HELP_COMMAND, VERSION};
pub use validate::{validate_config, APP_TARGET};
pub use version::VersionSpec;

pub use stitch_chain;
pub use stitch_config;
