//! The ready service, as command handlers see it.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use serde_json::Value;
use stitch_chain::{apply_raw_contributions, ChainableConfig, ResolvedConfig};
use stitch_config::{Environment, ProjectOptions, BUILD_TARGET};
use tracing::debug;

use crate::api::{Command, DevServerFn, Registrations};
use crate::bundler::{Bundler, DevServer, Reporter};
use crate::cache::{self, CacheConfig};
use crate::error::{Result, ServiceError};
use crate::paths::resolve_path;
use crate::validate::{self, APP_TARGET};

/// Immutable facts about the service shared by every plugin handle.
#[derive(Debug, Clone)]
pub(crate) struct ServiceInfo {
    pub(crate) context: PathBuf,
    pub(crate) mode: Option<String>,
    pub(crate) version: Version,
    pub(crate) environment: Environment,
    pub(crate) options: ProjectOptions,
    pub(crate) tool_versions: BTreeMap<String, String>,
}

impl ServiceInfo {
    pub(crate) fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        resolve_path(&self.context, path)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(context: &str, version: &str) -> Self {
        Self {
            context: PathBuf::from(context),
            mode: None,
            version: Version::parse(version).unwrap(),
            environment: Environment::new(),
            options: ProjectOptions::default(),
            tool_versions: BTreeMap::new(),
        }
    }
}

#[derive(Clone)]
struct ContextInner {
    info: ServiceInfo,
    registrations: Registrations,
    plugin_ids: Vec<String>,
    bundler: Option<Arc<dyn Bundler>>,
    dev_server: Option<Arc<dyn DevServer>>,
    reporter: Arc<dyn Reporter>,
}

/// Handle to a ready service.
///
/// Cheap to clone. Every resolution runs the registered contributions
/// again from scratch, so the same context can resolve any number of
/// times.
#[derive(Clone)]
pub struct ServiceContext {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextParts {
    pub(crate) info: ServiceInfo,
    pub(crate) registrations: Registrations,
    pub(crate) plugin_ids: Vec<String>,
    pub(crate) bundler: Option<Arc<dyn Bundler>>,
    pub(crate) dev_server: Option<Arc<dyn DevServer>>,
    pub(crate) reporter: Arc<dyn Reporter>,
}

impl ServiceContext {
    pub(crate) fn new(parts: ContextParts) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                info: parts.info,
                registrations: parts.registrations,
                plugin_ids: parts.plugin_ids,
                bundler: parts.bundler,
                dev_server: parts.dev_server,
                reporter: parts.reporter,
            }),
        }
    }

    pub fn context(&self) -> &Path {
        &self.inner.info.context
    }

    pub fn mode(&self) -> Option<&str> {
        self.inner.info.mode.as_deref()
    }

    pub fn options(&self) -> &ProjectOptions {
        &self.inner.info.options
    }

    pub fn environment(&self) -> &Environment {
        &self.inner.info.environment
    }

    pub fn version(&self) -> &Version {
        &self.inner.info.version
    }

    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.inner.info.resolve(path)
    }

    /// Identities of the plugins that were applied.
    pub fn plugin_ids(&self) -> &[String] {
        &self.inner.plugin_ids
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.inner.registrations.commands()
    }

    pub fn command(&self, name: &str) -> Option<&Command> {
        self.inner.registrations.command(name)
    }

    pub fn bundler(&self) -> Result<Arc<dyn Bundler>> {
        self.inner.bundler.clone().ok_or_else(|| {
            ServiceError::Bundler(
                "no bundler is configured\n\nHint: Pass one to ServiceBuilder::bundler".into(),
            )
        })
    }

    pub fn dev_server(&self) -> Result<Arc<dyn DevServer>> {
        self.inner.dev_server.clone().ok_or_else(|| {
            ServiceError::Server(
                "no dev server is configured\n\nHint: Pass one to ServiceBuilder::dev_server".into(),
            )
        })
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.inner.reporter.as_ref()
    }

    pub fn dev_server_fns(&self) -> impl Iterator<Item = &DevServerFn> {
        self.inner.registrations.dev_server_fns()
    }

    /// Run every chain function against a fresh builder.
    pub fn resolve_chainable_config(&self) -> Result<ChainableConfig> {
        self.inner.registrations.run_chain()
    }

    /// Produce the final configuration.
    ///
    /// `prebuilt` replaces the chain step, for commands that adjust the
    /// builder before raw contributions are merged.
    pub fn resolve_configuration(&self, prebuilt: Option<ChainableConfig>) -> Result<ResolvedConfig> {
        let chain = match prebuilt {
            Some(chain) => chain,
            None => self.resolve_chainable_config()?,
        };
        let config = apply_raw_contributions(
            chain.to_config(),
            self.inner.registrations.raw_contributions(),
        );

        let env = self.environment();
        let target = env.get(BUILD_TARGET);
        if !env.is_test() && target.is_some_and(|t| t != APP_TARGET) {
            validate::check_public_path(&config, self.options())?;
        }

        debug!(
            entries = ?config.entry_files(self.context()),
            "configuration resolved"
        );
        Ok(config)
    }

    /// Check the invariants owned by the options. See
    /// [`validate::validate_config`].
    pub fn validate(&self, config: &ResolvedConfig, target: &str) -> Result<()> {
        validate::validate_config(config, self.context(), self.options(), target)
    }

    pub fn cache_config(
        &self,
        scope: &str,
        partial_identifier: &Value,
        extra_files: &[PathBuf],
    ) -> Result<CacheConfig> {
        let contributions = self
            .inner
            .registrations
            .fingerprint(&self.inner.info.options, true);
        cache::cache_config_for(
            &self.inner.info,
            &contributions,
            scope,
            partial_identifier,
            extra_files,
        )
    }

    /// A copy of this context with one more environment variable.
    pub fn with_env_var(&self, key: &str, value: &str) -> Self {
        let mut inner = ContextInner::clone(&self.inner);
        inner.info.environment.set(key, value);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// A copy of this context with adjusted options, for command flags that
    /// override an option (`build --dest`).
    pub fn with_options(&self, adjust: impl FnOnce(&mut ProjectOptions)) -> Self {
        let mut inner = ContextInner::clone(&self.inner);
        adjust(&mut inner.info.options);
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("context", &self.inner.info.context)
            .field("mode", &self.inner.info.mode)
            .field("plugins", &self.inner.plugin_ids)
            .finish_non_exhaustive()
    }
}
