//! Project options, user config discovery and environment handling.

pub mod env;
pub mod error;
pub mod loading;
pub mod options;
pub mod package;

pub use env::{
    default_node_env, Environment, BUILD_ENV, BUILD_TARGET, CLIENT_ENV_PREFIX, NODE_ENV,
    TESTING_ENV_FLAG, TEST_FLAG,
};
pub use error::{ConfigError, Result};
pub use loading::{
    read_config_file, LoadedOptions, OptionsFactory, OptionsLoader, OptionsSource, CONFIG_FILES,
    CONFIG_PATH_ENV,
};
pub use options::{
    normalize_public_path, posix_join, DevServerOptions, Page, PageConfig, ProjectOptions,
};
pub use package::{PackageManifest, OPTIONS_FIELD, PLUGINS_FIELD};
