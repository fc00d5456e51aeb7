//! Plugins every service starts with.
//!
//! Commands first, then the configuration layers: `base` sets up entry,
//! output, resolution and asset rules, `prod` adjusts production builds and
//! `app` adds the HTML and copy plugins of an application build.

mod app;
mod base;
mod build;
mod help;
mod inspect;
mod prod;
mod serve;
mod shutdown;

use serde_json::Value;

use crate::plugin::PluginEntry;

pub use app::AppConfigPlugin;
pub use base::BaseConfigPlugin;
pub use build::BuildCommand;
pub use help::HelpCommand;
pub use inspect::InspectCommand;
pub use prod::ProdConfigPlugin;
pub use serve::{dev_clients, history_api_fallback_rewrites, ServeCommand};

pub const SERVE_ID: &str = "built-in:commands/serve";
pub const BUILD_ID: &str = "built-in:commands/build";
pub const INSPECT_ID: &str = "built-in:commands/inspect";
pub const HELP_ID: &str = "built-in:commands/help";
pub const BASE_ID: &str = "built-in:config/base";
pub const PROD_ID: &str = "built-in:config/prod";
pub const APP_ID: &str = "built-in:config/app";

/// Built-in plugin ids in application order.
pub const BUILTIN_IDS: [&str; 7] = [
    SERVE_ID, BUILD_ID, INSPECT_ID, HELP_ID, BASE_ID, PROD_ID, APP_ID,
];

pub fn builtin_plugins() -> Vec<PluginEntry> {
    vec![
        PluginEntry::new(SERVE_ID, ServeCommand),
        PluginEntry::new(BUILD_ID, BuildCommand),
        PluginEntry::new(INSPECT_ID, InspectCommand),
        PluginEntry::new(HELP_ID, HelpCommand),
        PluginEntry::new(BASE_ID, BaseConfigPlugin),
        PluginEntry::new(PROD_ID, ProdConfigPlugin),
        PluginEntry::new(APP_ID, AppConfigPlugin),
    ]
}

/// Look up a dotted path (`output.path`, `module.rules.0`) in a value.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
