//! Environment variables and `.env` files.
//!
//! The service never writes to the process environment. It takes a
//! snapshot at startup, layers env files on top of it and hands the result
//! to plugins, the bundler and the cache key.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfigError, Result};

pub const NODE_ENV: &str = "NODE_ENV";
pub const BUILD_ENV: &str = "BUILD_ENV";
/// Set when running under the test harness.
pub const TEST_FLAG: &str = "STITCH_TEST";
/// Set by tests that exercise env files themselves, disables forced defaults.
pub const TESTING_ENV_FLAG: &str = "STITCH_TEST_TESTING_ENV";
/// Build target chosen by the `build` command (`app`, `lib`, ...).
pub const BUILD_TARGET: &str = "STITCH_BUILD_TARGET";
/// Variables with this prefix are exposed to client code.
pub const CLIENT_ENV_PREFIX: &str = "STITCH_APP_";

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\?\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").expect("valid regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Set `key` only if it is not set yet. Returns whether it was written.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.vars.contains_key(&key) {
            return false;
        }
        self.vars.insert(key, value.into());
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_test(&self) -> bool {
        self.contains(TEST_FLAG)
    }

    pub fn node_env(&self) -> Option<&str> {
        self.get(NODE_ENV)
    }

    pub fn is_production(&self) -> bool {
        self.node_env() == Some("production")
    }

    /// Load the env files for `mode` and then the base files.
    ///
    /// Local variants load before their base file, and nothing overwrites a
    /// variable that is already set, so the precedence is:
    /// process > `.env.<mode>.local` > `.env.<mode>` > `.env.local` > `.env`.
    ///
    /// Returns the files that were found.
    pub fn load_files(&mut self, context: &Path, mode: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut loaded = Vec::new();
        if let Some(mode) = mode {
            self.load_pair(&context.join(format!(".env.{mode}")), &mut loaded)?;
        }
        self.load_pair(&context.join(".env"), &mut loaded)?;
        Ok(loaded)
    }

    fn load_pair(&mut self, base: &Path, loaded: &mut Vec<PathBuf>) -> Result<()> {
        let mut local = base.as_os_str().to_owned();
        local.push(".local");
        self.load_file(Path::new(&local), loaded)?;
        self.load_file(base, loaded)
    }

    fn load_file(&mut self, path: &Path, loaded: &mut Vec<PathBuf>) -> Result<()> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(ConfigError::EnvFile {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                });
            }
        };
        let expanded = self.expand_known(&content);

        let mut count = 0usize;
        for item in dotenvy::from_read_iter(expanded.as_bytes()) {
            let (key, value) = item.map_err(|err| ConfigError::EnvFile {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            if self.set_default(key, value) {
                count += 1;
            }
        }
        debug!(path = %path.display(), count, "loaded env file");
        loaded.push(path.to_path_buf());
        Ok(())
    }

    /// Substitute `$NAME` and `${NAME}` references to variables that are
    /// already set, including ones from earlier env files.
    ///
    /// Single-quoted values and `\$` escapes are left alone, and so are
    /// unknown names, which dotenvy then resolves within the file itself.
    fn expand_known(&self, content: &str) -> String {
        content
            .lines()
            .map(|line| self.expand_line(line))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn expand_line<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let Some((key, value)) = line.split_once('=') else {
            return Cow::Borrowed(line);
        };
        if key.trim_start().starts_with('#') || value.trim_start().starts_with('\'') {
            return Cow::Borrowed(line);
        }
        let expanded = REFERENCE.replace_all(value, |caps: &Captures<'_>| {
            let reference = &caps[0];
            if reference.starts_with('\\') {
                return reference.to_string();
            }
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            match self.get(name) {
                Some(found) => escape_value(found),
                None => reference.to_string(),
            }
        });
        match expanded {
            Cow::Borrowed(_) => Cow::Borrowed(line),
            Cow::Owned(value) => Cow::Owned(format!("{key}={value}")),
        }
    }

    /// Default `NODE_ENV` and `BUILD_ENV` from the mode.
    ///
    /// Under the test flag the defaults are forced so tests do not leak into
    /// each other, unless the test is about env files themselves.
    pub fn apply_mode_defaults(&mut self, mode: &str) {
        let force = self.is_test() && !self.contains(TESTING_ENV_FLAG);
        let default = default_node_env(mode);
        for key in [NODE_ENV, BUILD_ENV] {
            if force {
                self.set(key, default);
            } else {
                self.set_default(key, default);
            }
        }
    }

    /// Variables exposed to client code: every `STITCH_APP_*` variable,
    /// `NODE_ENV` and `BASE_URL` (the public path).
    pub fn client_env(&self, public_path: &str) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = self
            .vars
            .iter()
            .filter(|(key, _)| key.starts_with(CLIENT_ENV_PREFIX) || key.as_str() == NODE_ENV)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.insert("BASE_URL".into(), public_path.to_string());
        env
    }

    /// [`Environment::client_env`] as define-plugin replacements: each value is
    /// JSON encoded and nested under `process.env`.
    pub fn client_env_definitions(&self, public_path: &str) -> Value {
        let env: Map<String, Value> = self
            .client_env(public_path)
            .into_iter()
            .map(|(key, value)| (key, Value::String(Value::String(value).to_string())))
            .collect();
        let mut definitions = Map::new();
        definitions.insert("process.env".into(), Value::Object(env));
        Value::Object(definitions)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Backslash-escape the characters dotenvy would otherwise interpret.
fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '\'' | '$' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `NODE_ENV` for a mode: production and test map to themselves, anything
/// else to development.
pub fn default_node_env(mode: &str) -> &'static str {
    match mode {
        "production" => "production",
        "test" => "test",
        _ => "development",
    }
}
