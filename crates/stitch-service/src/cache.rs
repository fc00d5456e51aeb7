//! Loader cache keys.
//!
//! A cache identifier is a blake3 digest of everything that can change a
//! loader's output: the caller's own identifier, the service and tool
//! versions, the environment, the registered contributions and the lock
//! files. Equal inputs always give equal identifiers.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::context::ServiceInfo;
use crate::error::Result;
use crate::paths::{path_string, resolve_path};

/// Lock files hashed into every identifier.
pub const LOCK_FILES: [&str; 3] = ["package-lock.json", "yarn.lock", "pnpm-lock.yaml"];

/// Bumped when the document layout changes.
const CACHE_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// `<context>/node_modules/.cache/<scope>`
    pub cache_directory: PathBuf,
    pub cache_identifier: String,
}

#[derive(Debug, Clone)]
pub struct CacheInputs<'a> {
    pub context: &'a Path,
    pub scope: &'a str,
    pub partial_identifier: &'a Value,
    pub core_version: &'a Version,
    /// Tool name to version, e.g. the bundler.
    pub tool_versions: &'a BTreeMap<String, String>,
    pub node_env: Option<&'a str>,
    pub test: bool,
    /// Fingerprint of the registered contributions.
    pub contributions: &'a Value,
    /// Files hashed in addition to [`LOCK_FILES`], relative to `context`
    /// unless absolute. Missing files hash as `null`.
    pub extra_files: &'a [PathBuf],
}

/// Cache directory and identifier for one loader cache.
///
/// The identifier is the blake3 hex digest of a canonical JSON document,
/// with object keys sorted and line endings normalised, so it is stable
/// across platforms and map orderings. Lock files and `extra_files` are
/// read from disk, and a missing file contributes `null`.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use std::path::Path;
///
/// use semver::Version;
/// use serde_json::json;
/// use stitch_service::{derive_cache_config, CacheInputs};
///
/// # fn main() -> stitch_service::Result<()> {
/// let version = Version::new(5, 0, 0);
/// let tools = BTreeMap::from([("webpack".to_string(), "4.46.0".to_string())]);
/// let inputs = CacheInputs {
///     context: Path::new("/definitely/missing/project"),
///     scope: "babel-loader",
///     partial_identifier: &json!({ "babel": "7.24.0" }),
///     core_version: &version,
///     tool_versions: &tools,
///     node_env: Some("production"),
///     test: false,
///     contributions: &json!({}),
///     extra_files: &[],
/// };
///
/// let first = derive_cache_config(&inputs)?;
/// assert_eq!(first, derive_cache_config(&inputs)?);
/// assert!(first.cache_directory.ends_with("node_modules/.cache/babel-loader"));
/// # Ok(())
/// # }
/// ```
pub fn derive_cache_config(inputs: &CacheInputs<'_>) -> Result<CacheConfig> {
    let mut files = Map::new();
    let lock_files = LOCK_FILES.iter().map(PathBuf::from);
    for file in lock_files.chain(inputs.extra_files.iter().cloned()) {
        let content = read_normalized(&resolve_path(inputs.context, &file))?;
        files.insert(path_string(&file), content);
    }

    let document = json!({
        "scope": inputs.scope,
        "partialIdentifier": normalize_line_endings(inputs.partial_identifier.clone()),
        "coreVersion": inputs.core_version.to_string(),
        "toolVersions": inputs.tool_versions,
        "nodeEnv": inputs.node_env,
        "test": inputs.test,
        "contributions": inputs.contributions,
        "files": files,
    });

    let mut hasher = blake3::Hasher::new();
    hasher.update(&CACHE_FORMAT.to_le_bytes());
    hasher.update(serde_json::to_string(&canonicalize(document))?.as_bytes());
    let cache_identifier = hasher.finalize().to_hex().to_string();

    let cache_directory = inputs
        .context
        .join("node_modules")
        .join(".cache")
        .join(inputs.scope);

    debug!(scope = inputs.scope, identifier = %cache_identifier, "derived cache config");
    Ok(CacheConfig {
        cache_directory,
        cache_identifier,
    })
}

pub(crate) fn cache_config_for(
    info: &ServiceInfo,
    contributions: &Value,
    scope: &str,
    partial_identifier: &Value,
    extra_files: &[PathBuf],
) -> Result<CacheConfig> {
    derive_cache_config(&CacheInputs {
        context: &info.context,
        scope,
        partial_identifier,
        core_version: &info.version,
        tool_versions: &info.tool_versions,
        node_env: info.environment.node_env(),
        test: info.environment.is_test(),
        contributions,
        extra_files,
    })
}

fn read_normalized(path: &Path) -> Result<Value> {
    match fs::read(path) {
        Ok(bytes) => Ok(Value::String(normalize_eol(&String::from_utf8_lossy(&bytes)))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Value::Null),
        Err(err) => Err(err.into()),
    }
}

fn normalize_eol(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn normalize_line_endings(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(normalize_eol(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_line_endings).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_line_endings(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Object keys in sorted order, whatever map `serde_json` was built with.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        other => other,
    }
}
