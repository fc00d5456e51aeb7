//! Project options shared by every plugin.
//!
//! User values are normalized on the raw JSON level first (deprecated keys,
//! slash handling) and then layered over [`ProjectOptions::default`] with
//! figment, so every field a plugin reads is always present.

use std::collections::BTreeMap;

use figment::{providers::Serialized, Figment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stitch_chain::ChainOp;
use tracing::warn;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectOptions {
    /// URL prefix the bundle is deployed under. Always ends with `/` unless empty.
    pub public_path: String,
    /// Build output directory relative to the project root.
    pub output_dir: String,
    /// Directory (relative to `output_dir`) for generated static assets.
    pub assets_dir: String,
    /// Output path of the generated `index.html`, relative to `output_dir`.
    pub index_path: String,
    pub filename_hashing: bool,
    pub production_source_map: bool,
    /// Multi-page mode. Empty means a single-page app.
    pub pages: BTreeMap<String, Page>,
    pub dev_server: DevServerOptions,
    /// Chain operations applied after every plugin.
    pub chain: Vec<ChainOp>,
    /// Raw configuration merged after every plugin.
    pub configure: Option<Value>,
    /// Free-form options keyed by plugin.
    pub plugin_options: Map<String, Value>,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            public_path: "/".into(),
            output_dir: "dist".into(),
            assets_dir: String::new(),
            index_path: "index.html".into(),
            filename_hashing: true,
            production_source_map: true,
            pages: BTreeMap::new(),
            dev_server: DevServerOptions::default(),
            chain: Vec::new(),
            configure: None,
            plugin_options: Map::new(),
        }
    }
}

impl ProjectOptions {
    /// Build fully defaulted options from a user supplied value.
    ///
    /// `source` names where the value came from and only appears in
    /// messages.
    pub fn from_user_value(value: Value, source: &str) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(ConfigError::invalid(
                source,
                format!("expected an object, got {}", type_name(&value)),
                "Export an object of project options",
            ));
        };

        normalize(&mut map, source);

        let options = Figment::from(Serialized::defaults(ProjectOptions::default()))
            .merge(Serialized::defaults(Value::Object(map)))
            .extract()?;
        Ok(options)
    }

    /// Path of a generated asset inside `assets_dir`.
    pub fn asset_path(&self, file: &str) -> String {
        if self.assets_dir.is_empty() {
            file.to_string()
        } else {
            posix_join(&self.assets_dir, file)
        }
    }

    pub fn is_multi_page(&self) -> bool {
        !self.pages.is_empty()
    }
}

/// A page in multi-page mode: either just an entry file, or a full
/// description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Page {
    Entry(String),
    Config(PageConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    pub entry: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chunks: Option<Vec<String>>,
}

impl Page {
    pub fn entry(&self) -> &str {
        match self {
            Page::Entry(entry) => entry,
            Page::Config(config) => &config.entry,
        }
    }

    pub fn template(&self) -> Option<&str> {
        match self {
            Page::Entry(_) => None,
            Page::Config(config) => config.template.as_deref(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Page::Entry(_) => None,
            Page::Config(config) => config.title.as_deref(),
        }
    }

    /// Emitted HTML file name, `<name>.html` unless configured.
    pub fn filename(&self, name: &str) -> String {
        match self {
            Page::Config(PageConfig {
                filename: Some(filename),
                ..
            }) => filename.clone(),
            _ => format!("{name}.html"),
        }
    }

    /// Chunks injected into the page. Defaults to the shared vendor chunks
    /// plus the page's own.
    pub fn chunks(&self, name: &str) -> Vec<String> {
        match self {
            Page::Config(PageConfig {
                chunks: Some(chunks),
                ..
            }) => chunks.clone(),
            _ => vec![
                "chunk-vendors".into(),
                "chunk-common".into(),
                name.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevServerOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub https: Option<bool>,
    /// Public URL of the dev server, when it sits behind a proxy.
    pub public: Option<String>,
    pub hot_only: bool,
    pub progress: bool,
    /// Proxy table handed to the dev server as-is.
    pub proxy: Option<Value>,
}

impl Default for DevServerOptions {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            https: None,
            public: None,
            hot_only: false,
            progress: true,
            proxy: None,
        }
    }
}

fn normalize(map: &mut Map<String, Value>, source: &str) {
    if let Some(base_url) = map.remove("baseUrl") {
        if map.contains_key("publicPath") {
            warn!(
                "{source}: \"baseUrl\" is ignored in favor of \"publicPath\". Remove \"baseUrl\"."
            );
        } else {
            warn!("{source}: \"baseUrl\" is deprecated, use \"publicPath\" instead.");
            map.insert("publicPath".into(), base_url);
        }
    }

    if let Some(Value::String(public_path)) = map.get_mut("publicPath") {
        *public_path = normalize_public_path(public_path);
    }
    if let Some(Value::String(output_dir)) = map.get_mut("outputDir") {
        if output_dir.ends_with('/') {
            output_dir.pop();
        }
    }
}

/// Ensure a trailing slash, then drop a leading `./`.
///
/// `"./"` therefore becomes `""`, a relative public path.
pub fn normalize_public_path(path: &str) -> String {
    let mut path = path.to_string();
    if !path.is_empty() && !path.ends_with('/') {
        path.push('/');
    }
    match path.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

/// Join two URL-style path segments with exactly one `/` between them.
pub fn posix_join(base: &str, file: &str) -> String {
    match (base.ends_with('/'), file.starts_with('/')) {
        (true, true) => format!("{base}{}", &file[1..]),
        (false, false) if !base.is_empty() => format!("{base}/{file}"),
        _ => format!("{base}{file}"),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_value_yields_defaults() {
        let options = ProjectOptions::from_user_value(json!({}), "inline options").unwrap();
        assert_eq!(options, ProjectOptions::default());
        assert_eq!(options.public_path, "/");
        assert_eq!(options.output_dir, "dist");
        assert!(options.dev_server.progress);
    }

    #[test]
    fn user_values_override_nested_defaults() {
        let options = ProjectOptions::from_user_value(
            json!({
                "outputDir": "build/",
                "publicPath": "/app",
                "devServer": { "port": 3000 }
            }),
            "inline options",
        )
        .unwrap();

        assert_eq!(options.output_dir, "build");
        assert_eq!(options.public_path, "/app/");
        assert_eq!(options.dev_server.port, Some(3000));
        assert!(options.dev_server.progress);
        assert!(options.filename_hashing);
    }

    #[test]
    fn relative_public_path() {
        assert_eq!(normalize_public_path("./"), "");
        assert_eq!(normalize_public_path("./static"), "static/");
        assert_eq!(normalize_public_path(""), "");
        assert_eq!(normalize_public_path("https://cdn.example.com/"), "https://cdn.example.com/");
    }

    #[test]
    fn base_url_maps_to_public_path() {
        let options =
            ProjectOptions::from_user_value(json!({ "baseUrl": "/legacy" }), "inline options")
                .unwrap();
        assert_eq!(options.public_path, "/legacy/");

        let options = ProjectOptions::from_user_value(
            json!({ "baseUrl": "/legacy", "publicPath": "/new/" }),
            "inline options",
        )
        .unwrap();
        assert_eq!(options.public_path, "/new/");
    }

    #[test]
    fn non_object_is_invalid_argument() {
        let err = ProjectOptions::from_user_value(json!(["nope"]), "stitch.config.json").unwrap_err();
        match err {
            ConfigError::InvalidArgument { field, message, .. } => {
                assert_eq!(field, "stitch.config.json");
                assert!(message.contains("array"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_field_type_is_reported() {
        let err =
            ProjectOptions::from_user_value(json!({ "filenameHashing": [true] }), "inline options")
                .unwrap_err();
        assert!(matches!(err, ConfigError::Options(_)));
    }

    #[test]
    fn pages_accept_both_shapes() {
        let options = ProjectOptions::from_user_value(
            json!({
                "pages": {
                    "index": "src/main.js",
                    "admin": { "entry": "src/admin.js", "filename": "admin/index.html", "title": "Admin" }
                }
            }),
            "inline options",
        )
        .unwrap();

        let index = &options.pages["index"];
        assert_eq!(index.entry(), "src/main.js");
        assert_eq!(index.filename("index"), "index.html");
        assert_eq!(index.chunks("index"), ["chunk-vendors", "chunk-common", "index"]);

        let admin = &options.pages["admin"];
        assert_eq!(admin.entry(), "src/admin.js");
        assert_eq!(admin.filename("admin"), "admin/index.html");
        assert_eq!(admin.title(), Some("Admin"));
    }

    #[test]
    fn chain_ops_are_read_from_options() {
        let options = ProjectOptions::from_user_value(
            json!({
                "chain": [{ "op": "alias", "key": "@", "target": "src" }],
                "configure": { "devtool": false }
            }),
            "inline options",
        )
        .unwrap();

        assert_eq!(
            options.chain,
            vec![ChainOp::Alias {
                key: "@".into(),
                target: "src".into()
            }]
        );
        assert_eq!(options.configure, Some(json!({ "devtool": false })));
    }

    #[test]
    fn asset_paths() {
        let mut options = ProjectOptions::default();
        assert_eq!(options.asset_path("img/[name].[ext]"), "img/[name].[ext]");
        options.assets_dir = "static".into();
        assert_eq!(options.asset_path("img/[name].[ext]"), "static/img/[name].[ext]");
        assert_eq!(posix_join("/base/", "/index.html"), "/base/index.html");
        assert_eq!(posix_join("", "index.html"), "index.html");
    }
}
