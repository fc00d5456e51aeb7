//! Application builds: output file names, code splitting, one HTML page per
//! entry and copying `public/` into the output directory.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use stitch_chain::ChainableConfig;
use stitch_config::{ProjectOptions, BUILD_TARGET};

use crate::api::ExtensionApi;
use crate::error::Result;
use crate::paths::{ensure_relative, path_string, resolve_path};
use crate::plugin::Plugin;
use crate::validate::APP_TARGET;

const HTML_PLUGIN: &str = "html-webpack-plugin";
const COPY_PLUGIN: &str = "copy-webpack-plugin";

#[derive(Debug, Default, Clone, Copy)]
pub struct AppConfigPlugin;

/// Values resolved at apply time and read by the chain function.
#[derive(Debug, Clone)]
struct AppSettings {
    context: PathBuf,
    output_dir: PathBuf,
    production: bool,
    test: bool,
    title: Option<String>,
    options: ProjectOptions,
}

impl AppSettings {
    fn js_filename(&self) -> String {
        let hash = if self.production && self.options.filename_hashing {
            ".[contenthash:8]"
        } else {
            ""
        };
        self.options.asset_path(&format!("js/[name]{hash}.js"))
    }

    fn html_options(&self) -> Map<String, Value> {
        let mut html = Map::new();
        if let Some(title) = &self.title {
            html.insert("title".into(), json!(title));
        }
        if self.production {
            html.insert(
                "minify".into(),
                json!({
                    "removeComments": true,
                    "collapseWhitespace": true,
                    "collapseBooleanAttributes": true,
                    "removeScriptTypeAttributes": true,
                }),
            );
        }
        html
    }

    /// `public/index.html` when it exists.
    fn default_template(&self) -> Option<PathBuf> {
        Some(self.context.join("public/index.html")).filter(|path| path.exists())
    }

    fn apply(&self, chain: &mut ChainableConfig) -> stitch_chain::Result<()> {
        let filename = self.js_filename();
        chain
            .set("output.filename", filename.clone())?
            .set("output.chunkFilename", filename)?;

        if !self.test {
            chain.set(
                "optimization.splitChunks",
                json!({
                    "cacheGroups": {
                        "vendors": {
                            "name": "chunk-vendors",
                            "test": r"[\\/]node_modules[\\/]",
                            "priority": -10,
                            "chunks": "initial",
                        },
                        "common": {
                            "name": "chunk-common",
                            "minChunks": 2,
                            "priority": -20,
                            "chunks": "initial",
                            "reuseExistingChunk": true,
                        },
                    },
                }),
            )?;
        }

        let mut copy_ignore = vec![json!(".DS_Store")];
        if self.options.is_multi_page() {
            self.apply_pages(chain);
        } else {
            let mut html = self.html_options();
            if let Some(template) = self.default_template() {
                copy_ignore.push(json!(path_string(&template)));
                html.insert("template".into(), json!(path_string(&template)));
            }
            if self.options.index_path != "index.html" {
                html.insert(
                    "filename".into(),
                    json!(ensure_relative(&self.output_dir, &self.options.index_path)),
                );
            }
            chain
                .plugin("html")
                .use_factory(HTML_PLUGIN, vec![Value::Object(html)]);
        }

        let public_dir = self.context.join("public");
        if public_dir.is_dir() {
            chain.plugin("copy").use_factory(
                COPY_PLUGIN,
                vec![json!([{
                    "from": path_string(&public_dir),
                    "to": path_string(&self.output_dir),
                    "toType": "dir",
                    "ignore": copy_ignore,
                }])],
            );
        }
        Ok(())
    }

    fn apply_pages(&self, chain: &mut ChainableConfig) {
        chain.clear_entries();
        let fallback = self.default_template();

        for (name, page) in &self.options.pages {
            chain.entry(name).add(page.entry());

            let template_path = resolve_path(
                &self.context,
                page.template()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("public/{name}.html")),
            );
            let template = Some(template_path)
                .filter(|path| path.exists())
                .or_else(|| fallback.clone());

            let mut html = self.html_options();
            html.insert("chunks".into(), json!(page.chunks(name)));
            html.insert(
                "filename".into(),
                json!(ensure_relative(&self.output_dir, &page.filename(name))),
            );
            if let Some(template) = template {
                html.insert("template".into(), json!(path_string(&template)));
            }
            if let Some(title) = page.title() {
                html.insert("title".into(), json!(title));
            }
            chain
                .plugin(&format!("html-{name}"))
                .use_factory(HTML_PLUGIN, vec![Value::Object(html)]);
        }
    }
}

fn package_name(context: &Path) -> Option<String> {
    stitch_config::PackageManifest::read(context)
        .ok()
        .and_then(|manifest| manifest.name)
}

impl Plugin for AppConfigPlugin {
    fn apply(&self, api: &mut dyn ExtensionApi, options: &ProjectOptions) -> Result<()> {
        let env = api.environment();
        if env.get(BUILD_TARGET).is_some_and(|target| target != APP_TARGET) {
            return Ok(());
        }

        let settings = AppSettings {
            context: api.context().to_path_buf(),
            output_dir: api.resolve(&options.output_dir),
            production: env.is_production(),
            test: env.node_env() == Some("test"),
            title: package_name(api.context()),
            options: options.clone(),
        };
        api.chain(move |chain| settings.apply(chain));
        Ok(())
    }
}
