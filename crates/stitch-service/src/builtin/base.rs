//! Configuration shared by every build: entry, output, module resolution,
//! static asset rules and client environment replacement.

use serde_json::{json, Value};
use stitch_config::ProjectOptions;

use crate::api::ExtensionApi;
use crate::error::Result;
use crate::paths::path_string;
use crate::plugin::Plugin;

pub const DEFAULT_ENTRY: &str = "./src/main.js";

const IMAGES: &str = r"\.(png|jpe?g|gif|webp|avif)(\?.*)?$";
const SVG: &str = r"\.(svg)(\?.*)?$";
const MEDIA: &str = r"\.(mp4|webm|ogg|mp3|wav|flac|aac)(\?.*)?$";
const FONTS: &str = r"\.(woff2?|eot|ttf|otf)(\?.*)?$";

/// Inline images below this size as data URLs.
const INLINE_LIMIT: u64 = 4096;

#[derive(Debug, Default, Clone, Copy)]
pub struct BaseConfigPlugin;

/// Output name of an asset under `dir`, hashed when filename hashing is on.
fn asset_name(options: &ProjectOptions, dir: &str) -> String {
    let hash = if options.filename_hashing { ".[hash:8]" } else { "" };
    options.asset_path(&format!("{dir}/[name]{hash}.[ext]"))
}

fn file_loader_options(options: &ProjectOptions, dir: &str) -> Value {
    json!({ "name": asset_name(options, dir) })
}

/// `url-loader` options that fall back to `file-loader` above the size limit.
fn url_loader_options(options: &ProjectOptions, dir: &str) -> Value {
    json!({
        "limit": INLINE_LIMIT,
        "fallback": {
            "loader": "file-loader",
            "options": file_loader_options(options, dir),
        },
    })
}

impl Plugin for BaseConfigPlugin {
    fn apply(&self, api: &mut dyn ExtensionApi, options: &ProjectOptions) -> Result<()> {
        let context = path_string(api.context());
        let output_path = path_string(&api.resolve(&options.output_dir));
        let public_path = options.public_path.clone();
        let src = path_string(&api.resolve("src"));
        let node_modules = path_string(&api.resolve("node_modules"));
        let definitions = api.environment().client_env_definitions(&options.public_path);

        let images = url_loader_options(options, "img");
        let svg = file_loader_options(options, "img");
        let media = url_loader_options(options, "media");
        let fonts = url_loader_options(options, "fonts");

        api.chain(move |chain| {
            chain
                .set("mode", "development")?
                .set("context", context.clone())?
                .set("output.path", output_path.clone())?
                .set("output.filename", "[name].js")?
                .set("output.publicPath", public_path.clone())?;
            chain.entry("app").add(DEFAULT_ENTRY);

            for extension in [".mjs", ".js", ".jsx", ".json", ".wasm"] {
                chain.add("resolve.extensions", extension)?;
            }
            chain
                .add("resolve.modules", "node_modules")?
                .add("resolve.modules", node_modules.clone())?
                .add("resolveLoader.modules", "node_modules")?
                .add("resolveLoader.modules", node_modules.clone())?
                .alias("@", src.clone())?;

            chain
                .rule("images")
                .test(IMAGES)
                .use_entry("url-loader")
                .loader("url-loader")
                .options(images.clone());
            // svg is never inlined
            chain
                .rule("svg")
                .test(SVG)
                .use_entry("file-loader")
                .loader("file-loader")
                .options(svg.clone());
            chain
                .rule("media")
                .test(MEDIA)
                .use_entry("url-loader")
                .loader("url-loader")
                .options(media.clone());
            chain
                .rule("fonts")
                .test(FONTS)
                .use_entry("url-loader")
                .loader("url-loader")
                .options(fonts.clone());

            chain
                .plugin("define")
                .use_factory("webpack/lib/DefinePlugin", vec![definitions.clone()]);
            chain
                .plugin("case-sensitive-paths")
                .use_factory("case-sensitive-paths-webpack-plugin", Vec::new());
            Ok(())
        });
        Ok(())
    }
}
