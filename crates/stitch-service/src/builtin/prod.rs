use serde_json::{json, Value};
use stitch_config::ProjectOptions;

use crate::api::ExtensionApi;
use crate::error::Result;
use crate::plugin::Plugin;

/// Production mode settings, applied when `NODE_ENV` is `production`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProdConfigPlugin;

impl Plugin for ProdConfigPlugin {
    fn apply(&self, api: &mut dyn ExtensionApi, options: &ProjectOptions) -> Result<()> {
        let env = api.environment();
        if !env.is_production() {
            return Ok(());
        }
        let devtool = if options.production_source_map {
            json!("source-map")
        } else {
            Value::Bool(false)
        };
        let test = env.is_test();

        api.chain(move |chain| {
            chain
                .set("mode", "production")?
                .set("devtool", devtool.clone())?;
            chain
                .plugin("hash-module-ids")
                .use_factory(
                    "webpack/lib/HashedModuleIdsPlugin",
                    vec![json!({ "hashDigest": "hex" })],
                );
            if test {
                chain.set("optimization.minimize", false)?;
            }
            Ok(())
        });
        Ok(())
    }
}
