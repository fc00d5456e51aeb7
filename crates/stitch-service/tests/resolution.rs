//! Configuration resolution across plugins, options and builder contributions.

mod helpers;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use helpers::{builder, project, test_env};
use serde_json::{json, Value};
use stitch_service::stitch_chain::RawContribution;
use stitch_service::stitch_config::CONFIG_PATH_ENV;
use stitch_service::{plugin_fn, ServiceError, APP_TARGET};

#[test]
fn resolution_is_repeatable() {
    let dir = project();
    let mut service = builder(dir.path())
        .plugin(
            "stitch-plugin-extra",
            plugin_fn(|api, _| {
                api.chain(|chain| {
                    chain.add("resolve.extensions", ".ts")?;
                    Ok(())
                });
                api.configure(RawContribution::merge(json!({
                    "resolve": { "extensions": [".vue"] }
                })));
                Ok(())
            }),
        )
        .build()
        .unwrap();
    service.init(Some("development")).unwrap();

    let first = service.resolve_configuration().unwrap();
    let second = service.resolve_configuration().unwrap();
    assert_eq!(first, second);

    let extensions = first.value()["resolve"]["extensions"].as_array().unwrap();
    assert_eq!(extensions.iter().filter(|e| *e == ".ts").count(), 1);
    assert_eq!(extensions.last(), Some(&json!(".vue")));
}

#[test]
fn alias_writes_add_up_across_plugins() {
    let dir = project();
    let alias = |key: &'static str, target: &'static str| {
        plugin_fn(move |api, _| {
            api.chain(move |chain| {
                chain.alias(key, target)?;
                Ok(())
            });
            Ok(())
        })
    };

    let mut service = builder(dir.path())
        .plugin("stitch-plugin-a", alias("vue$", "vue/dist/vue.esm.js"))
        .plugin("stitch-plugin-b", alias("~", "assets"))
        .build()
        .unwrap();
    service.init(Some("development")).unwrap();

    let config = service.resolve_configuration().unwrap();
    let aliases = &config.value()["resolve"]["alias"];
    assert_eq!(aliases["vue$"], json!("vue/dist/vue.esm.js"));
    assert_eq!(aliases["~"], json!("assets"));
    assert!(aliases.get("@").is_some());
}

#[test]
fn void_transform_keeps_in_place_edits_only() {
    let dir = project();
    let mut service = builder(dir.path())
        .plugin(
            "stitch-plugin-devtool",
            plugin_fn(|api, _| {
                api.configure_with(|config| {
                    config["devtool"] = json!("eval");
                    None
                });
                api.configure_with(|_| Some(json!({ "performance": { "hints": false } })));
                Ok(())
            }),
        )
        .build()
        .unwrap();
    service.init(Some("development")).unwrap();

    let config = service.resolve_configuration().unwrap();
    assert_eq!(config.value()["devtool"], json!("eval"));
    assert_eq!(config.value()["performance"], json!({ "hints": false }));
}

#[test]
fn changing_output_path_is_an_invariant_violation() {
    let dir = project();
    let mut service = builder(dir.path())
        .configure(RawContribution::merge(json!({
            "output": { "path": "/somewhere/else" }
        })))
        .build()
        .unwrap();
    let ctx = service.init(Some("production")).unwrap();

    let config = ctx.resolve_configuration(None).unwrap();
    let err = ctx.validate(&config, APP_TARGET).unwrap_err();
    match err {
        ServiceError::InvariantViolation { field, message, hint } => {
            assert_eq!(field, "output.path");
            assert_eq!(message, "Avoid modifying output.path directly.");
            assert!(hint.contains("outputDir"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn project_options_contribute_after_plugins() {
    let dir = project();
    fs::write(
        dir.path().join("stitch.config.json"),
        r#"{
            "outputDir": "build",
            "chain": [{ "op": "set", "path": "devtool", "value": "eval-source-map" }],
            "configure": { "performance": { "hints": false } }
        }"#,
    )
    .unwrap();

    let mut service = builder(dir.path()).build().unwrap();
    let ctx = service.init(Some("development")).unwrap();
    let config = ctx.resolve_configuration(None).unwrap();

    assert_eq!(config.value()["devtool"], json!("eval-source-map"));
    assert_eq!(config.value()["performance"]["hints"], Value::Bool(false));
    assert_eq!(
        config.output_path().map(std::path::PathBuf::from),
        Some(dir.path().join("build"))
    );
    ctx.validate(&config, APP_TARGET).unwrap();
}

#[test]
fn env_files_reach_client_definitions() {
    let dir = project();
    fs::write(
        dir.path().join(".env.production"),
        "STITCH_APP_API=https://api.example.com\nSECRET=hidden\n",
    )
    .unwrap();

    let mut service = builder(dir.path()).build().unwrap();
    let ctx = service.init(Some("production")).unwrap();
    let config = ctx.resolve_configuration(None).unwrap();

    let define = config.value()["plugins"]
        .as_array()
        .unwrap()
        .iter()
        .find(|plugin| plugin["name"] == "define")
        .unwrap()
        .clone();
    let env = &define["args"][0]["process.env"];
    assert_eq!(env["STITCH_APP_API"], json!("\"https://api.example.com\""));
    assert_eq!(env["NODE_ENV"], json!("\"production\""));
    assert!(env.get("SECRET").is_none());
}

#[test]
fn cache_identifier_depends_on_contributions() {
    let dir = project();
    let cache_for = |devtool: &'static str| {
        let mut service = builder(dir.path())
            .chain(move |chain| {
                chain.set("devtool", devtool)?;
                Ok(())
            })
            .build()
            .unwrap();
        let ctx = service.init(Some("development")).unwrap();
        ctx.cache_config("babel-loader", &json!({ "babel": "7" }), &[])
            .unwrap()
    };

    let a = cache_for("eval");
    let b = cache_for("eval");
    let c = cache_for("source-map");
    assert_eq!(a, b);
    assert_ne!(a.cache_identifier, c.cache_identifier);
    assert_eq!(
        a.cache_directory,
        dir.path().join("node_modules/.cache/babel-loader")
    );
}

#[test]
fn cache_keys_during_apply_do_not_run_chain_functions() {
    let dir = project();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut service = builder(dir.path())
        .plugin(
            "stitch-plugin-babel",
            plugin_fn(move |api, _| {
                let counter = counter.clone();
                api.chain(move |chain| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    chain.set("devtool", "eval")?;
                    Ok(())
                });
                api.cache_config("babel-loader", &json!({}), &[])?;
                Ok(())
            }),
        )
        .build()
        .unwrap();

    let ctx = service.init(Some("development")).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    ctx.resolve_configuration(None).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn config_path_comes_from_the_environment() {
    let dir = project();
    fs::write(
        dir.path().join("custom.json"),
        r#"{ "outputDir": "from-env-path" }"#,
    )
    .unwrap();
    let mut env = test_env();
    env.set(CONFIG_PATH_ENV, "custom.json");

    let mut service = builder(dir.path()).environment(env).build().unwrap();
    let ctx = service.init(Some("development")).unwrap();
    assert_eq!(ctx.options().output_dir, "from-env-path");
}

#[test]
fn explicit_config_path_wins_over_the_environment() {
    let dir = project();
    fs::write(dir.path().join("custom.json"), r#"{ "outputDir": "from-env" }"#).unwrap();
    fs::write(dir.path().join("explicit.json"), r#"{ "outputDir": "explicit" }"#).unwrap();
    let mut env = test_env();
    env.set(CONFIG_PATH_ENV, "custom.json");

    let mut service = builder(dir.path())
        .environment(env)
        .config_path("explicit.json")
        .build()
        .unwrap();
    let ctx = service.init(Some("development")).unwrap();
    assert_eq!(ctx.options().output_dir, "explicit");
}
