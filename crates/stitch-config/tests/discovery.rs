//! Integration tests for user option discovery against real project layouts.

use std::fs;

use stitch_config::{OptionsLoader, OptionsSource, PackageManifest};
use tempfile::TempDir;

#[test]
fn toml_config_file_is_preferred_over_package_field() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("stitch.config.toml"),
        r#"
publicPath = "/app"
outputDir = "public/"

[devServer]
port = 4000

[[chain]]
op = "alias"
key = "@"
target = "src"
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{ "name": "demo", "stitch": { "outputDir": "ignored" } }"#,
    )
    .unwrap();

    let (manifest, _) = PackageManifest::resolve(dir.path()).unwrap();
    let loaded = OptionsLoader::new(dir.path(), &manifest).load().unwrap();

    assert_eq!(
        loaded.source,
        OptionsSource::File(dir.path().join("stitch.config.toml"))
    );
    assert_eq!(loaded.options.public_path, "/app/");
    assert_eq!(loaded.options.output_dir, "public");
    assert_eq!(loaded.options.dev_server.port, Some(4000));
    assert_eq!(loaded.options.chain.len(), 1);
}

#[test]
fn package_field_is_used_without_a_config_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("package.json"),
        r#"{ "name": "demo", "stitch": { "productionSourceMap": false } }"#,
    )
    .unwrap();

    let (manifest, _) = PackageManifest::resolve(dir.path()).unwrap();
    let loaded = OptionsLoader::new(dir.path(), &manifest).load().unwrap();

    assert_eq!(loaded.source, OptionsSource::PackageField);
    assert!(!loaded.options.production_source_map);
}

#[test]
fn json_config_file_must_export_an_object() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("stitch.config.json"), "[1, 2, 3]").unwrap();

    let manifest = PackageManifest::default();
    let err = OptionsLoader::new(dir.path(), &manifest).load().unwrap_err();

    let message = err.to_string();
    assert!(message.contains("stitch.config.json"), "{message}");
    assert!(message.contains("Hint:"), "{message}");
}

#[test]
fn broken_config_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("stitch.config.toml"), "publicPath = ").unwrap();

    let manifest = PackageManifest::default();
    let err = OptionsLoader::new(dir.path(), &manifest).load().unwrap_err();
    assert!(matches!(err, stitch_config::ConfigError::Parse { .. }));
}
