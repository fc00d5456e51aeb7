//! Checks on the final configuration.
//!
//! `output.path` and `output.publicPath` are owned by the project options.
//! Contributions may read them but must not change them; a change is only
//! detectable after every contribution ran.

use std::path::Path;

use stitch_chain::ResolvedConfig;
use stitch_config::ProjectOptions;

use crate::error::{Result, ServiceError};
use crate::paths::resolve_path;

pub const APP_TARGET: &str = "app";

pub fn validate_config(
    config: &ResolvedConfig,
    context: &Path,
    options: &ProjectOptions,
    target: &str,
) -> Result<()> {
    let expected = resolve_path(context, &options.output_dir);
    let output_path = config.output_path().map(Path::new);

    if output_path != Some(expected.as_path()) {
        return Err(ServiceError::invariant(
            "output.path",
            "Avoid modifying output.path directly.",
            "Use the \"outputDir\" option instead.",
        ));
    }

    if output_path == Some(context) {
        return Err(ServiceError::invariant(
            "output.path",
            "Do not set output directory to project root.",
            "Point the \"outputDir\" option at a subdirectory such as \"dist\".",
        ));
    }

    if target == APP_TARGET {
        check_public_path(config, options)?;
    }
    Ok(())
}

pub(crate) fn check_public_path(config: &ResolvedConfig, options: &ProjectOptions) -> Result<()> {
    if config.public_path() != Some(options.public_path.as_str()) {
        return Err(ServiceError::invariant(
            "output.publicPath",
            "Avoid modifying output.publicPath directly.",
            "Use the \"publicPath\" option instead.",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(path: &str, public_path: &str) -> ResolvedConfig {
        ResolvedConfig::new(
            json!({ "output": { "path": path, "publicPath": public_path } }),
            Vec::new(),
        )
    }

    #[test]
    fn accepts_option_derived_values() {
        let options = ProjectOptions::default();
        validate_config(&config("/project/dist", "/"), Path::new("/project"), &options, "app").unwrap();
    }

    #[test]
    fn rejects_a_changed_output_path() {
        let options = ProjectOptions::default();
        let err = validate_config(&config("/project/build", "/"), Path::new("/project"), &options, "app")
            .unwrap_err();
        match err {
            ServiceError::InvariantViolation { field, hint, .. } => {
                assert_eq!(field, "output.path");
                assert!(hint.contains("outputDir"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_the_project_root() {
        let options = ProjectOptions {
            output_dir: ".".into(),
            ..ProjectOptions::default()
        };
        let err = validate_config(&config("/project", "/"), Path::new("/project"), &options, "app")
            .unwrap_err();
        assert!(err.to_string().contains("project root"));
    }

    #[test]
    fn public_path_only_checked_for_apps() {
        let options = ProjectOptions::default();
        let changed = config("/project/dist", "/cdn/");
        let err = validate_config(&changed, Path::new("/project"), &options, "app").unwrap_err();
        assert!(err.to_string().starts_with("Configuration Error:"));
        assert!(err.to_string().contains("publicPath"));
        validate_config(&changed, Path::new("/project"), &options, "lib").unwrap();
    }
}
