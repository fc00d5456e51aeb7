//! Materialized configuration and per-rule metadata.

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use serde::Serialize;
use serde_json::Value;

/// Human-readable names of a materialized rule, positionally aligned with
/// `module.rules` (and recursively with each rule's `oneOf`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleMeta {
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<RuleMeta>,
}

/// A plain configuration value plus the auxiliary rule metadata that plain
/// JSON cannot carry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    value: Value,
    rule_meta: Vec<RuleMeta>,
}

impl ResolvedConfig {
    pub fn new(value: Value, rule_meta: Vec<RuleMeta>) -> Self {
        Self { value, rule_meta }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn into_parts(self) -> (Value, Vec<RuleMeta>) {
        (self.value, self.rule_meta)
    }

    pub fn rule_meta(&self) -> &[RuleMeta] {
        &self.rule_meta
    }

    /// Names of the rule at `position`, where each index descends one level
    /// (`[2, 0]` is the first `oneOf` of the third rule).
    pub fn rule_names(&self, position: &[usize]) -> Option<&[String]> {
        let (first, rest) = position.split_first()?;
        let mut node = self.rule_meta.get(*first)?;
        for index in rest {
            node = node.one_of.get(*index)?;
        }
        Some(&node.names)
    }

    pub fn rules(&self) -> Option<&Vec<Value>> {
        self.value.pointer("/module/rules").and_then(Value::as_array)
    }

    pub fn output_path(&self) -> Option<&str> {
        self.value.pointer("/output/path").and_then(Value::as_str)
    }

    pub fn public_path(&self) -> Option<&str> {
        self.value.pointer("/output/publicPath").and_then(Value::as_str)
    }

    /// Every entry file resolved against `context` and lexically cleaned.
    ///
    /// `entry` may be a string, an array, or an object of strings/arrays.
    pub fn entry_files(&self, context: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        match self.value.get("entry") {
            Some(Value::String(file)) => files.push(file.clone()),
            Some(Value::Array(list)) => collect_strings(list, &mut files),
            Some(Value::Object(map)) => {
                for value in map.values() {
                    match value {
                        Value::String(file) => files.push(file.clone()),
                        Value::Array(list) => collect_strings(list, &mut files),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        files
            .into_iter()
            .map(|file| context.join(file).clean())
            .collect()
    }

    /// The configuration with each rule annotated by a `__ruleNames` key,
    /// for display purposes.
    pub fn annotated(&self) -> Value {
        let mut value = self.value.clone();
        if let Some(rules) = value
            .pointer_mut("/module/rules")
            .and_then(Value::as_array_mut)
        {
            annotate(rules, &self.rule_meta);
        }
        value
    }
}

fn collect_strings(list: &[Value], out: &mut Vec<String>) {
    out.extend(list.iter().filter_map(Value::as_str).map(str::to_string));
}

fn annotate(rules: &mut [Value], meta: &[RuleMeta]) {
    for (rule, node) in rules.iter_mut().zip(meta) {
        if let Value::Object(map) = rule {
            map.insert(
                "__ruleNames".into(),
                Value::Array(node.names.iter().cloned().map(Value::String).collect()),
            );
            if let Some(Value::Array(children)) = map.get_mut("oneOf") {
                annotate(children, &node.one_of);
            }
        }
    }
}

/// Re-attach metadata from the pre-merge graph onto `rules` by position.
///
/// Positions that no longer exist lose their metadata; rules appended by a
/// merge have none.
pub fn reattach_rule_meta(meta: &[RuleMeta], rules: Option<&Value>) -> Vec<RuleMeta> {
    let Some(rules) = rules.and_then(Value::as_array) else {
        return Vec::new();
    };

    meta.iter()
        .zip(rules)
        .map(|(node, rule)| RuleMeta {
            names: node.names.clone(),
            one_of: reattach_rule_meta(&node.one_of, rule.get("oneOf")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(names: &[&str], one_of: Vec<RuleMeta>) -> RuleMeta {
        RuleMeta {
            names: names.iter().map(|s| s.to_string()).collect(),
            one_of,
        }
    }

    #[test]
    fn rule_names_descend_into_one_of() {
        let config = ResolvedConfig::new(
            json!({}),
            vec![
                meta(&["js"], vec![]),
                meta(&["css"], vec![meta(&["css", "modules"], vec![])]),
            ],
        );

        assert_eq!(config.rule_names(&[0]).unwrap(), ["js"]);
        assert_eq!(config.rule_names(&[1, 0]).unwrap(), ["css", "modules"]);
        assert!(config.rule_names(&[1, 1]).is_none());
        assert!(config.rule_names(&[]).is_none());
    }

    #[test]
    fn reattach_drops_positions_that_vanished() {
        let before = vec![meta(&["a"], vec![]), meta(&["b"], vec![])];
        let rules = json!([{ "test": "a" }]);
        let after = reattach_rule_meta(&before, Some(&rules));
        assert_eq!(after, vec![meta(&["a"], vec![])]);
    }

    #[test]
    fn reattach_recurses_into_one_of() {
        let before = vec![meta(&["css"], vec![meta(&["css", "vue"], vec![])])];
        let rules = json!([{ "oneOf": [{ "test": "x" }, { "test": "y" }] }]);
        let after = reattach_rule_meta(&before, Some(&rules));
        assert_eq!(after[0].one_of.len(), 1);
        assert_eq!(after[0].one_of[0].names, ["css", "vue"]);
    }

    #[test]
    fn entry_files_flatten_every_shape() {
        let context = Path::new("/project");
        let config = ResolvedConfig::new(
            json!({ "entry": { "app": ["./src/main.js", "../shared/polyfills.js"], "admin": "./src/admin.js" } }),
            vec![],
        );
        let mut files = config.entry_files(context);
        files.sort();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/project/src/admin.js"),
                PathBuf::from("/project/src/main.js"),
                PathBuf::from("/shared/polyfills.js"),
            ]
        );

        let single = ResolvedConfig::new(json!({ "entry": "index.js" }), vec![]);
        assert_eq!(single.entry_files(context), vec![PathBuf::from("/project/index.js")]);
    }

    #[test]
    fn annotated_marks_rules() {
        let config = ResolvedConfig::new(
            json!({ "module": { "rules": [{ "test": "x", "oneOf": [{}] }] } }),
            vec![meta(&["images"], vec![meta(&["images", "svg"], vec![])])],
        );
        let annotated = config.annotated();
        assert_eq!(annotated["module"]["rules"][0]["__ruleNames"], json!(["images"]));
        assert_eq!(
            annotated["module"]["rules"][0]["oneOf"][0]["__ruleNames"],
            json!(["images", "svg"])
        );
        // the original value is untouched
        assert!(config.value()["module"]["rules"][0].get("__ruleNames").is_none());
    }
}
