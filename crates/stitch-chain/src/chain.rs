//! The chainable configuration builder.

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::error::{ChainError, Result};
use crate::merge::deep_merge;
use crate::path::ConfigPath;
use crate::plugin::PluginSlot;
use crate::resolved::{ResolvedConfig, RuleMeta};
use crate::rule::Rule;

/// Ordered set of files for one named entry point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryPoint(IndexSet<String>);

impl EntryPoint {
    pub fn add(&mut self, file: impl Into<String>) -> &mut Self {
        self.0.insert(file.into());
        self
    }

    pub fn prepend(&mut self, file: impl Into<String>) -> &mut Self {
        let file = file.into();
        self.0.shift_remove(&file);
        self.0.shift_insert(0, file);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.0.clear();
        self
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mutable, path-addressable build configuration.
///
/// Chain functions registered by plugins all receive the same builder and
/// run in registration order. Entries, rules and plugins are keyed by name
/// so later functions can find and extend what earlier ones declared; the
/// remaining configuration is a free-form tree addressed by [`ConfigPath`].
///
/// When both a structured section (`entry`, `module.rules`, `plugins`) and a
/// free-form value at the same path exist, the structured section wins in
/// [`ChainableConfig::to_config`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainableConfig {
    tree: Map<String, Value>,
    entries: IndexMap<String, EntryPoint>,
    rules: IndexMap<String, Rule>,
    plugins: IndexMap<String, PluginSlot>,
}

impl ChainableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, creating intermediate objects on demand.
    pub fn set(&mut self, path: impl Into<ConfigPath>, value: impl Into<Value>) -> Result<&mut Self> {
        let path = path.into();
        *self.slot_mut(&path)? = value.into();
        Ok(self)
    }

    pub fn get(&self, path: impl Into<ConfigPath>) -> Option<&Value> {
        let path = path.into();
        let (first, rest) = path.segments().split_first()?;
        let mut node = self.tree.get(first)?;
        for segment in rest {
            node = node.as_object()?.get(segment)?;
        }
        Some(node)
    }

    pub fn has(&self, path: impl Into<ConfigPath>) -> bool {
        self.get(path).is_some()
    }

    /// Add an item to the array at `path`, skipping duplicates.
    pub fn add(&mut self, path: impl Into<ConfigPath>, value: impl Into<Value>) -> Result<&mut Self> {
        let path = path.into();
        let value = value.into();
        let slot = self.slot_mut(&path)?;
        if slot.is_null() {
            *slot = Value::Array(vec![value]);
            return Ok(self);
        }
        let Some(items) = slot.as_array_mut() else {
            return Err(ChainError::InvalidPath {
                path: path.to_string(),
                reason: "existing value is not an array".into(),
            });
        };
        if !items.contains(&value) {
            items.push(value);
        }
        Ok(self)
    }

    /// Deep-merge a value into whatever is at `path`.
    pub fn merge(&mut self, path: impl Into<ConfigPath>, value: Value) -> Result<&mut Self> {
        let path = path.into();
        let slot = self.slot_mut(&path)?;
        if slot.is_null() {
            *slot = value;
        } else {
            deep_merge(slot, value);
        }
        Ok(self)
    }

    /// Remove the value at `path`. Returns the removed value, if any.
    pub fn delete(&mut self, path: impl Into<ConfigPath>) -> Option<Value> {
        let path = path.into();
        let (last, parents) = path.segments().split_last()?;
        let mut map = &mut self.tree;
        for segment in parents {
            map = map.get_mut(segment)?.as_object_mut()?;
        }
        map.remove(last)
    }

    /// Get or create a named entry point.
    pub fn entry(&mut self, name: &str) -> &mut EntryPoint {
        self.entries.entry(name.to_string()).or_default()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &EntryPoint)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn remove_entry(&mut self, name: &str) -> Option<EntryPoint> {
        self.entries.shift_remove(name)
    }

    /// Drop every entry point, e.g. before declaring one per page.
    pub fn clear_entries(&mut self) -> &mut Self {
        self.entries.clear();
        self
    }

    /// Add a `resolve.alias` entry without touching other aliases.
    pub fn alias(&mut self, key: &str, target: impl Into<String>) -> Result<&mut Self> {
        self.set(["resolve", "alias", key], Value::String(target.into()))
    }

    /// Get or create a named rule.
    pub fn rule(&mut self, name: &str) -> &mut Rule {
        self.rules
            .entry(name.to_string())
            .or_insert_with(|| Rule::new(vec![name.to_string()]))
    }

    /// Look up a rule declared earlier.
    pub fn try_rule(&mut self, name: &str) -> Result<&mut Rule> {
        self.rules
            .get_mut(name)
            .ok_or_else(|| ChainError::RuleNotFound {
                name: name.to_string(),
            })
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    pub fn remove_rule(&mut self, name: &str) -> Option<Rule> {
        self.rules.shift_remove(name)
    }

    /// Get or create a named plugin entry.
    pub fn plugin(&mut self, name: &str) -> &mut PluginSlot {
        self.plugins
            .entry(name.to_string())
            .or_insert_with(|| PluginSlot::new(name))
    }

    pub fn try_plugin(&mut self, name: &str) -> Result<&mut PluginSlot> {
        self.plugins
            .get_mut(name)
            .ok_or_else(|| ChainError::PluginNotFound {
                name: name.to_string(),
            })
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn remove_plugin(&mut self, name: &str) -> Option<PluginSlot> {
        self.plugins.shift_remove(name)
    }

    /// Materialize the builder into a plain configuration value.
    ///
    /// Pure: the builder is not modified and the same sequence of mutations
    /// always yields the same value.
    pub fn to_config(&self) -> ResolvedConfig {
        let mut tree = self.tree.clone();

        if !self.entries.is_empty() {
            let entries = self
                .entries
                .iter()
                .map(|(name, entry)| {
                    let files = entry.files().map(|f| Value::String(f.to_string())).collect();
                    (name.clone(), Value::Array(files))
                })
                .collect::<Map<String, Value>>();
            insert_at(&mut tree, &["entry"], Value::Object(entries));
        }

        let mut rule_meta: Vec<RuleMeta> = Vec::with_capacity(self.rules.len());
        if !self.rules.is_empty() {
            let mut rules = Vec::with_capacity(self.rules.len());
            for rule in self.rules.values() {
                let (value, meta) = rule.to_value();
                rules.push(value);
                rule_meta.push(meta);
            }
            insert_at(&mut tree, &["module", "rules"], Value::Array(rules));
        }

        if !self.plugins.is_empty() {
            let plugins = self.plugins.values().map(PluginSlot::to_value).collect();
            insert_at(&mut tree, &["plugins"], Value::Array(plugins));
        }

        ResolvedConfig::new(Value::Object(tree), rule_meta)
    }

    fn slot_mut(&mut self, path: &ConfigPath) -> Result<&mut Value> {
        let Some((last, parents)) = path.segments().split_last() else {
            return Err(ChainError::InvalidPath {
                path: path.to_string(),
                reason: "path is empty".into(),
            });
        };

        let mut map = &mut self.tree;
        for segment in parents {
            let node = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            map = node.as_object_mut().ok_or_else(|| ChainError::InvalidPath {
                path: path.to_string(),
                reason: format!("'{segment}' is not an object"),
            })?;
        }
        Ok(map.entry(last.clone()).or_insert(Value::Null))
    }
}

fn insert_at(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut map = map;
    for segment in parents {
        let node = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(inner) = node else {
            return;
        };
        map = inner;
    }
    map.insert(last.to_string(), value);
}
