//! Named module rules and their ordered loader steps.

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use crate::error::{ChainError, Result};
use crate::merge::deep_merge;
use crate::resolved::RuleMeta;

/// Ordering hint for a rule relative to normal rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforce {
    Pre,
    Post,
}

impl Enforce {
    fn as_str(self) -> &'static str {
        match self {
            Enforce::Pre => "pre",
            Enforce::Post => "post",
        }
    }
}

/// A named rule in `module.rules`.
///
/// Rules are keyed by name so that a later chain function can look one up
/// and extend it, e.g. tweak the options of an earlier loader step.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    names: Vec<String>,
    test: Option<String>,
    include: IndexSet<String>,
    exclude: IndexSet<String>,
    enforce: Option<Enforce>,
    extra: Map<String, Value>,
    uses: IndexMap<String, UseEntry>,
    one_of: IndexMap<String, Rule>,
}

impl Rule {
    pub(crate) fn new(names: Vec<String>) -> Self {
        Self {
            names,
            test: None,
            include: IndexSet::new(),
            exclude: IndexSet::new(),
            enforce: None,
            extra: Map::new(),
            uses: IndexMap::new(),
            one_of: IndexMap::new(),
        }
    }

    /// Name of this rule (last segment of its name path).
    pub fn name(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or_default()
    }

    /// Full name path, outermost rule first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Set the file pattern (regular expression source) this rule matches.
    pub fn test(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.test = Some(pattern.into());
        self
    }

    pub fn test_pattern(&self) -> Option<&str> {
        self.test.as_deref()
    }

    pub fn include(&mut self, path: impl Into<String>) -> &mut Self {
        self.include.insert(path.into());
        self
    }

    pub fn exclude(&mut self, path: impl Into<String>) -> &mut Self {
        self.exclude.insert(path.into());
        self
    }

    pub fn enforce(&mut self, enforce: Enforce) -> &mut Self {
        self.enforce = Some(enforce);
        self
    }

    pub fn pre(&mut self) -> &mut Self {
        self.enforce(Enforce::Pre)
    }

    pub fn post(&mut self) -> &mut Self {
        self.enforce(Enforce::Post)
    }

    /// Set an arbitrary rule property (e.g. `type`, `resourceQuery`).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Get or create a named loader step. Steps keep insertion order.
    pub fn use_entry(&mut self, name: &str) -> &mut UseEntry {
        self.uses.entry(name.to_string()).or_default()
    }

    /// Look up an existing loader step.
    pub fn try_use(&mut self, name: &str) -> Result<&mut UseEntry> {
        let rule = self.name().to_string();
        self.uses.get_mut(name).ok_or_else(|| ChainError::UseNotFound {
            rule,
            name: name.to_string(),
        })
    }

    pub fn has_use(&self, name: &str) -> bool {
        self.uses.contains_key(name)
    }

    pub fn remove_use(&mut self, name: &str) -> Option<UseEntry> {
        self.uses.shift_remove(name)
    }

    /// Get or create a nested `oneOf` rule.
    pub fn one_of(&mut self, name: &str) -> &mut Rule {
        let names = self.child_names(name);
        self.one_of
            .entry(name.to_string())
            .or_insert_with(|| Rule::new(names))
    }

    pub fn try_one_of(&mut self, name: &str) -> Result<&mut Rule> {
        let rule = self.name().to_string();
        self.one_of
            .get_mut(name)
            .ok_or_else(|| ChainError::OneOfNotFound {
                rule,
                name: name.to_string(),
            })
    }

    fn child_names(&self, name: &str) -> Vec<String> {
        let mut names = self.names.clone();
        names.push(name.to_string());
        names
    }

    /// Materialize this rule together with its metadata node.
    pub(crate) fn to_value(&self) -> (Value, RuleMeta) {
        let mut out = self.extra.clone();

        if let Some(test) = &self.test {
            out.insert("test".into(), Value::String(test.clone()));
        }
        if !self.include.is_empty() {
            out.insert("include".into(), strings(&self.include));
        }
        if !self.exclude.is_empty() {
            out.insert("exclude".into(), strings(&self.exclude));
        }
        if let Some(enforce) = self.enforce {
            out.insert("enforce".into(), Value::String(enforce.as_str().into()));
        }
        if !self.uses.is_empty() {
            let uses = self.uses.values().map(UseEntry::to_value).collect();
            out.insert("use".into(), Value::Array(uses));
        }

        let mut one_of_meta = Vec::with_capacity(self.one_of.len());
        if !self.one_of.is_empty() {
            let mut rules = Vec::with_capacity(self.one_of.len());
            for rule in self.one_of.values() {
                let (value, meta) = rule.to_value();
                rules.push(value);
                one_of_meta.push(meta);
            }
            out.insert("oneOf".into(), Value::Array(rules));
        }

        let meta = RuleMeta {
            names: self.names.clone(),
            one_of: one_of_meta,
        };
        (Value::Object(out), meta)
    }
}

/// One loader step of a rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UseEntry {
    loader: Option<String>,
    options: Option<Value>,
}

impl UseEntry {
    pub fn loader(&mut self, loader: impl Into<String>) -> &mut Self {
        self.loader = Some(loader.into());
        self
    }

    pub fn loader_id(&self) -> Option<&str> {
        self.loader.as_deref()
    }

    /// Replace the loader options.
    pub fn options(&mut self, options: impl Into<Value>) -> &mut Self {
        self.options = Some(options.into());
        self
    }

    pub fn current_options(&self) -> Option<&Value> {
        self.options.as_ref()
    }

    /// Deep-merge into the existing options.
    pub fn merge_options(&mut self, options: Value) -> &mut Self {
        match self.options.as_mut() {
            Some(existing) => deep_merge(existing, options),
            None => self.options = Some(options),
        }
        self
    }

    /// Transform the existing options (`null` when unset).
    pub fn tap_options(&mut self, f: impl FnOnce(Value) -> Value) -> &mut Self {
        let current = self.options.take().unwrap_or(Value::Null);
        self.options = Some(f(current));
        self
    }

    fn to_value(&self) -> Value {
        let mut out = Map::new();
        if let Some(loader) = &self.loader {
            out.insert("loader".into(), Value::String(loader.clone()));
        }
        if let Some(options) = &self.options {
            out.insert("options".into(), options.clone());
        }
        Value::Object(out)
    }
}

fn strings(set: &IndexSet<String>) -> Value {
    Value::Array(set.iter().cloned().map(Value::String).collect())
}
