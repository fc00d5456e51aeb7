//! Named bundler plugin entries.

use serde_json::{Map, Value};

/// A named entry in the `plugins` list.
///
/// The factory is an opaque identifier understood by the bundler; the
/// arguments are passed to it verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSlot {
    name: String,
    factory: Option<String>,
    args: Vec<Value>,
}

impl PluginSlot {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factory: None,
            args: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> Option<&str> {
        self.factory.as_deref()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Set the factory and its constructor arguments.
    pub fn use_factory(&mut self, factory: impl Into<String>, args: Vec<Value>) -> &mut Self {
        self.factory = Some(factory.into());
        self.args = args;
        self
    }

    /// Rewrite the constructor arguments of an existing entry.
    pub fn tap(&mut self, f: impl FnOnce(Vec<Value>) -> Vec<Value>) -> &mut Self {
        let args = std::mem::take(&mut self.args);
        self.args = f(args);
        self
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("name".into(), Value::String(self.name.clone()));
        out.insert(
            "factory".into(),
            self.factory.clone().map(Value::String).unwrap_or(Value::Null),
        );
        out.insert("args".into(), Value::Array(self.args.clone()));
        Value::Object(out)
    }
}
