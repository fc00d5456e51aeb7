//! Parsed command arguments.
//!
//! Commands receive their arguments in a loose flag map plus positionals,
//! the way `minimist` style parsers produce them: `--key=value`,
//! `--key value`, `--flag`, `--no-flag`, `-h`, `-abc` and `--` are all
//! understood.

use std::collections::BTreeMap;

use serde_json::{Number, Value};

/// Flags that never consume the following argument as their value.
pub const DEFAULT_BOOLEAN_FLAGS: &[&str] = &[
    "watch", "open", "copy", "https", "verbose", "help", "stdin", "clean", "rules", "plugins",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    positional: Vec<String>,
    flags: BTreeMap<String, Value>,
}

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw argument vector.
    pub fn parse<S: AsRef<str>>(argv: &[S], boolean_flags: &[&str]) -> Self {
        let mut args = Self::new();
        let mut iter = argv.iter().map(AsRef::as_ref).peekable();

        while let Some(arg) = iter.next() {
            if arg == "--" {
                args.positional.extend(iter.by_ref().map(str::to_string));
                break;
            }

            if let Some(long) = arg.strip_prefix("--") {
                if let Some((key, value)) = long.split_once('=') {
                    args.flags.insert(key.to_string(), coerce(value));
                } else if let Some(key) = long.strip_prefix("no-") {
                    args.flags.insert(key.to_string(), Value::Bool(false));
                } else if boolean_flags.contains(&long) {
                    args.flags.insert(long.to_string(), Value::Bool(true));
                } else {
                    let value = match iter.peek() {
                        Some(next) if !next.starts_with('-') => {
                            let next = coerce(next);
                            iter.next();
                            next
                        }
                        _ => Value::Bool(true),
                    };
                    args.flags.insert(long.to_string(), value);
                }
                continue;
            }

            if let Some(short) = arg.strip_prefix('-').filter(|s| !s.is_empty()) {
                let letters: Vec<char> = short.chars().collect();
                let (last, rest) = match letters.split_last() {
                    Some(split) => split,
                    None => continue,
                };
                for letter in rest {
                    args.flags.insert(letter.to_string(), Value::Bool(true));
                }
                let key = last.to_string();
                let value = match iter.peek() {
                    Some(next) if !next.starts_with('-') && !boolean_flags.contains(&key.as_str()) => {
                        let next = coerce(next);
                        iter.next();
                        next
                    }
                    _ => Value::Bool(true),
                };
                args.flags.insert(key, value);
                continue;
            }

            args.positional.push(arg.to_string());
        }

        args
    }

    pub fn with_flag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_positional(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.flags.insert(key.into(), value.into());
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn first(&self) -> Option<&str> {
        self.positional.first().map(String::as_str)
    }

    /// Remove the first positional if it equals `name`.
    pub(crate) fn shift_if(&mut self, name: &str) -> bool {
        if self.first() == Some(name) {
            self.positional.remove(0);
            true
        } else {
            false
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.flags.get(key)
    }

    /// String value of a flag. Numbers are rendered, booleans are not strings.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.flags.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Truthiness of a flag: missing, `false`, `0` and `""` are false.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.flags.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    pub fn get_u16(&self, key: &str) -> Option<u16> {
        match self.flags.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn flags(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.flags.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn wants_help(&self) -> bool {
        self.get_bool("help") || self.get_bool("h")
    }
}

fn coerce(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        if raw.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-') {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}
