//! Raw configuration contributions and deep merging.
//!
//! Raw contributions are applied after the chainable builder has been
//! materialized. A contribution is either a plain value that is deep-merged,
//! or a transform that receives the current configuration and may return a
//! partial configuration to merge.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::resolved::{reattach_rule_meta, ResolvedConfig};

pub type TransformFn = Arc<dyn Fn(&mut Value) -> Option<Value> + Send + Sync>;

#[derive(Clone)]
pub enum RawContribution {
    /// Deep-merged into the accumulated configuration.
    Merge(Value),
    /// Called with the accumulated configuration. `Some` is deep-merged,
    /// `None` means the transform mutated the configuration in place.
    Transform(TransformFn),
}

impl RawContribution {
    pub fn merge(value: Value) -> Self {
        RawContribution::Merge(value)
    }

    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(&mut Value) -> Option<Value> + Send + Sync + 'static,
    {
        RawContribution::Transform(Arc::new(f))
    }
}

impl fmt::Debug for RawContribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawContribution::Merge(value) => f.debug_tuple("Merge").field(value).finish(),
            RawContribution::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// Merge `update` into `target`.
///
/// Objects merge key-wise, arrays concatenate, anything else (including
/// `null`) replaces the target.
pub fn deep_merge(target: &mut Value, update: Value) {
    match (target, update) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                match target_map.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target_items), Value::Array(update_items)) => {
            target_items.extend(update_items);
        }
        (slot, update) => *slot = update,
    }
}

/// Owned variant of [`deep_merge`].
pub fn merged(mut base: Value, update: Value) -> Value {
    deep_merge(&mut base, update);
    base
}

/// Apply raw contributions in order on top of a materialized configuration.
///
/// When at least one merge produced a new graph, rule metadata from `base`
/// is re-attached positionally onto the result.
pub fn apply_raw_contributions<'a, I>(base: ResolvedConfig, contributions: I) -> ResolvedConfig
where
    I: IntoIterator<Item = &'a RawContribution>,
{
    let (mut config, original_meta) = base.into_parts();
    let mut merged_any = false;

    for contribution in contributions {
        match contribution {
            RawContribution::Transform(transform) => {
                if let Some(partial) = transform(&mut config) {
                    deep_merge(&mut config, partial);
                    merged_any = true;
                }
            }
            RawContribution::Merge(value) => {
                deep_merge(&mut config, value.clone());
                merged_any = true;
            }
        }
    }

    let rule_meta = if merged_any {
        debug!("re-attaching rule metadata after raw config merge");
        reattach_rule_meta(&original_meta, config.pointer("/module/rules"))
    } else {
        original_meta
    };

    ResolvedConfig::new(config, rule_meta)
}
