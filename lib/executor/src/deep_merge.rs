use serde_json::{Map, Value};
use tracing::warn;

use crate::error::StitchError;

/// Deeply merges `source` into `target`.
///
/// Objects merge key by key and arrays merge element by element. A `null`
/// source never erases data the gateway already holds. When two subgraphs
/// disagree on a scalar, the value that arrived first wins and the conflict
/// is logged.
pub fn deep_merge(target: &mut Value, source: Value) {
    if source.is_null() {
        return;
    }

    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            deep_merge_objects(target_map, source_map);
        }
        (Value::Array(target_arr), Value::Array(source_arr)) => {
            for (target_val, source_val) in target_arr.iter_mut().zip(source_arr) {
                deep_merge(target_val, source_val);
            }
        }
        (target @ Value::Null, source) => {
            *target = source;
        }
        (target, source) => {
            if *target != source {
                let anomaly = StitchError::Conflict {
                    kept: target.clone(),
                    discarded: source,
                };
                warn!(anomaly = %anomaly, "conflicting values while stitching, keeping the first");
            }
        }
    }
}

pub fn deep_merge_objects(target_map: &mut Map<String, Value>, source_map: Map<String, Value>) {
    if target_map.is_empty() {
        *target_map = source_map;
        return;
    }
    for (key, source_val) in source_map {
        match target_map.get_mut(&key) {
            Some(target_val) => deep_merge(target_val, source_val),
            None => {
                target_map.insert(key, source_val);
            }
        }
    }
}
