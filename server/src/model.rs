use serde_json::{Map, Value};
use tokio::sync::watch;

/// The printer's object model: an opaque JSON tree whose top-level keys
/// (`state`, `move`, `heat`, `sensors`, `job`, …) form the patch-key
/// namespace. The daemon never interprets keys below the top level; typed
/// accessors are a client's problem, not the core's.
pub type ObjectModel = Value;

/// Shared publish point every subscriber diffs its own view against. A
/// `watch` channel rather than `broadcast` because subscribers need the
/// *current* snapshot to diff from, not a queue of every intermediate
/// change.
pub fn model_channel(initial: ObjectModel) -> (watch::Sender<ObjectModel>, watch::Receiver<ObjectModel>) {
    watch::channel(initial)
}

/// Compute the minimal JSON Merge Patch (RFC 7396) that turns `before` into
/// `after`. Only the keys of `after` that differ from `before` contribute;
/// removed keys appear as `null`.
pub fn diff_merge_patch(before: &Value, after: &Value) -> Value {
    match (before, after) {
        (Value::Object(before_map), Value::Object(after_map)) => {
            let mut patch = Map::new();
            for key in before_map.keys() {
                if !after_map.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            for (key, after_value) in after_map {
                match before_map.get(key) {
                    Some(before_value) if before_value == after_value => {}
                    Some(before_value) => {
                        let nested = diff_merge_patch(before_value, after_value);
                        patch.insert(key.clone(), nested);
                    }
                    None => {
                        patch.insert(key.clone(), after_value.clone());
                    }
                }
            }
            Value::Object(patch)
        }
        _ if before == after => Value::Object(Map::new()),
        _ => after.clone(),
    }
}

/// Restrict a merge patch to a set of allowed top-level keys, as
/// Subscribe-mode's `filter` requires. `None` means no filtering.
pub fn filter_top_level(patch: Value, filter: Option<&[String]>) -> Value {
    let Some(filter) = filter else { return patch };
    match patch {
        Value::Object(map) => {
            let filtered: Map<String, Value> = map
                .into_iter()
                .filter(|(key, _)| filter.iter().any(|allowed| allowed == key))
                .collect();
            Value::Object(filtered)
        }
        other => other,
    }
}

/// Apply an RFC 7396 merge patch to `target`, in place. Used by tests to
/// assert that frame-0 plus every subsequent patch reconstructs the latest
/// snapshot.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target_map) = target else { unreachable!() };
    for (key, value) in patch_map {
        if value.is_null() {
            target_map.remove(key);
        } else {
            let entry = target_map.entry(key.clone()).or_insert(Value::Null);
            apply_merge_patch(entry, value);
        }
    }
}
