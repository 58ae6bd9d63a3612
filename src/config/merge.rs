//! Deep merge functionality for configuration trees.
//!
//! Two merge flavours are used by the load pipeline:
//! - [`merge`]: loaded values override defaults, with an optional per-key
//!   [`MergeCustomizer`] that sees the full dotted path of every collision.
//! - [`fill_missing`]: only keys absent from the target are filled in. Used
//!   to fold included files under the root configuration.
//!
//! Arrays are leaves in both: never concatenated or merged element-wise.

use super::tree::{Segment, TreePath};
use serde_json::{Map, Value};

/// Hook deciding the merged value when a key exists in both trees.
///
/// Invoked once for every colliding key where at least one side is not a
/// mapping. Returning `None` keeps the default rule (loaded value wins).
pub trait MergeCustomizer: Send + Sync {
    fn customize(
        &self,
        default_value: &Value,
        loaded_value: &Value,
        key: &str,
        path: &str,
    ) -> Option<Value>;
}

impl<F> MergeCustomizer for F
where
    F: Fn(&Value, &Value, &str, &str) -> Option<Value> + Send + Sync,
{
    fn customize(
        &self,
        default_value: &Value,
        loaded_value: &Value,
        key: &str,
        path: &str,
    ) -> Option<Value> {
        self(default_value, loaded_value, key, path)
    }
}

/// Deep merge `loaded` over `defaults`.
///
/// - Mappings are merged recursively
/// - Default-only keys are preserved, loaded-only keys are added
/// - On any other collision the customizer (if given) decides, else `loaded` wins
///
/// # Example
/// ```
/// use serde_json::json;
/// use live_config::config::merge;
///
/// let defaults = json!({"server": {"port": 8080, "host": "localhost"}});
/// let loaded = json!({"server": {"port": 9000}});
/// let merged = merge(defaults, loaded, None);
/// assert_eq!(merged, json!({"server": {"port": 9000, "host": "localhost"}}));
/// ```
pub fn merge(defaults: Value, loaded: Value, customizer: Option<&dyn MergeCustomizer>) -> Value {
    match (defaults, loaded) {
        (Value::Object(default_map), Value::Object(loaded_map)) => Value::Object(merge_maps(
            default_map,
            loaded_map,
            &TreePath::root(),
            customizer,
        )),
        (_, loaded) => loaded,
    }
}

fn merge_maps(
    mut target: Map<String, Value>,
    source: Map<String, Value>,
    path: &TreePath,
    customizer: Option<&dyn MergeCustomizer>,
) -> Map<String, Value> {
    for (key, loaded_value) in source {
        match target.get_mut(&key) {
            // Updated in place so default keys keep their position.
            Some(slot) => {
                let default_value = std::mem::take(slot);
                let key_path = path.child(Segment::Key(key.clone()));
                *slot = merge_value(default_value, loaded_value, &key, &key_path, customizer);
            }
            None => {
                target.insert(key, loaded_value);
            }
        }
    }
    target
}

fn merge_value(
    default_value: Value,
    loaded_value: Value,
    key: &str,
    path: &TreePath,
    customizer: Option<&dyn MergeCustomizer>,
) -> Value {
    match (default_value, loaded_value) {
        (Value::Object(default_map), Value::Object(loaded_map)) => {
            Value::Object(merge_maps(default_map, loaded_map, path, customizer))
        }
        (default_value, loaded_value) => customizer
            .and_then(|hook| hook.customize(&default_value, &loaded_value, key, &path.to_string()))
            .unwrap_or(loaded_value),
    }
}

/// Fill keys missing from `target` with values from `source`, recursively.
///
/// Existing values in `target` are never replaced, including `null` and
/// arrays. Only when both sides hold a mapping does the fill descend.
pub fn fill_missing(target: &mut Value, source: Value) {
    let (Value::Object(target_map), Value::Object(source_map)) = (target, source) else {
        return;
    };

    for (key, source_value) in source_map {
        match target_map.get_mut(&key) {
            Some(existing) => fill_missing(existing, source_value),
            None => {
                target_map.insert(key, source_value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_merge_disjoint_is_union() {
        let defaults = json!({"a": 1, "nested": {"x": true}});
        let loaded = json!({"b": 2, "other": {"y": false}});
        let result = merge(defaults, loaded, None);
        assert_eq!(
            result,
            json!({"a": 1, "b": 2, "nested": {"x": true}, "other": {"y": false}})
        );
    }

    #[test]
    fn test_merge_nested_objects() {
        let defaults = json!({
            "server": {"host": "localhost", "port": 8080},
            "debug": true
        });
        let loaded = json!({
            "server": {"port": 9000}
        });
        let result = merge(defaults, loaded, None);
        assert_eq!(
            result,
            json!({
                "server": {"host": "localhost", "port": 9000},
                "debug": true
            })
        );
    }

    #[test]
    fn test_merge_keeps_declaration_order() {
        let defaults = json!({"zeta": 1, "alpha": {"y": 1, "x": 1}, "mid": 1});
        let loaded = json!({"alpha": {"x": 2}, "new": 4});

        let result = merge(defaults, loaded, None);

        let keys: Vec<&str> = result.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, ["zeta", "alpha", "mid", "new"]);
        let nested: Vec<&str> = result["alpha"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(nested, ["y", "x"]);
    }

    #[test]
    fn test_arrays_replaced_not_merged() {
        let defaults = json!({"items": [1, 2, 3]});
        let loaded = json!({"items": [4, 5]});
        let result = merge(defaults, loaded, None);
        assert_eq!(result, json!({"items": [4, 5]}));
    }

    #[test]
    fn test_loaded_null_overrides() {
        let result = merge(json!({"a": 1}), json!({"a": null}), None);
        assert_eq!(result, json!({"a": null}));
    }

    #[test]
    fn test_customizer_sees_full_path() {
        let defaults = json!({"a": {"b": 1}});
        let loaded = json!({"a": {"b": 2}});
        let seen = Mutex::new(Vec::new());
        let hook = |d: &Value, l: &Value, key: &str, path: &str| {
            seen.lock()
                .unwrap()
                .push((d.clone(), l.clone(), key.to_string(), path.to_string()));
            Some(json!(99))
        };

        let result = merge(defaults, loaded, Some(&hook));

        assert_eq!(result, json!({"a": {"b": 99}}));
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![(json!(1), json!(2), "b".to_string(), "a.b".to_string())]
        );
    }

    #[test]
    fn test_customizer_paths_across_sibling_subtrees() {
        // Structurally identical siblings must still report distinct paths.
        let defaults = json!({
            "primary": {"pool": {"size": 1}},
            "replica": {"pool": {"size": 1}},
            "top": 0
        });
        let loaded = json!({
            "primary": {"pool": {"size": 2}},
            "replica": {"pool": {"size": 2}},
            "top": 1
        });
        let paths = Mutex::new(Vec::new());
        let hook = |_: &Value, _: &Value, _: &str, path: &str| -> Option<Value> {
            paths.lock().unwrap().push(path.to_string());
            None
        };

        let result = merge(defaults, loaded.clone(), Some(&hook));

        assert_eq!(result, loaded);
        let mut paths = paths.into_inner().unwrap();
        paths.sort();
        assert_eq!(
            paths,
            vec!["primary.pool.size", "replica.pool.size", "top"]
        );
    }

    #[test]
    fn test_customizer_none_falls_back_to_loaded() {
        let hook = |_: &Value, _: &Value, _: &str, _: &str| -> Option<Value> { None };
        let result = merge(json!({"a": [1]}), json!({"a": [2]}), Some(&hook));
        assert_eq!(result, json!({"a": [2]}));
    }

    #[test]
    fn test_customizer_can_concatenate_arrays() {
        let hook = |d: &Value, l: &Value, _: &str, _: &str| match (d, l) {
            (Value::Array(a), Value::Array(b)) => {
                Some(Value::Array(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => None,
        };
        let result = merge(json!({"tags": ["a"]}), json!({"tags": ["b"]}), Some(&hook));
        assert_eq!(result, json!({"tags": ["a", "b"]}));
    }

    #[test]
    fn test_customizer_not_called_for_one_sided_keys() {
        let calls = Mutex::new(0);
        let hook = |_: &Value, _: &Value, _: &str, _: &str| -> Option<Value> {
            *calls.lock().unwrap() += 1;
            None
        };
        merge(json!({"a": 1}), json!({"b": 2}), Some(&hook));
        assert_eq!(calls.into_inner().unwrap(), 0);
    }

    #[test]
    fn test_overlay_replaces_object_with_primitive() {
        let result = merge(json!({"value": {"nested": true}}), json!({"value": 42}), None);
        assert_eq!(result, json!({"value": 42}));
    }

    #[test]
    fn test_fill_missing_keeps_existing() {
        let mut target = json!({"x": 1});
        fill_missing(&mut target, json!({"x": 2, "y": 3}));
        assert_eq!(target, json!({"x": 1, "y": 3}));
    }

    #[test]
    fn test_fill_missing_is_deep() {
        let mut target = json!({"db": {"host": "primary", "opts": {"ssl": true}}});
        fill_missing(
            &mut target,
            json!({"db": {"host": "other", "port": 5432, "opts": {"ssl": false, "timeout": 5}}}),
        );
        assert_eq!(
            target,
            json!({"db": {"host": "primary", "port": 5432, "opts": {"ssl": true, "timeout": 5}}})
        );
    }

    #[test]
    fn test_fill_missing_never_overwrites_null_or_arrays() {
        let mut target = json!({"a": null, "list": [1]});
        fill_missing(&mut target, json!({"a": "filled", "list": [1, 2, 3]}));
        assert_eq!(target, json!({"a": null, "list": [1]}));
    }
}
