//! The `put` primitive: place a value at a path, pruning empty branches.

use serde_json::{Map, Value};

use crate::path;

/// Place `value` at `path` within `object`, returning the resulting document.
///
/// - An empty path (`"/"`) replaces the whole document with `value`.
/// - Writing `Value::Null` at a non-root path deletes that key; if deleting it
///   leaves its parent object empty, the parent collapses to `Value::Null`
///   too, recursively up the spine (never leaving an empty object in the
///   tree).
/// - Writing through a path whose prefix traverses a non-object leaf (a
///   string, number, bool, `null`, or array) discards that leaf and
///   synthesises nested objects down to `value`.
///
/// ```
/// use serde_json::{json, Value};
///
/// let doc = rtdb_json::put(json!({"foo": "bar"}), "/", json!({"fiz": "fuz"}));
/// assert_eq!(doc, json!({"fiz": "fuz"}));
///
/// let doc = rtdb_json::put(json!({"foo": {"bar": "buz"}}), "/foo/bar", Value::Null);
/// assert_eq!(doc, Value::Null);
/// ```
#[must_use]
pub fn put(object: Value, path: &str, value: Value) -> Value {
    put_keys(object, &path::split(path), value)
}

fn put_keys(object: Value, keys: &[String], value: Value) -> Value {
    let Some((key, rest)) = keys.split_first() else {
        return value;
    };

    match object {
        Value::Object(mut map) => {
            let existing = map.remove(key).unwrap_or(Value::Null);
            let updated = put_keys(existing, rest, value);
            if !updated.is_null() {
                map.insert(key.clone(), updated);
            }
            collapse_if_empty(map)
        }
        _ => synthesize(keys, value),
    }
}

fn collapse_if_empty(map: Map<String, Value>) -> Value {
    if map.is_empty() {
        Value::Null
    } else {
        Value::Object(map)
    }
}

/// Build a chain of singleton objects ending in `value` at `keys`; a `null`
/// value synthesises to `null` rather than a chain of objects holding nulls.
fn synthesize(keys: &[String], value: Value) -> Value {
    let Some((key, rest)) = keys.split_first() else {
        return value;
    };
    if value.is_null() {
        return Value::Null;
    }
    let mut map = Map::new();
    map.insert(key.clone(), synthesize(rest, value));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_at_root_replaces() {
        assert_eq!(put(json!({"foo": "bar"}), "/", json!({"fiz": "fuz"})), json!({"fiz": "fuz"}));
    }

    #[test]
    fn put_at_path_overwrites() {
        assert_eq!(put(json!({"foo": "bar"}), "/foo", json!("fuz")), json!({"foo": "fuz"}));
    }

    #[test]
    fn add_at_path() {
        assert_eq!(
            put(json!({"foo": "bar"}), "/fiz", json!("fuz")),
            json!({"fiz": "fuz", "foo": "bar"})
        );
    }

    #[test]
    fn replace_null_root() {
        assert_eq!(put(Value::Null, "/fiz", json!("fuz")), json!({"fiz": "fuz"}));
    }

    #[test]
    fn replace_string_leaf() {
        assert_eq!(put(json!("hello"), "/fiz", json!("fuz")), json!({"fiz": "fuz"}));
    }

    #[test]
    fn set_nested() {
        assert_eq!(
            put(json!({"foo": {"bar": "baz"}}), "/foo/bar", json!("buz")),
            json!({"foo": {"bar": "buz"}})
        );
    }

    #[test]
    fn replace_string_nested_synthesizes() {
        assert_eq!(put(json!("foo"), "/foo/bar", json!("buz")), json!({"foo": {"bar": "buz"}}));
    }

    #[test]
    fn add_nested() {
        assert_eq!(
            put(json!({"foo": {"bar": "buz"}}), "/foo/fiz", json!("fuz")),
            json!({"foo": {"bar": "buz", "fiz": "fuz"}})
        );
    }

    #[test]
    fn remove_nested_prunes_branch() {
        assert_eq!(put(json!({"foo": {"bar": "buz"}}), "/foo/bar", Value::Null), Value::Null);
    }

    #[test]
    fn remove_seminested_leaves_sibling() {
        assert_eq!(
            put(json!({"foo": {"fiz": "fuz", "bar": "buz"}}), "/foo/bar", Value::Null),
            json!({"foo": {"fiz": "fuz"}})
        );
    }

    #[test]
    fn remove_missing_path_is_noop() {
        let doc = json!({"fiz": "fuz", "foo": {"bar": "buz"}});
        assert_eq!(put(doc.clone(), "/foo/fuz/lol", Value::Null), doc);
    }

    #[test]
    fn complex_sequence_builds_document() {
        let mut doc = Value::Null;
        doc = put(doc, "/foo", json!({"bar": "biz"}));
        doc = put(doc, "/foo/bar", json!("buz"));
        doc = put(doc, "/fiz", json!("fuz"));
        assert_eq!(doc, json!({"fiz": "fuz", "foo": {"bar": "buz"}}));
    }

    #[test]
    fn idempotent_deletion() {
        let doc = json!({"foo": {"bar": "buz"}});
        let once = put(doc.clone(), "/foo/bar", Value::Null);
        let twice = put(once.clone(), "/foo/bar", Value::Null);
        assert_eq!(once, twice);
    }
}
