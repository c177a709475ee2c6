//! The `patch` primitive: apply a shallow merge as a sequence of `put`s.

use serde_json::Value;

use crate::path;
use crate::put::put;

/// Apply each top-level key of `value` as an independent [`put`] rooted at
/// `path`. A `value` that is not a JSON object leaves `object` unchanged.
///
/// ```
/// use serde_json::json;
///
/// let doc = json!({"fiz": "fuz", "foo": {"bar": "buz"}});
/// let doc = rtdb_json::patch(doc, "/foo", json!({"bar": null, "fiz": "fuz"}));
/// assert_eq!(doc, json!({"fiz": "fuz", "foo": {"fiz": "fuz"}}));
/// ```
#[must_use]
pub fn patch(object: Value, path: &str, value: Value) -> Value {
    let Value::Object(fields) = value else {
        return object;
    };

    let base_keys = path::split(path);
    fields.into_iter().fold(object, |acc, (key, field_value)| {
        let mut keys = base_keys.clone();
        keys.push(key);
        put(acc, &path::join(&keys), field_value)
    })
}
