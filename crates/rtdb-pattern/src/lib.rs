// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Wildcard path pattern matching over a hierarchical JSON document.
//!
//! A [`Pattern`] is a fixed-depth sequence of literal keys and `*` wildcards.
//! [`matches`] walks a [`serde_json::Value`] and enumerates every concrete
//! path the pattern admits, in the document's own key order.

use serde_json::Value;

/// One position in a [`Pattern`]: either a literal key or a `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this key.
    Literal(String),
    /// Matches any single key at this depth.
    Wildcard,
}

/// A fixed-length sequence of [`Segment`]s describing the paths a listener
/// cares about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern(Vec<Segment>);

impl Pattern {
    /// Build a pattern from path segments; the literal string `"*"` is
    /// interpreted as [`Segment::Wildcard`], every other string as a literal
    /// key.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            segments
                .into_iter()
                .map(|s| {
                    let s = s.as_ref();
                    if s == "*" {
                        Segment::Wildcard
                    } else {
                        Segment::Literal(s.to_owned())
                    }
                })
                .collect(),
        )
    }

    /// The empty pattern. Per [`matches`]'s documented contract this pattern
    /// never yields any path.
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if this pattern has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn segments(&self) -> &[Segment] {
        &self.0
    }
}

/// Enumerate every concrete key sequence of length `pattern.len()` that a
/// walk of `json` confirms exists.
///
/// A literal segment requires the key to be present with a non-null value; a
/// wildcard segment enumerates every key present in the object at that
/// depth, in the object's own key order, regardless of whether its value is
/// null. An empty pattern always yields no paths — deliberately, not the
/// single empty path — so a listener registered with an empty pattern never
/// fires.
#[must_use]
pub fn matches(json: &Value, pattern: &Pattern) -> Vec<Vec<String>> {
    matches_segments(json, pattern.segments())
}

fn matches_segments(json: &Value, pattern: &[Segment]) -> Vec<Vec<String>> {
    let Some((first, rest)) = pattern.split_first() else {
        return Vec::new();
    };

    let keys: Vec<String> = match first {
        Segment::Wildcard => object_keys(json),
        Segment::Literal(key) => {
            if get_existing(json, key).is_some() {
                vec![key.clone()]
            } else {
                Vec::new()
            }
        }
    };

    if rest.is_empty() {
        return keys.into_iter().map(|k| vec![k]).collect();
    }

    let mut result = Vec::new();
    for key in keys {
        let subtree = child(json, &key);
        for mut tail in matches_segments(subtree, rest) {
            let mut full = Vec::with_capacity(tail.len() + 1);
            full.push(key.clone());
            full.append(&mut tail);
            result.push(full);
        }
    }
    result
}

/// `true` if `path` appears in `paths` under exact key-sequence equality.
#[must_use]
pub fn has(paths: &[Vec<String>], path: &[String]) -> bool {
    paths.iter().any(|p| p.as_slice() == path)
}

/// Walk `json` along `path`, returning the subtree at its end, if present.
#[must_use]
pub fn subtree<'a>(json: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut cur = json;
    for key in path {
        cur = cur.as_object()?.get(key)?;
    }
    Some(cur)
}

fn object_keys(json: &Value) -> Vec<String> {
    match json {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn child<'a>(json: &'a Value, key: &str) -> &'a Value {
    json.as_object().and_then(|m| m.get(key)).unwrap_or(&Value::Null)
}

fn get_existing<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    match json.as_object().and_then(|m| m.get(key)) {
        Some(Value::Null) | None => None,
        Some(v) => Some(v),
    }
}
