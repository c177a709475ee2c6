// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! A single registered listener: a pattern, a callback, and the document as
//! of the last dispatch that reached it.
//!
//! [`Listener`] is pure — it owns no lock and no channel. `rtdb-stream`
//! drives its two dispatch passes ([`Listener::process_remove`] and
//! [`Listener::process_change`]) under its own synchronization.

use serde_json::{Map, Value};

use rtdb_pattern::{has, matches, subtree, Pattern};

/// Callback invoked for every path a listener's pattern matches when it
/// changes. `prev`/`curr` are canonical compact JSON bytes of the subtree at
/// `path`, or `None` when that side is absent (a removal has no `curr`; a
/// fresh addition has no `prev`).
pub type Callback = Box<dyn Fn(&[String], Option<Vec<u8>>, Option<Vec<u8>>) + Send + Sync>;

/// A pattern-matched subscription against an evolving document.
pub struct Listener {
    pattern: Pattern,
    callback: Callback,
    last_seen: Value,
}

impl Listener {
    /// Register a new listener. Its `last_seen` starts as the empty object,
    /// per the reference contract — the first real dispatch pass catches it
    /// up to the document's actual state.
    #[must_use]
    pub fn new(pattern: Pattern, callback: Callback) -> Self {
        Self {
            pattern,
            callback,
            last_seen: Value::Object(Map::new()),
        }
    }

    /// The pattern this listener was registered with.
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Removal pass: report every path that matched `last_seen` but no
    /// longer matches `document`, in reverse match order. Does not advance
    /// `last_seen` — call [`Listener::process_change`] afterwards to do
    /// that.
    pub fn process_remove(&self, document: &Value) {
        let prev_matches = matches(&self.last_seen, &self.pattern);
        let curr_matches = matches(document, &self.pattern);

        for path in prev_matches.iter().rev() {
            if !has(&curr_matches, path) {
                let prev = subtree_bytes(&self.last_seen, path);
                (self.callback)(path, prev, None);
            }
        }
    }

    /// Change pass: report every path matching `document` whose subtree
    /// differs (byte-for-byte once serialized) from `last_seen`, in match
    /// order, then advance `last_seen` to `document`.
    pub fn process_change(&mut self, document: &Value) {
        let curr_matches = matches(document, &self.pattern);

        for path in &curr_matches {
            let prev = subtree(&self.last_seen, path);
            let curr = subtree(document, path);
            if prev != curr {
                (self.callback)(path, prev.map(to_compact), curr.map(to_compact));
            }
        }

        self.last_seen = document.clone();
    }

    /// Synthesise the "everything this listener has ever seen just
    /// disappeared" dispatch used by `shutdown`. Computed directly from
    /// `last_seen` rather than by diffing against a throwaway empty
    /// document, so it is correct even when `last_seen`'s root is not an
    /// object.
    pub fn synthetic_removal(&self) {
        let prev_matches = matches(&self.last_seen, &self.pattern);
        for path in prev_matches.iter().rev() {
            let prev = subtree_bytes(&self.last_seen, path);
            (self.callback)(path, prev, None);
        }
    }
}

fn subtree_bytes(document: &Value, path: &[String]) -> Option<Vec<u8>> {
    subtree(document, path).map(to_compact)
}

fn to_compact(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}
