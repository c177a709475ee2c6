// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! `put`/`patch` primitives for mutating a hierarchical JSON document at a
//! slash-delimited path.
//!
//! These are the two operations the rest of the streaming engine builds on:
//! an upstream driver translates every `Put`/`Patch` event it receives into
//! a call here against its private accumulator (see `rtdb-upstream`).

mod patch;
mod put;

pub mod path;

pub use patch::patch;
pub use put::put;

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-z]{1,6}".prop_map(Value::from),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        arb_leaf().prop_recursive(3, 16, 4, |inner| {
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect()))
        })
    }

    proptest! {
        #[test]
        fn put_at_root_is_identity(v in arb_value(), x in arb_value()) {
            prop_assert_eq!(put(v, "/", x.clone()), x);
        }

        #[test]
        fn double_delete_is_idempotent(v in arb_value(), key in "[a-z]{1,4}") {
            let path = format!("/{key}");
            let once = put(v, &path, Value::Null);
            let twice = put(once.clone(), &path, Value::Null);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn patch_commutes_over_disjoint_keys(
            v in arb_value(),
            ka in "[a-z]{1,4}",
            kb in "[a-z]{5,8}",
            x in arb_value(),
        ) {
            prop_assume!(ka != kb);
            let mut patch_payload = serde_json::Map::new();
            patch_payload.insert(ka.clone(), Value::Null);
            patch_payload.insert(kb.clone(), x.clone());
            let via_patch = patch(v.clone(), "/", Value::Object(patch_payload));
            let via_puts = put(put(v, &format!("/{ka}"), Value::Null), &format!("/{kb}"), x);
            prop_assert_eq!(via_patch, via_puts);
        }
    }
}
