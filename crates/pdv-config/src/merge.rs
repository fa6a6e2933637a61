//! # Deep Merge
//!
//! ```text
//!   base                        overlay                 result
//!   { "a": { "b": 1,            { "a": { "b": 9 },      { "a": { "b": 9,
//!            "c": 2 },                "x": [1] }                 "c": 2 },
//!     "x": [0, 0] }                                       "x": [1] }
//! ```
//!
//! Objects merge key by key, recursively. Anything else in the overlay
//! (scalars, arrays, null) replaces the base value outright.

use serde_json::Value;

/// Merges `overlay` into `base` in place. The overlay wins on every key.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Non-mutating form of [`deep_merge`].
pub fn merged(base: &Value, overlay: &Value) -> Value {
    let mut out = base.clone();
    deep_merge(&mut out, overlay.clone());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_override_wins_nested() {
        let base = json!({ "a": { "b": 1, "c": 2 } });
        let overlay = json!({ "a": { "b": 9 } });
        assert_eq!(merged(&base, &overlay), json!({ "a": { "b": 9, "c": 2 } }));
    }

    #[test]
    fn test_leaf_replaces_object_and_back() {
        let mut base = json!({ "scale": { "port": "COM1" }, "list": [1, 2] });
        deep_merge(&mut base, json!({ "scale": "off", "list": [3] }));
        assert_eq!(base, json!({ "scale": "off", "list": [3] }));

        deep_merge(&mut base, json!({ "scale": { "port": "COM3" } }));
        assert_eq!(base["scale"]["port"], "COM3");
    }

    #[test]
    fn test_null_overlay_value_replaces() {
        let base = json!({ "token": "abc" });
        assert_eq!(merged(&base, &json!({ "token": null })), json!({ "token": null }));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-c]{1,2}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_merge_with_self_is_noop(value in arb_json()) {
            prop_assert_eq!(merged(&value, &value), value);
        }

        #[test]
        fn prop_applying_overlay_twice_is_idempotent(base in arb_json(), overlay in arb_json()) {
            let once = merged(&base, &overlay);
            prop_assert_eq!(merged(&once, &overlay), once);
        }

        #[test]
        fn prop_untouched_keys_survive(
            base in prop::collection::btree_map("[a-c]", arb_json(), 0..4),
            overlay in prop::collection::btree_map("[d-f]", arb_json(), 0..4),
        ) {
            let base = Value::Object(base.into_iter().collect());
            let overlay = Value::Object(overlay.into_iter().collect());
            let out = merged(&base, &overlay);
            for (key, value) in base.as_object().into_iter().flatten() {
                prop_assert_eq!(&out[key.as_str()], value);
            }
            for (key, value) in overlay.as_object().into_iter().flatten() {
                prop_assert_eq!(&out[key.as_str()], value);
            }
        }
    }
}
