//! Property tests for option payload parsing.

use proptest::prelude::*;
use serde_json::Value;
use sluice_engine::config::payload::{parse_payload, Payload};

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::from(i64::from(n))),
        "[a-z]{0,8}".prop_map(|s| Value::String(format!("v_{s}"))),
    ]
}

fn payload() -> impl Strategy<Value = Payload> {
    prop::collection::btree_map("[a-z][a-z_]{0,11}", scalar(), 0..6)
        .prop_map(|entries| entries.into_iter().collect())
}

proptest! {
    #[test]
    fn json_payloads_parse_back_unchanged(map in payload()) {
        let text = serde_json::to_string(&map).unwrap();
        prop_assert_eq!(parse_payload(&text, true).unwrap(), map);
    }

    #[test]
    fn yaml_payloads_parse_back_unchanged(map in payload()) {
        let text = serde_yaml::to_string(&map).unwrap();
        prop_assert_eq!(parse_payload(&text, true).unwrap(), map);
    }

    #[test]
    fn parsing_is_idempotent(map in payload()) {
        let once = parse_payload(&serde_json::to_string(&map).unwrap(), true).unwrap();
        let twice = parse_payload(&serde_json::to_string(&once).unwrap(), true).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn colon_keys_are_always_rejected(left in "[a-z]{1,6}", right in "[a-z]{1,6}") {
        let text = format!("{{\"{left}:{right}\": 1}}");
        prop_assert!(parse_payload(&text, true).is_err());
        prop_assert!(parse_payload(&text, false).is_ok());
    }
}
