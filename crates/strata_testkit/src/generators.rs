//! Property-based test generators using proptest.
//!
//! Provides strategies for generating entities, keys and fault scripts
//! that satisfy the service's naming rules.

use crate::faults::Fault;
use proptest::prelude::*;
use strata_protocol::{LocationMode, PropertyValue, TableEntity};

/// Strategy for generating valid table names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{2,20}").expect("Invalid regex")
}

/// Strategy for generating partition or row keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_]{1,16}").expect("Invalid regex")
}

/// Strategy for generating property values of the common types.
pub fn property_value_strategy() -> impl Strategy<Value = PropertyValue> {
    prop_oneof![
        prop::string::string_regex("[ -~]{0,32}")
            .expect("Invalid regex")
            .prop_map(PropertyValue::String),
        any::<i32>().prop_map(PropertyValue::Int32),
        any::<i64>().prop_map(PropertyValue::Int64),
        any::<bool>().prop_map(PropertyValue::Boolean),
        (-1.0e9f64..1.0e9).prop_map(PropertyValue::Double),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(PropertyValue::Binary),
    ]
}

/// Strategy for generating entities with up to eight properties.
pub fn entity_strategy() -> impl Strategy<Value = TableEntity> {
    (
        key_strategy(),
        key_strategy(),
        prop::collection::btree_map(
            prop::string::string_regex("[A-Za-z][A-Za-z0-9]{0,11}").expect("Invalid regex"),
            property_value_strategy(),
            0..8,
        ),
    )
        .prop_map(|(pk, rk, properties)| {
            let mut entity = TableEntity::new(pk, rk);
            entity.properties = properties;
            entity
        })
}

/// Strategy for generating location modes.
pub fn location_mode_strategy() -> impl Strategy<Value = LocationMode> {
    prop_oneof![
        Just(LocationMode::PrimaryOnly),
        Just(LocationMode::SecondaryOnly),
        Just(LocationMode::PrimaryThenSecondary),
        Just(LocationMode::SecondaryThenPrimary),
    ]
}

/// Strategy for generating transient faults: retryable statuses and
/// network failures.
pub fn transient_fault_strategy() -> impl Strategy<Value = Fault> {
    prop_oneof![
        prop::sample::select(vec![408u16, 500, 502, 503, 504]).prop_map(Fault::Status),
        Just(Fault::Network),
    ]
}

/// Strategy for generating a script of transient faults.
pub fn fault_script_strategy(max_len: usize) -> impl Strategy<Value = Vec<Fault>> {
    prop::collection::vec(transient_fault_strategy(), 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn table_names_fit_service_rules(name in table_name_strategy()) {
            prop_assert!((3..=63).contains(&name.len()));
            prop_assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        }

        #[test]
        fn fault_scripts_are_transient(script in fault_script_strategy(6)) {
            prop_assert!(script.len() <= 6);
            prop_assert!(script.iter().all(|f| !matches!(f, Fault::Pass | Fault::Hang)));
        }

        #[test]
        fn entities_have_keys(entity in entity_strategy()) {
            prop_assert!(!entity.partition_key.is_empty());
            prop_assert!(!entity.row_key.is_empty());
            prop_assert!(entity.properties.len() < 8);
        }
    }
}
