//! proptest strategies shared by the property tests.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use storyforge_core::state_machine::TaskStatus;

pub fn task_status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::Blocked),
        Just(TaskStatus::Processing),
        Just(TaskStatus::Finished),
        Just(TaskStatus::Failed),
        Just(TaskStatus::Cancelled),
    ]
}

/// Leaf JSON values
pub fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z ]{0,12}".prop_map(Value::String),
    ]
}

/// Nested JSON objects at most three levels deep
pub fn json_object_strategy() -> impl Strategy<Value = Value> {
    let leaf = json_leaf_strategy();
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::btree_map("[a-e]{1,2}", inner, 0..4).prop_map(|entries| {
            Value::Object(entries.into_iter().collect::<Map<String, Value>>())
        })
    })
    .prop_filter("object at the root", Value::is_object)
}

/// Progress values a worker might report, in arbitrary order
pub fn progress_sequence_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..=100, 1..12)
}
