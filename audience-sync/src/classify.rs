use serde_json::{Map, Value};

use crate::types::{Action, MembershipRecord};

/// Classifies a record as an addition or a removal.
///
/// Only an explicit `true` membership flag adds the user; a missing or `false` flag removes them.
pub fn classify(record: &MembershipRecord) -> Action {
    match record.is_member {
        Some(true) => Action::Add,
        _ => Action::Remove,
    }
}

/// Reads the membership flag for `audience_key` from an event's traits or properties.
///
/// Returns [`None`] when the key is absent or does not hold a boolean.
pub fn membership_flag(traits: &Map<String, Value>, audience_key: &str) -> Option<bool> {
    traits.get(audience_key).and_then(Value::as_bool)
}
