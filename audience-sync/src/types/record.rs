use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::identifier::{IdentifierKind, UserIdentifier};

/// One membership change for one user, as produced by the mapping layer.
///
/// The record's original index is its position in the slice handed to the engine. Records are
/// never mutated by the engine; outcomes carry a clone as the sent-payload snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Identifiers for the same user, of one or more kinds.
    #[serde(default)]
    pub user_identifiers: Vec<UserIdentifier>,
    /// Identifier of the target audience.
    pub audience_id: String,
    /// Human-readable name of the target audience.
    #[serde(default)]
    pub audience_name: String,
    /// Membership flag: `true` adds the user, anything else removes them.
    #[serde(default)]
    pub is_member: Option<bool>,
}

impl MembershipRecord {
    /// Creates a record without identifiers for the given audience.
    pub fn new(
        audience_id: impl Into<String>,
        audience_name: impl Into<String>,
        is_member: bool,
    ) -> Self {
        Self {
            user_identifiers: Vec::new(),
            audience_id: audience_id.into(),
            audience_name: audience_name.into(),
            is_member: Some(is_member),
        }
    }

    /// Adds an identifier to the record.
    pub fn with_identifier(mut self, kind: IdentifierKind, value: impl Into<String>) -> Self {
        self.user_identifiers.push(UserIdentifier::new(kind, value));
        self
    }
}

/// Membership operation a record asks the upstream to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Add,
    Remove,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Remove => "remove",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
