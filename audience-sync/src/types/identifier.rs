use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a user identifier, as resolved by the mapping layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Apple advertising identifier.
    Idfa,
    /// Google advertising identifier.
    Gaid,
    /// Email address, hashed before it leaves the engine.
    Email,
    /// Advertiser-side CRM identifier.
    CrmId,
}

impl IdentifierKind {
    /// Returns the tag that upstream APIs use for this identifier kind.
    pub fn wire_tag(&self) -> &'static str {
        match self {
            IdentifierKind::Idfa => "IDFA",
            IdentifierKind::Gaid => "GAID",
            IdentifierKind::Email => "EMAIL",
            IdentifierKind::CrmId => "CRM",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

/// A raw identifier value for a user, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentifier {
    pub kind: IdentifierKind,
    pub value: String,
}

impl UserIdentifier {
    pub fn new(kind: IdentifierKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Normalized identifier used as the deduplication key within a partition.
///
/// Only [`crate::normalize`] constructs these, so two equal values always denote the same
/// real-world identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalIdentifier {
    kind: IdentifierKind,
    value: String,
}

impl CanonicalIdentifier {
    pub(crate) fn new(kind: IdentifierKind, value: String) -> Self {
        Self { kind, value }
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for CanonicalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}
