//! Canonicalisation of raw user identifiers.
//!
//! Deduplication inside a partition compares canonical identifiers, so every transform here must
//! be deterministic: the same raw input always yields the same canonical value.

use sha2::{Digest, Sha256};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::types::{CanonicalIdentifier, IdentifierKind, MembershipRecord};

/// Length of a hex encoded SHA-256 digest.
const SHA256_HEX_LEN: usize = 64;

/// Returns the canonical form of `raw` for the given identifier kind.
///
/// Returns [`None`] when nothing usable is left after trimming.
pub fn normalize(kind: IdentifierKind, raw: &str) -> Option<CanonicalIdentifier> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let value = match kind {
        IdentifierKind::Idfa => trimmed.to_uppercase(),
        IdentifierKind::Gaid => trimmed.to_lowercase(),
        IdentifierKind::Email => {
            if is_sha256_hex(trimmed) {
                trimmed.to_ascii_lowercase()
            } else {
                hash_email(trimmed)
            }
        }
        IdentifierKind::CrmId => trimmed.to_owned(),
    };

    Some(CanonicalIdentifier::new(kind, value))
}

/// Hashes an email address the way customer list APIs expect it: SHA-256 over the trimmed,
/// lower-cased address, hex encoded.
pub fn hash_email(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Returns the distinct canonical identifiers of `record` whose kind is accepted, in the order
/// they appear on the record.
///
/// Fails with [`ErrorKind::MissingIdentifier`] when the record has no usable identifier of an
/// accepted kind.
pub fn normalize_record<F>(
    record: &MembershipRecord,
    accepts: F,
) -> SyncResult<Vec<CanonicalIdentifier>>
where
    F: Fn(IdentifierKind) -> bool,
{
    let mut canonical: Vec<CanonicalIdentifier> = Vec::with_capacity(record.user_identifiers.len());
    for identifier in &record.user_identifiers {
        if !accepts(identifier.kind) {
            continue;
        }

        let Some(id) = normalize(identifier.kind, &identifier.value) else {
            continue;
        };

        if !canonical.contains(&id) {
            canonical.push(id);
        }
    }

    if canonical.is_empty() {
        let present = record
            .user_identifiers
            .iter()
            .map(|identifier| identifier.kind.wire_tag())
            .collect::<Vec<_>>();

        bail!(
            ErrorKind::MissingIdentifier,
            "Record has no usable identifier",
            format!(
                "record carries no usable identifier accepted by the upstream (present kinds: [{}])",
                present.join(", ")
            )
        );
    }

    Ok(canonical)
}
