use crate::types::{IdentifierKind, MembershipRecord};

/// Record for a device audience keyed by one IDFA.
pub fn idfa_record(audience_id: &str, idfa: &str, is_member: bool) -> MembershipRecord {
    MembershipRecord::new(audience_id, audience_id, is_member)
        .with_identifier(IdentifierKind::Idfa, idfa)
}

/// Record for a device audience carrying both an IDFA and a GAID.
pub fn device_record(
    audience_id: &str,
    audience_name: &str,
    idfa: &str,
    gaid: &str,
    is_member: bool,
) -> MembershipRecord {
    MembershipRecord::new(audience_id, audience_name, is_member)
        .with_identifier(IdentifierKind::Idfa, idfa)
        .with_identifier(IdentifierKind::Gaid, gaid)
}

/// Record for a customer list keyed by email.
pub fn email_record(audience_id: &str, email: &str, is_member: bool) -> MembershipRecord {
    MembershipRecord::new(audience_id, audience_id, is_member)
        .with_identifier(IdentifierKind::Email, email)
}

/// Three records for the `VIP` audience: `u1` and `u2` join, `u3` leaves.
pub fn vip_records() -> Vec<MembershipRecord> {
    vec![
        idfa_record("VIP", "u1", true),
        idfa_record("VIP", "u2", true),
        idfa_record("VIP", "u3", false),
    ]
}
