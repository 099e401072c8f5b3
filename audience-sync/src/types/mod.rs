//! Core data types flowing through the synchronization engine.

mod identifier;
mod outcome;
mod record;

pub use identifier::{CanonicalIdentifier, IdentifierKind, UserIdentifier};
pub use outcome::{OutcomeBook, RecordOutcome, SingleOutcome};
pub use record::{Action, MembershipRecord};
