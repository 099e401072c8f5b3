//! Batch audience synchronization with per-record outcome reconciliation.
//!
//! Membership changes for many users are coalesced into one upstream request per audience and
//! action, dispatched concurrently, and reconciled back so that every input record learns whether
//! it succeeded, failed or was never attempted.

pub mod classify;
pub mod dispatch;
pub mod engine;
pub mod error;
mod macros;
pub mod normalize;
pub mod partition;
pub mod reconcile;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod upstream;

pub use engine::{AudienceSyncEngine, RunMode, RunOutput};
