use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::record::MembershipRecord;

/// Error code assigned to slots that no partition reported on.
const NOT_ATTEMPTED_CODE: &str = "NOT_ATTEMPTED";

/// Terminal outcome for one original record in batch mode.
///
/// Every variant carries the record as it was handed to the engine so that callers can retry
/// exactly the failed subset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// The upstream accepted every identifier of this record.
    Success {
        http_status: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
        sent: MembershipRecord,
    },
    /// The upstream rejected the record, or the request carrying it failed.
    Failure {
        #[serde(skip_serializing_if = "Option::is_none")]
        http_status: Option<u16>,
        error_code: String,
        error_message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
        sent: MembershipRecord,
    },
    /// The record was rejected locally and never sent.
    NotAttempted {
        error_code: String,
        error_message: String,
        sent: MembershipRecord,
    },
}

impl RecordOutcome {
    /// Builds a [`RecordOutcome::Failure`] from the error that caused it.
    pub fn failure(error: &SyncError, body: Option<Value>, sent: MembershipRecord) -> Self {
        RecordOutcome::Failure {
            http_status: error.http_status(),
            error_code: error.error_code().to_owned(),
            error_message: error.message().to_owned(),
            body,
            sent,
        }
    }

    /// Builds a [`RecordOutcome::NotAttempted`] from a validation error.
    pub fn not_attempted(error: &SyncError, sent: MembershipRecord) -> Self {
        RecordOutcome::NotAttempted {
            error_code: error.error_code().to_owned(),
            error_message: error.message().to_owned(),
            sent,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RecordOutcome::Failure { .. })
    }

    pub fn is_not_attempted(&self) -> bool {
        matches!(self, RecordOutcome::NotAttempted { .. })
    }

    /// Returns the HTTP status associated with this outcome, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            RecordOutcome::Success { http_status, .. } => Some(*http_status),
            RecordOutcome::Failure { http_status, .. } => *http_status,
            RecordOutcome::NotAttempted { .. } => None,
        }
    }

    /// Returns the error code for failed or skipped records.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            RecordOutcome::Success { .. } => None,
            RecordOutcome::Failure { error_code, .. }
            | RecordOutcome::NotAttempted { error_code, .. } => Some(error_code),
        }
    }

    /// Returns the error message for failed or skipped records.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            RecordOutcome::Success { .. } => None,
            RecordOutcome::Failure { error_message, .. }
            | RecordOutcome::NotAttempted { error_message, .. } => Some(error_message),
        }
    }

    /// Returns the snapshot of the record this outcome belongs to.
    pub fn sent(&self) -> &MembershipRecord {
        match self {
            RecordOutcome::Success { sent, .. }
            | RecordOutcome::Failure { sent, .. }
            | RecordOutcome::NotAttempted { sent, .. } => sent,
        }
    }
}

/// Result of a successful single-record run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleOutcome {
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Fixed-size collection of per-record outcomes, addressed by original index.
///
/// Outcomes are terminal: the first outcome recorded for a slot is kept and later ones are
/// ignored.
#[derive(Debug, Clone)]
pub struct OutcomeBook {
    slots: Vec<Option<RecordOutcome>>,
}

impl OutcomeBook {
    /// Creates a book with `len` empty slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Records `outcome` at `index`, returning `false` if the slot was already set.
    ///
    /// An index outside the book means the partitioning bookkeeping is broken and is reported as
    /// [`ErrorKind::InvariantViolation`].
    pub fn record(&mut self, index: usize, outcome: RecordOutcome) -> SyncResult<bool> {
        let len = self.slots.len();
        let Some(slot) = self.slots.get_mut(index) else {
            bail!(
                ErrorKind::InvariantViolation,
                "Outcome index is outside the input",
                format!("index {index} is not below the input length {len}")
            );
        };

        if slot.is_some() {
            debug!(index, "outcome already recorded, keeping the first one");
            return Ok(false);
        }

        *slot = Some(outcome);
        Ok(true)
    }

    /// Consumes the book, filling every empty slot with a [`RecordOutcome::NotAttempted`].
    ///
    /// `records` must be the input the book was sized for.
    pub fn into_outcomes(self, records: &[MembershipRecord]) -> Vec<RecordOutcome> {
        self.slots
            .into_iter()
            .zip(records)
            .map(|(slot, record)| {
                slot.unwrap_or_else(|| RecordOutcome::NotAttempted {
                    error_code: NOT_ATTEMPTED_CODE.to_owned(),
                    error_message: "Record was not included in any upstream request".to_owned(),
                    sent: record.clone(),
                })
            })
            .collect()
    }
}
