//! Reconstruction of per-record outcomes from one partition's upstream result.
//!
//! A settled partition ends in exactly one of three states:
//!
//! - [`PartitionState::AllSucceeded`]: 2xx without per-item errors, every owned record succeeds.
//! - [`PartitionState::PartiallyFailed`]: 2xx with per-item errors addressed by response-local
//!   index. Records behind a reported entry fail, every other owned record succeeds.
//! - [`PartitionState::TotallyFailed`]: non-2xx or transport failure, every owned record fails
//!   with the same error.
//!
//! Errors that are not upstream failures are returned as `Err`, since they mean the outcome of
//! the partition cannot be trusted.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::dispatch::{DispatchOutcome, HttpResponse};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::partition::Partition;
use crate::types::{MembershipRecord, RecordOutcome};
use crate::upstream::{AudienceUpstream, PartialError};
use crate::{bail, sync_error};

/// Terminal state of a dispatched partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    AllSucceeded,
    PartiallyFailed,
    TotallyFailed,
}

/// Outcomes of every record owned by one partition.
#[derive(Debug)]
pub struct PartitionOutcome {
    pub state: PartitionState,
    /// `(original_index, outcome)` pairs, failures first.
    pub outcomes: Vec<(usize, RecordOutcome)>,
    /// The upstream response, when one was received.
    pub response: Option<HttpResponse>,
    /// Error that decided the first failed entry, reported to single-record callers.
    pub error: Option<SyncError>,
}

/// Reconciles one settled dispatch into per-record outcomes.
///
/// `records` is the full input the partition was built from.
pub fn reconcile<U>(
    upstream: &U,
    dispatched: DispatchOutcome,
    records: &[MembershipRecord],
) -> SyncResult<PartitionOutcome>
where
    U: AudienceUpstream,
{
    let DispatchOutcome { partition, result } = dispatched;

    let response = match result {
        Ok(response) => response,
        Err(err) if err.is_upstream() => return totally_failed(&partition, err, None, records),
        Err(err) => return Err(err),
    };

    if let Some(err) = response.error_for_status() {
        return totally_failed(&partition, err, Some(response), records);
    }

    let partial_errors = response
        .body
        .as_ref()
        .map(|body| upstream.partial_errors(body))
        .unwrap_or_default();
    let reported = collapse_partial_errors(&partition, partial_errors);

    let mut outcomes = Vec::with_capacity(partition.members().len());
    let mut failed = HashSet::new();
    for (index, partial) in &reported {
        let Some(entry) = partition.entry(*index) else {
            bail!(
                ErrorKind::InvariantViolation,
                "Partial error index is outside the partition",
                format!(
                    "index {index} was accepted for a partition of {} entries",
                    partition.len()
                )
            );
        };

        let error = partial_error(partial);
        for &original_index in entry.original_indices() {
            let sent = snapshot(records, original_index)?;
            outcomes.push((
                original_index,
                RecordOutcome::failure(&error, Some(partial.body.clone()), sent),
            ));
            failed.insert(original_index);
        }
    }

    for &original_index in partition.members() {
        if failed.contains(&original_index) {
            continue;
        }

        let sent = snapshot(records, original_index)?;
        outcomes.push((
            original_index,
            RecordOutcome::Success {
                http_status: response.status,
                body: response.body.clone(),
                sent,
            },
        ));
    }

    let state = if reported.is_empty() {
        PartitionState::AllSucceeded
    } else {
        PartitionState::PartiallyFailed
    };

    Ok(PartitionOutcome {
        state,
        outcomes,
        response: Some(response),
        error: reported.values().next().map(partial_error),
    })
}

/// Drops per-item errors that do not address an entry of `partition` and keeps the last error
/// reported for each index.
fn collapse_partial_errors(
    partition: &Partition,
    partial_errors: Vec<PartialError>,
) -> BTreeMap<usize, PartialError> {
    let mut reported = BTreeMap::new();

    for partial in partial_errors {
        if partial.index >= partition.len() {
            warn!(
                audience_id = %partition.audience_id(),
                action = %partition.action(),
                index = partial.index,
                entries = partition.len(),
                "ignoring partial error outside the request"
            );
            continue;
        }

        reported.insert(partial.index, partial);
    }

    reported
}

fn partial_error(partial: &PartialError) -> SyncError {
    sync_error!(
        ErrorKind::PartialUpstreamFailure,
        "Upstream rejected an item",
        detail = partial.error_message.clone()
    )
    .with_upstream(partial.http_status, partial.error_code.clone())
}

fn totally_failed(
    partition: &Partition,
    error: SyncError,
    response: Option<HttpResponse>,
    records: &[MembershipRecord],
) -> SyncResult<PartitionOutcome> {
    let body = response.as_ref().and_then(|response| response.body.clone());

    let mut outcomes = Vec::with_capacity(partition.members().len());
    for &original_index in partition.members() {
        let sent = snapshot(records, original_index)?;
        outcomes.push((
            original_index,
            RecordOutcome::failure(&error, body.clone(), sent),
        ));
    }

    Ok(PartitionOutcome {
        state: PartitionState::TotallyFailed,
        outcomes,
        response,
        error: Some(error),
    })
}

fn snapshot(records: &[MembershipRecord], original_index: usize) -> SyncResult<MembershipRecord> {
    match records.get(original_index) {
        Some(record) => Ok(record.clone()),
        None => bail!(
            ErrorKind::InvariantViolation,
            "Partition references a record outside the input",
            format!(
                "index {original_index} is not below the input length {}",
                records.len()
            )
        ),
    }
}
