//! Entry point that runs partitioning, dispatch and reconciliation for one call.
//!
//! Single mode surfaces any failure as an error. Batch mode returns one outcome per input record.

use std::slice;

use tracing::{info, warn};

use crate::dispatch::{HttpClient, dispatch_all};
use crate::error::{ErrorKind, SyncResult};
use crate::partition::partition;
use crate::reconcile::reconcile;
use crate::types::{MembershipRecord, OutcomeBook, RecordOutcome, SingleOutcome};
use crate::upstream::AudienceUpstream;
use crate::{bail, sync_error};

/// How the caller wants failures reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Exactly one record; any failure is returned as an error.
    Single,
    /// Any number of records; upstream failures are recorded per record.
    Batch,
}

/// Result of [`AudienceSyncEngine::run`], shaped by the [`RunMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    Single(SingleOutcome),
    Batch(Vec<RecordOutcome>),
}

/// Synchronizes membership records into one audience upstream.
///
/// The engine is stateless between runs: every run partitions its input, dispatches one request
/// per partition concurrently and reconciles the responses into per-record outcomes.
#[derive(Debug)]
pub struct AudienceSyncEngine<U, C> {
    upstream: U,
    client: C,
}

impl<U, C> AudienceSyncEngine<U, C>
where
    U: AudienceUpstream,
    C: HttpClient,
{
    pub fn new(upstream: U, client: C) -> Self {
        Self { upstream, client }
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Runs the engine in the given mode.
    ///
    /// [`RunMode::Single`] requires exactly one record and fails with
    /// [`ErrorKind::ValidationFailed`] otherwise.
    pub async fn run(&self, records: &[MembershipRecord], mode: RunMode) -> SyncResult<RunOutput> {
        match mode {
            RunMode::Single => {
                let [record] = records else {
                    bail!(
                        ErrorKind::ValidationFailed,
                        "Single mode requires exactly one record",
                        format!("received {} records", records.len())
                    );
                };

                self.run_single(record).await.map(RunOutput::Single)
            }
            RunMode::Batch => self.run_batch(records).await.map(RunOutput::Batch),
        }
    }

    /// Synchronizes a single record.
    ///
    /// Validation failures, transport failures and per-item rejections are all returned as
    /// errors carrying the upstream status, code and message when available.
    pub async fn run_single(&self, record: &MembershipRecord) -> SyncResult<SingleOutcome> {
        let records = slice::from_ref(record);
        let mut plan = partition(records, |kind| self.upstream.accepts(kind));

        if let Some((_, error)) = plan.rejected.pop() {
            return Err(error);
        }

        let dispatched = dispatch_all(&self.upstream, &self.client, plan.partitions).await?;
        let Some(dispatched) = dispatched.into_iter().next() else {
            bail!(
                ErrorKind::InvariantViolation,
                "Accepted record produced no request"
            );
        };

        let outcome = reconcile(&self.upstream, dispatched, records)?;
        if let Some(error) = outcome.error {
            return Err(error);
        }

        match outcome.response {
            Some(response) => Ok(SingleOutcome {
                http_status: response.status,
                body: response.body,
            }),
            None => Err(sync_error!(
                ErrorKind::InvariantViolation,
                "Successful dispatch produced no response"
            )),
        }
    }

    /// Synchronizes a batch of records, returning exactly one outcome per record in input order.
    ///
    /// Upstream failures never abort the batch: they are recorded into the outcomes of the
    /// records owned by the failing partition. Any other error is returned.
    pub async fn run_batch(&self, records: &[MembershipRecord]) -> SyncResult<Vec<RecordOutcome>> {
        let plan = partition(records, |kind| self.upstream.accepts(kind));
        let partitions_count = plan.partitions.len();
        let mut book = OutcomeBook::new(records.len());

        for (original_index, error) in &plan.rejected {
            warn!(
                upstream = self.upstream.name(),
                original_index,
                error_code = error.error_code(),
                "record not attempted"
            );
            book.record(
                *original_index,
                RecordOutcome::not_attempted(error, records[*original_index].clone()),
            )?;
        }

        let dispatched = dispatch_all(&self.upstream, &self.client, plan.partitions).await?;
        for dispatched in dispatched {
            let outcome = reconcile(&self.upstream, dispatched, records)?;
            for (original_index, record_outcome) in outcome.outcomes {
                book.record(original_index, record_outcome)?;
            }
        }

        let outcomes = book.into_outcomes(records);
        let successes = outcomes.iter().filter(|o| o.is_success()).count();
        let failures = outcomes.iter().filter(|o| o.is_failure()).count();
        let not_attempted = outcomes.iter().filter(|o| o.is_not_attempted()).count();
        info!(
            upstream = self.upstream.name(),
            records = records.len(),
            partitions = partitions_count,
            successes,
            failures,
            not_attempted,
            "audience batch synchronized"
        );

        Ok(outcomes)
    }
}
