use std::path::PathBuf;

use audience_sync::AudienceSyncEngine;
use audience_sync::dispatch::{HttpClient, ReqwestHttpClient};
use audience_sync::error::SyncError;
use audience_sync::types::{MembershipRecord, RecordOutcome};
use audience_sync::upstream::{
    AudienceUpstream, CustomerListIdentifierType, CustomerListUpstream, DeviceAudienceUpstream,
};
use config::shared::{self, SyncerConfig, UpstreamConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info};

use crate::error::{SyncerError, SyncerResult};

// Builds the engine for the configured upstream and runs it, keeping dispatch static.
macro_rules! sync_dispatch {
    ($upstream:expr, $client:expr, $reader:expr, $writer:expr, $max_size:expr) => {{
        let engine = AudienceSyncEngine::new($upstream, $client);
        sync_records(&engine, $reader, $writer, $max_size).await
    }};
}

/// Where records are read from and outcomes written to; `None` means stdin and stdout.
#[derive(Debug, Default)]
pub struct SyncerIo {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Totals over every record the syncer processed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub records: usize,
    pub batches: usize,
    pub successes: usize,
    pub failures: usize,
    pub not_attempted: usize,
}

impl SyncSummary {
    fn add(&mut self, outcomes: &[RecordOutcome]) {
        self.batches += 1;
        self.records += outcomes.len();
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Success { .. } => self.successes += 1,
                RecordOutcome::Failure { .. } => self.failures += 1,
                RecordOutcome::NotAttempted { .. } => self.not_attempted += 1,
            }
        }
    }
}

pub async fn start_syncer(config: SyncerConfig, io: SyncerIo) -> SyncerResult<SyncSummary> {
    let client = ReqwestHttpClient::new(config.http.timeout())?;
    let max_size = config.batch.max_size;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &io.input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let writer: Box<dyn AsyncWrite + Unpin + Send> = match &io.output {
        Some(path) => Box::new(BufWriter::new(tokio::fs::File::create(path).await?)),
        None => Box::new(BufWriter::new(tokio::io::stdout())),
    };

    let summary = match config.upstream {
        UpstreamConfig::DeviceAudience {
            base_url,
            advertiser,
            api_key,
            hash_audience_id,
        } => {
            info!(%advertiser, hash_audience_id, "using device audience upstream");

            let mut upstream = DeviceAudienceUpstream::new(api_key.into(), advertiser)
                .with_hashed_audience_id(hash_audience_id);
            if let Some(base_url) = base_url {
                upstream = upstream.with_base_url(base_url);
            }

            sync_dispatch!(upstream, client, reader, writer, max_size)
        }
        UpstreamConfig::CustomerList {
            base_url,
            access_token,
            developer_token,
            customer_id,
            customer_account_id,
            identifier_type,
        } => {
            info!(%customer_id, ?identifier_type, "using customer list upstream");

            let identifier_type = match identifier_type {
                shared::CustomerListIdentifierType::Email => CustomerListIdentifierType::Email,
                shared::CustomerListIdentifierType::CrmId => CustomerListIdentifierType::CrmId,
            };
            let mut upstream = CustomerListUpstream::new(
                access_token.into(),
                developer_token.into(),
                customer_id,
                customer_account_id,
                identifier_type,
            );
            if let Some(base_url) = base_url {
                upstream = upstream.with_base_url(base_url);
            }

            sync_dispatch!(upstream, client, reader, writer, max_size)
        }
    }?;

    info!(
        records = summary.records,
        batches = summary.batches,
        successes = summary.successes,
        failures = summary.failures,
        not_attempted = summary.not_attempted,
        "syncer finished"
    );

    Ok(summary)
}

/// Streams JSON-lines records through the engine in batches of at most `max_size`.
///
/// Writes one JSON outcome line per input record, in input order. Blank lines are skipped.
pub async fn sync_records<U, C, R, W>(
    engine: &AudienceSyncEngine<U, C>,
    reader: R,
    mut writer: W,
    max_size: usize,
) -> SyncerResult<SyncSummary>
where
    U: AudienceUpstream,
    C: HttpClient,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = SyncSummary::default();
    let mut lines = reader.lines();
    let mut batch = Vec::with_capacity(max_size);
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str::<MembershipRecord>(&line).map_err(|source| {
            SyncerError::Input {
                line: line_number,
                source,
            }
        })?;
        batch.push(record);

        if batch.len() >= max_size {
            flush_batch(engine, &mut batch, &mut writer, &mut summary).await?;
        }
    }

    if !batch.is_empty() {
        flush_batch(engine, &mut batch, &mut writer, &mut summary).await?;
    }
    writer.flush().await?;

    Ok(summary)
}

async fn flush_batch<U, C, W>(
    engine: &AudienceSyncEngine<U, C>,
    batch: &mut Vec<MembershipRecord>,
    writer: &mut W,
    summary: &mut SyncSummary,
) -> SyncerResult<()>
where
    U: AudienceUpstream,
    C: HttpClient,
    W: AsyncWrite + Unpin,
{
    debug!(batch_size = batch.len(), "running batch");

    let outcomes = engine.run_batch(batch.as_slice()).await?;
    for outcome in &outcomes {
        let mut line = serde_json::to_vec(outcome).map_err(SyncError::from)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
    }

    summary.add(&outcomes);
    batch.clear();

    Ok(())
}
