//! Audience syncer service binary.
//!
//! Reads membership records as JSON lines, synchronizes them with the configured audience
//! upstream in batches and writes one JSON outcome line per record.

use std::path::PathBuf;

use ::config::shared::SyncerConfig;
use clap::Parser;
use tracing::{error, info};

use crate::config::load_syncer_config;
use crate::core::{SyncerIo, start_syncer};
use crate::error::{SyncerError, SyncerResult};

mod config;
mod core;
mod error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-lines file of membership records. Reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// File receiving one JSON outcome per record. Writes stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> SyncerResult<()> {
    let args = Args::parse();

    let syncer_config = load_syncer_config()?;

    let _log_flusher =
        telemetry::init_tracing(env!("CARGO_BIN_NAME")).map_err(SyncerError::config)?;

    let io = SyncerIo {
        input: args.input,
        output: args.output,
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(syncer_config, io))
}

async fn async_main(syncer_config: SyncerConfig, io: SyncerIo) -> SyncerResult<()> {
    info!(
        batch_max_size = syncer_config.batch.max_size,
        http_timeout_ms = syncer_config.http.timeout_ms,
        "starting syncer"
    );

    if let Err(err) = start_syncer(syncer_config, io).await {
        error!(error = %err, backtrace = ?err.backtrace(), "syncer failed");
        return Err(err);
    }

    Ok(())
}
