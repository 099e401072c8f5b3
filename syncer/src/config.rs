use config::load_config;
use config::shared::SyncerConfig;

use crate::error::{SyncerError, SyncerResult};

/// Loads the syncer configuration and validates it before anything else starts.
pub fn load_syncer_config() -> SyncerResult<SyncerConfig> {
    let config = load_config::<SyncerConfig>().map_err(SyncerError::config)?;
    config.validate().map_err(SyncerError::config)?;

    Ok(config)
}
