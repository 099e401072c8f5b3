use serde::Deserialize;

use crate::Config;
use crate::shared::{BatchConfig, HttpClientConfig, UpstreamConfig, ValidationError};

/// Root configuration of the syncer binary.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncerConfig {
    /// Upstream audience API and its credentials.
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub http: HttpClientConfig,
}

impl SyncerConfig {
    /// Validates every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.upstream.validate()?;
        self.batch.validate()?;
        self.http.validate()?;

        Ok(())
    }
}

impl Config for SyncerConfig {
    const NAME: &'static str = "syncer";
}
