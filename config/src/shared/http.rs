use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings of the HTTP client used to reach the upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpClientConfig {
    /// Per-request timeout in milliseconds, covering connect through reading the body.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl HttpClientConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "http.timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    HttpClientConfig::DEFAULT_TIMEOUT_MS
}
