use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Identifier type a customer list is keyed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerListIdentifierType {
    Email,
    CrmId,
}

/// The upstream audience API the syncer writes to.
///
/// Credentials are held as secrets, so the derived [`Debug`] never prints them.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpstreamConfig {
    /// Device audience API keyed by IDFA and GAID.
    DeviceAudience {
        /// Overrides the production API base URL.
        #[serde(default)]
        base_url: Option<String>,
        advertiser: String,
        api_key: SerializableSecretString,
        /// Sends audience ids as their 32-bit string hash instead of verbatim.
        #[serde(default = "default_hash_audience_id")]
        hash_audience_id: bool,
    },
    /// Customer list API keyed by hashed emails or CRM ids.
    CustomerList {
        #[serde(default)]
        base_url: Option<String>,
        access_token: SerializableSecretString,
        developer_token: SerializableSecretString,
        customer_id: String,
        customer_account_id: String,
        identifier_type: CustomerListIdentifierType,
    },
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            UpstreamConfig::DeviceAudience {
                base_url,
                advertiser,
                api_key,
                ..
            } => {
                validate_base_url(base_url.as_deref())?;
                require_text("upstream.advertiser", advertiser)?;
                require_secret("upstream.api_key", api_key)
            }
            UpstreamConfig::CustomerList {
                base_url,
                access_token,
                developer_token,
                customer_id,
                customer_account_id,
                ..
            } => {
                validate_base_url(base_url.as_deref())?;
                require_secret("upstream.access_token", access_token)?;
                require_secret("upstream.developer_token", developer_token)?;
                require_text("upstream.customer_id", customer_id)?;
                require_text("upstream.customer_account_id", customer_account_id)
            }
        }
    }
}

fn default_hash_audience_id() -> bool {
    true
}

fn validate_base_url(base_url: Option<&str>) -> Result<(), ValidationError> {
    match base_url {
        Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
            Err(ValidationError::InvalidFieldValue {
                field: "upstream.base_url".to_string(),
                constraint: "must start with http:// or https://".to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }

    Ok(())
}

fn require_secret(field: &str, value: &SerializableSecretString) -> Result<(), ValidationError> {
    if value.is_blank() {
        return Err(ValidationError::MissingField(field.to_string()));
    }

    Ok(())
}
