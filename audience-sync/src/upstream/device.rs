use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{ErrorKind, SyncResult};
use crate::partition::Partition;
use crate::sync_error;
use crate::types::IdentifierKind;
use crate::upstream::{AudienceUpstream, PartialError, WireRequest, response_index};

/// Base URL of the production device audience API.
pub const DEFAULT_DEVICE_AUDIENCE_BASE_URL: &str = "https://audiences.youappi.com";

/// Status assigned to per-item errors, which the API reports without one.
const PARTIAL_ERROR_STATUS: u16 = 400;

/// Computes the 32-bit rolling string hash (`h = h * 31 + c`, wrapping) the device audience API
/// uses as numeric audience id.
///
/// The hash runs over UTF-16 code units, so ids outside the BMP hash the same way the API
/// computes them.
pub fn audience_id_hash(audience_id: &str) -> i32 {
    audience_id.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

#[derive(Debug, Serialize)]
struct AudienceMembershipRequest<'a> {
    api_key: &'a str,
    device_identities: Vec<DeviceIdentity<'a>>,
    audiences: Vec<AudienceDescriptor<'a>>,
}

#[derive(Debug, Serialize)]
struct DeviceIdentity<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct AudienceDescriptor<'a> {
    audience_id: AudienceId<'a>,
    audience_name: &'a str,
    action: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AudienceId<'a> {
    Hashed(i32),
    Raw(&'a str),
}

/// Mobile device audience API keyed by advertising identifiers (IDFA and GAID).
///
/// Requests carry the API key in the body and a single audience descriptor whose action applies
/// to every listed device.
#[derive(Debug)]
pub struct DeviceAudienceUpstream {
    base_url: String,
    advertiser: String,
    api_key: Secret<String>,
    hash_audience_id: bool,
}

impl DeviceAudienceUpstream {
    /// Creates an upstream for `advertiser` against the production API.
    pub fn new(api_key: Secret<String>, advertiser: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_DEVICE_AUDIENCE_BASE_URL.to_owned(),
            advertiser: advertiser.into(),
            api_key,
            hash_audience_id: true,
        }
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sends audience ids as given instead of hashing them.
    pub fn with_hashed_audience_id(mut self, hash_audience_id: bool) -> Self {
        self.hash_audience_id = hash_audience_id;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/AudienceMembership",
            self.base_url.trim_end_matches('/'),
            self.advertiser
        )
    }
}

impl AudienceUpstream for DeviceAudienceUpstream {
    fn name(&self) -> &'static str {
        "device_audience"
    }

    fn accepts(&self, kind: IdentifierKind) -> bool {
        matches!(kind, IdentifierKind::Idfa | IdentifierKind::Gaid)
    }

    fn build_request(&self, partition: &Partition) -> SyncResult<WireRequest> {
        let audience_id = if self.hash_audience_id {
            AudienceId::Hashed(audience_id_hash(partition.audience_id()))
        } else {
            AudienceId::Raw(partition.audience_id())
        };

        let request = AudienceMembershipRequest {
            api_key: self.api_key.expose_secret(),
            device_identities: partition
                .entries()
                .iter()
                .map(|entry| DeviceIdentity {
                    kind: entry.identifier().kind().wire_tag(),
                    value: entry.identifier().value(),
                })
                .collect(),
            audiences: vec![AudienceDescriptor {
                audience_id,
                audience_name: partition.audience_name(),
                action: partition.action().as_str(),
            }],
        };

        let body = serde_json::to_value(&request).map_err(|err| {
            sync_error!(
                ErrorKind::SerializationError,
                "Failed to serialize device audience request",
                err.to_string(),
                source: err
            )
        })?;

        Ok(WireRequest::new(self.endpoint(), body))
    }

    fn partial_errors(&self, body: &Value) -> Vec<PartialError> {
        let Some(errors) = body.get("partial_errors").and_then(Value::as_array) else {
            return Vec::new();
        };

        errors
            .iter()
            .filter_map(|error| {
                let Some(index) = response_index(error.get("index")) else {
                    warn!(
                        upstream = self.name(),
                        %error,
                        "ignoring partial error without a valid index"
                    );
                    return None;
                };

                Some(PartialError {
                    index,
                    http_status: PARTIAL_ERROR_STATUS,
                    error_code: error
                        .get("code")
                        .and_then(Value::as_str)
                        .unwrap_or(ErrorKind::PartialUpstreamFailure.code())
                        .to_owned(),
                    error_message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("No error message provided")
                        .to_owned(),
                    body: error.clone(),
                })
            })
            .collect()
    }
}
