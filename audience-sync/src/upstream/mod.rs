//! Request builders for the supported audience APIs.
//!
//! Everything that is specific to one upstream (endpoint layout, credentials, field names and
//! the shape of per-item errors) lives behind [`AudienceUpstream`], so the rest of the engine
//! stays upstream-agnostic.

use std::fmt;

use serde_json::Value;

use crate::error::SyncResult;
use crate::partition::Partition;
use crate::types::IdentifierKind;

mod customer_list;
mod device;

pub use customer_list::{
    CustomerListIdentifierType, CustomerListUpstream, DEFAULT_CUSTOMER_LIST_BASE_URL,
};
pub use device::{DEFAULT_DEVICE_AUDIENCE_BASE_URL, DeviceAudienceUpstream, audience_id_hash};

/// Fully built HTTP request for one partition.
#[derive(Clone, PartialEq)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl WireRequest {
    /// Creates a request without extra headers.
    pub fn new(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// Adds a header to the request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the value of the first header named `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Header values can carry credentials and are never printed.
impl fmt::Debug for WireRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers = self
            .headers
            .iter()
            .map(|(name, _)| (name.as_str(), "[REDACTED]"))
            .collect::<Vec<_>>();

        f.debug_struct("WireRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .finish_non_exhaustive()
    }
}

/// A per-item error reported inside an otherwise successful upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialError {
    /// Index into the identifier list of the request that produced the response.
    pub index: usize,
    pub http_status: u16,
    pub error_code: String,
    pub error_message: String,
    /// The error entry as reported by the upstream.
    pub body: Value,
}

/// An audience API the engine can synchronize membership into.
///
/// Implementations translate a [`Partition`] into the exact request the API expects and extract
/// per-item errors from its responses. They hold no per-run state.
pub trait AudienceUpstream {
    /// Returns the name of the upstream, used in logs.
    fn name(&self) -> &'static str;

    /// Returns `true` if identifiers of `kind` can be sent to this upstream.
    fn accepts(&self, kind: IdentifierKind) -> bool;

    /// Builds the request for `partition`.
    ///
    /// The identifier order on the wire must match [`Partition::entries`], since per-item errors
    /// are addressed by position in that list.
    fn build_request(&self, partition: &Partition) -> SyncResult<WireRequest>;

    /// Extracts the per-item errors embedded in a successful response body.
    ///
    /// Entries whose index is negative or not an integer are dropped. Range checks against the
    /// partition happen in the reconciler.
    fn partial_errors(&self, body: &Value) -> Vec<PartialError>;
}

impl<U> AudienceUpstream for &U
where
    U: AudienceUpstream + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn accepts(&self, kind: IdentifierKind) -> bool {
        (**self).accepts(kind)
    }

    fn build_request(&self, partition: &Partition) -> SyncResult<WireRequest> {
        (**self).build_request(partition)
    }

    fn partial_errors(&self, body: &Value) -> Vec<PartialError> {
        (**self).partial_errors(body)
    }
}

/// Reads a non-negative integer index from a JSON value.
fn response_index(value: Option<&Value>) -> Option<usize> {
    value
        .and_then(Value::as_u64)
        .and_then(|index| usize::try_from(index).ok())
}
