//! Concurrent dispatch of partition requests.
//!
//! The dispatcher builds one request per partition and issues them all at once, then waits for
//! every call to settle. Retries and timeouts belong to the injected [`HttpClient`].

use std::future::Future;

use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::partition::Partition;
use crate::sync_error;
use crate::upstream::{AudienceUpstream, WireRequest};

mod http;

pub use http::ReqwestHttpClient;

/// Status and decoded body of an upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// JSON body, or the raw text as a JSON string when the body is not JSON. [`None`] when
    /// the body is empty.
    pub body: Option<Value>,
}

impl HttpResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    /// Returns `true` for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts a non-2xx response into the error applied to every record of its partition.
    ///
    /// Returns [`None`] for 2xx responses.
    pub fn error_for_status(&self) -> Option<SyncError> {
        if self.is_success() {
            return None;
        }

        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason());

        let message = self
            .body_str("message")
            .or_else(|| self.body_str("error"))
            .or_else(|| self.body.as_ref().and_then(Value::as_str))
            .map(str::to_owned)
            .or_else(|| reason.map(str::to_owned))
            .unwrap_or_else(|| format!("HTTP {}", self.status));

        let code = self
            .body_str("code")
            .map(str::to_owned)
            .or_else(|| reason.map(upper_snake_case))
            .unwrap_or_else(|| format!("HTTP_{}", self.status));

        let (kind, description) = match self.status {
            401 | 403 => (
                ErrorKind::UpstreamAuthenticationFailed,
                "Upstream rejected the credentials",
            ),
            _ => (
                ErrorKind::UpstreamRequestFailed,
                "Upstream returned an error status",
            ),
        };

        Some(sync_error!(kind, description, detail = message).with_upstream(self.status, code))
    }

    fn body_str(&self, field: &str) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|body| body.get(field))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

fn upper_snake_case(reason: &str) -> String {
    reason
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_uppercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Transport used to deliver wire requests.
///
/// Non-2xx responses must be returned as [`HttpResponse`]s; only failures that produced no
/// response at all (connection, timeout) are errors.
pub trait HttpClient {
    /// Sends `request` as a JSON `POST`.
    fn post_json(
        &self,
        request: &WireRequest,
    ) -> impl Future<Output = SyncResult<HttpResponse>> + Send;
}

/// Settled result of one partition's upstream call.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub partition: Partition,
    pub result: SyncResult<HttpResponse>,
}

/// Builds and sends one request per partition concurrently, returning once every call settled.
///
/// Outcomes are returned in partition order. Failing to build any request aborts the whole
/// dispatch before anything is sent, since it means the request shape itself is broken.
pub async fn dispatch_all<U, C>(
    upstream: &U,
    client: &C,
    partitions: Vec<Partition>,
) -> SyncResult<Vec<DispatchOutcome>>
where
    U: AudienceUpstream,
    C: HttpClient,
{
    let mut requests = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let request = upstream.build_request(&partition)?;
        requests.push((partition, request));
    }

    let calls = requests.into_iter().map(|(partition, request)| async move {
        info!(
            upstream = upstream.name(),
            audience_id = %partition.audience_id(),
            action = %partition.action(),
            identifiers = partition.len(),
            records = partition.members().len(),
            "dispatching partition"
        );

        let result = client.post_json(&request).await;
        match &result {
            Ok(response) => debug!(
                upstream = upstream.name(),
                audience_id = %partition.audience_id(),
                action = %partition.action(),
                status = response.status,
                "partition request settled"
            ),
            Err(err) => warn!(
                upstream = upstream.name(),
                audience_id = %partition.audience_id(),
                action = %partition.action(),
                error = %err,
                "partition request failed"
            ),
        }

        DispatchOutcome { partition, result }
    });

    Ok(join_all(calls).await)
}
