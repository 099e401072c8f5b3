use std::time::Duration;

use serde_json::Value;

use crate::dispatch::{HttpClient, HttpResponse};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;
use crate::upstream::WireRequest;

/// [`HttpClient`] backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a client whose requests fail with a timeout after `timeout`.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttpClient {
    async fn post_json(&self, request: &WireRequest) -> SyncResult<HttpResponse> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| body_read_error(status, err))?;

        Ok(HttpResponse::new(status, decode_body(&bytes)))
    }
}

/// Maps a failure while reading the response body to an upstream error.
///
/// The status line was already received, so it is kept on the error. Timeouts keep their own kind.
fn body_read_error(status: u16, err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        return err.into();
    }

    let detail = err.to_string();
    sync_error!(
        ErrorKind::UpstreamRequestFailed,
        "Upstream response body could not be read",
        detail = detail,
        source: err
    )
    .with_upstream(status, ErrorKind::UpstreamRequestFailed.code())
}

/// Decodes a response body leniently: empty bodies are [`None`] and non-JSON bodies are kept as
/// a JSON string.
fn decode_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}
