use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::{Barrier, Mutex};

use crate::dispatch::{HttpClient, HttpResponse};
use crate::error::{SyncError, SyncResult};
use crate::upstream::WireRequest;

/// Scripted reply of the mock client.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Respond(HttpResponse),
    Fail(SyncError),
}

impl MockResponse {
    fn reply(&self) -> SyncResult<HttpResponse> {
        match self {
            MockResponse::Respond(response) => Ok(response.clone()),
            MockResponse::Fail(error) => Err(error.clone()),
        }
    }
}

#[derive(Debug)]
struct Rule {
    pointer: String,
    expected: Value,
    response: MockResponse,
}

impl Rule {
    fn matches(&self, request: &WireRequest) -> bool {
        request.body.pointer(&self.pointer) == Some(&self.expected)
    }
}

/// [`HttpClient`] returning scripted responses selected by the request body.
///
/// Rules are checked in the order they were added; the first rule whose JSON pointer resolves to
/// the expected value answers the request. Requests no rule matches get the default response,
/// `200 {"success": true}` unless overridden.
#[derive(Debug)]
pub struct MockHttpClient {
    rules: Vec<Rule>,
    default: MockResponse,
    rendezvous: Option<Arc<Barrier>>,
    requests: Mutex<Vec<WireRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default: MockResponse::Respond(HttpResponse::new(200, Some(json!({"success": true})))),
            rendezvous: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers requests whose body has `expected` at `pointer` with `response`.
    pub fn respond_when(
        mut self,
        pointer: impl Into<String>,
        expected: impl Into<Value>,
        response: HttpResponse,
    ) -> Self {
        self.rules.push(Rule {
            pointer: pointer.into(),
            expected: expected.into(),
            response: MockResponse::Respond(response),
        });
        self
    }

    /// Fails requests whose body has `expected` at `pointer` with `error`.
    pub fn fail_when(
        mut self,
        pointer: impl Into<String>,
        expected: impl Into<Value>,
        error: SyncError,
    ) -> Self {
        self.rules.push(Rule {
            pointer: pointer.into(),
            expected: expected.into(),
            response: MockResponse::Fail(error),
        });
        self
    }

    /// Replaces the response for requests no rule matches.
    pub fn with_default(mut self, response: MockResponse) -> Self {
        self.default = response;
        self
    }

    /// Holds every request until `parties` requests are in flight at the same time.
    ///
    /// A dispatcher that sends partitions one after another never gets past the first request,
    /// so tests should bound the run with a timeout.
    pub fn with_rendezvous(mut self, parties: usize) -> Self {
        self.rendezvous = Some(Arc::new(Barrier::new(parties)));
        self
    }

    /// Returns every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().await.clone()
    }

    /// Returns the requests whose body has `expected` at `pointer`.
    pub async fn requests_where(
        &self,
        pointer: &str,
        expected: impl Into<Value>,
    ) -> Vec<WireRequest> {
        let expected = expected.into();
        self.requests
            .lock()
            .await
            .iter()
            .filter(|request| request.body.pointer(pointer) == Some(&expected))
            .cloned()
            .collect()
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for MockHttpClient {
    async fn post_json(&self, request: &WireRequest) -> SyncResult<HttpResponse> {
        self.requests.lock().await.push(request.clone());

        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }

        let response = self
            .rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(|rule| &rule.response)
            .unwrap_or(&self.default);

        response.reply()
    }
}
