//! HTTP transport abstraction
//!
//! The session layer issues requests through the [`Transport`] trait so the
//! acquisition pipeline can run against a real server or a scripted mock.
//! Transports perform no retries and attach no meaning to status codes.

pub mod error;
pub mod http;
pub mod mock;

pub use error::{TransportError, TransportResult};
pub use http::HttpTransport;
pub use mock::{MockReply, MockTransport, RecordedRequest};

use std::thread::JoinHandle;

/// Request headers as ordered name/value pairs
pub type Headers = Vec<(String, String)>;

/// Invoked exactly once with the outcome of an asynchronous request
pub type CompletionCallback = Box<dyn FnOnce(TransportResult<HttpResponse>) + Send + 'static>;

/// Status and body of a completed request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Canonical reason phrase for the status code
    pub fn reason(&self) -> &'static str {
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or("Unknown")
    }
}

/// Handle to an asynchronous request
#[derive(Debug)]
pub struct SendHandle {
    worker: Option<JoinHandle<()>>,
}

impl SendHandle {
    /// Handle for a request whose callback has already run
    pub fn completed() -> Self {
        Self { worker: None }
    }

    pub(crate) fn spawned(worker: JoinHandle<()>) -> Self {
        Self { worker: Some(worker) }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |worker| worker.is_finished())
    }

    /// Block until the completion callback has run
    pub fn wait(self) {
        if let Some(worker) = self.worker {
            let _ = worker.join();
        }
    }
}

/// Minimal HTTP client used by the server session
pub trait Transport: Send {
    /// Perform a blocking GET request
    fn get(&self, url: &str, headers: &Headers) -> TransportResult<HttpResponse>;

    /// Start a POST request without blocking the caller.
    /// `on_complete` receives the response or the transport error.
    fn post_async(
        &self,
        url: &str,
        body: String,
        headers: &Headers,
        on_complete: CompletionCallback,
    ) -> SendHandle;
}
