//! reqwest-backed transport

use crate::transport::{
    CompletionCallback, Headers, HttpResponse, SendHandle, Transport, TransportError, TransportResult,
};
use reqwest::blocking::{Client, RequestBuilder};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// HTTP transport using a blocking reqwest client.
///
/// Asynchronous posts run on a short-lived worker thread that owns a clone of
/// the client, so the caller never waits on the network.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                url: String::new(),
                details: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

fn with_headers(mut request: RequestBuilder, headers: &Headers) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

fn execute(request: RequestBuilder, url: &str) -> TransportResult<HttpResponse> {
    let response = request
        .send()
        .map_err(|e| TransportError::from_reqwest(url, &e))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .map_err(|e| TransportError::from_reqwest(url, &e))?;
    debug!(url, status, "request completed");
    Ok(HttpResponse::new(status, body))
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, headers: &Headers) -> TransportResult<HttpResponse> {
        execute(with_headers(self.client.get(url), headers), url)
    }

    fn post_async(
        &self,
        url: &str,
        body: String,
        headers: &Headers,
        on_complete: CompletionCallback,
    ) -> SendHandle {
        let client = self.client.clone();
        let url = url.to_string();
        let headers = headers.clone();
        let worker = thread::spawn(move || {
            let request = with_headers(client.post(&url), &headers).body(body);
            on_complete(execute(request, &url));
        });
        SendHandle::spawned(worker)
    }
}
