//! Scripted transport for testing without a server

use crate::transport::{
    CompletionCallback, Headers, HttpResponse, SendHandle, Transport, TransportError, TransportResult,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Scripted outcome of one request
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Response(HttpResponse),
    Failure(TransportError),
}

impl MockReply {
    /// Reply with an empty body
    pub fn status(status: u16) -> Self {
        MockReply::Response(HttpResponse::new(status, ""))
    }

    pub fn body(status: u16, body: impl Into<String>) -> Self {
        MockReply::Response(HttpResponse::new(status, body))
    }

    /// Simulate a refused connection
    pub fn refused(url: &str) -> Self {
        MockReply::Failure(TransportError::Connection {
            url: url.to_string(),
            details: "connection refused".to_string(),
        })
    }

    fn into_result(self) -> TransportResult<HttpResponse> {
        match self {
            MockReply::Response(response) => Ok(response),
            MockReply::Failure(error) => Err(error),
        }
    }
}

/// Request observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
}

impl RecordedRequest {
    /// Value of the first header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct MockState {
    replies: HashMap<(&'static str, String), VecDeque<MockReply>>,
    requests: Vec<RecordedRequest>,
    deferred: VecDeque<(MockReply, CompletionCallback)>,
    defer_completions: bool,
}

/// In-memory transport with per-URL scripted replies.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// session owns another. Each URL replays its script in order; the last reply
/// of a script repeats forever. Unscripted URLs refuse the connection.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append replies for GET requests to `url`
    pub fn script_get(&self, url: &str, replies: impl IntoIterator<Item = MockReply>) {
        self.script("GET", url, replies);
    }

    /// Append replies for POST requests to `url`
    pub fn script_post(&self, url: &str, replies: impl IntoIterator<Item = MockReply>) {
        self.script("POST", url, replies);
    }

    fn script(&self, method: &'static str, url: &str, replies: impl IntoIterator<Item = MockReply>) {
        self.lock()
            .replies
            .entry((method, url.to_string()))
            .or_default()
            .extend(replies);
    }

    /// Hold POST completions until [`MockTransport::complete_next`] is called
    pub fn defer_completions(&self, defer: bool) {
        self.lock().defer_completions = defer;
    }

    /// Run the oldest held completion callback. Returns false if none is held.
    pub fn complete_next(&self) -> bool {
        let next = self.lock().deferred.pop_front();
        match next {
            Some((reply, on_complete)) => {
                on_complete(reply.into_result());
                true
            }
            None => false,
        }
    }

    pub fn pending_completions(&self) -> usize {
        self.lock().deferred.len()
    }

    /// All requests in the order they were issued
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn count(&self, method: &str, url: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .count()
    }

    pub fn post_count(&self) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.method == "POST")
            .count()
    }

    fn next_reply(state: &mut MockState, method: &'static str, url: &str) -> MockReply {
        match state.replies.get_mut(&(method, url.to_string())) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or_else(|| MockReply::refused(url)),
            Some(script) => script.front().cloned().unwrap_or_else(|| MockReply::refused(url)),
            None => MockReply::refused(url),
        }
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str, headers: &Headers) -> TransportResult<HttpResponse> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            headers: headers.clone(),
            body: None,
        });
        Self::next_reply(&mut state, "GET", url).into_result()
    }

    fn post_async(
        &self,
        url: &str,
        body: String,
        headers: &Headers,
        on_complete: CompletionCallback,
    ) -> SendHandle {
        let reply = {
            let mut state = self.lock();
            state.requests.push(RecordedRequest {
                method: "POST",
                url: url.to_string(),
                headers: headers.clone(),
                body: Some(body),
            });
            let reply = Self::next_reply(&mut state, "POST", url);
            if state.defer_completions {
                state.deferred.push_back((reply, on_complete));
                return SendHandle::completed();
            }
            reply
        };
        on_complete(reply.into_result());
        SendHandle::completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, Ordering};

    #[test]
    fn test_script_replays_in_order_and_repeats_last() {
        let transport = MockTransport::new();
        transport.script_get("http://a", [MockReply::status(500), MockReply::status(200)]);

        let headers = Headers::new();
        assert_eq!(transport.get("http://a", &headers).unwrap().status, 500);
        assert_eq!(transport.get("http://a", &headers).unwrap().status, 200);
        assert_eq!(transport.get("http://a", &headers).unwrap().status, 200);
        assert_eq!(transport.count("GET", "http://a"), 3);
    }

    #[test]
    fn test_unscripted_url_refuses_connection() {
        let transport = MockTransport::new();
        let result = transport.get("http://nowhere", &Headers::new());
        assert!(matches!(result, Err(TransportError::Connection { .. })));
    }

    #[test]
    fn test_deferred_completion() {
        let transport = MockTransport::new();
        transport.script_post("http://a/readings", [MockReply::status(404)]);
        transport.defer_completions(true);

        let observed = Arc::new(AtomicU16::new(0));
        let sink = observed.clone();
        transport.post_async(
            "http://a/readings",
            "[]".to_string(),
            &Headers::new(),
            Box::new(move |result| sink.store(result.unwrap().status, Ordering::SeqCst)),
        );

        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(transport.pending_completions(), 1);
        assert!(transport.complete_next());
        assert_eq!(observed.load(Ordering::SeqCst), 404);
        assert!(!transport.complete_next());
    }

    #[test]
    fn test_clones_share_recorded_requests() {
        let transport = MockTransport::new();
        let observer = transport.clone();
        let headers = vec![("Authorization".to_string(), "token".to_string())];
        let _ = transport.get("http://a/login", &headers);

        let requests = observer.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("authorization"), Some("token"));
    }
}
