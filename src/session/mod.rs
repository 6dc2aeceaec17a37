//! Connection to the Flux server
//!
//! [`ServerSession`] owns everything the node knows about the server it talks
//! to: the selected base URL, the auth token obtained by logging in and the
//! [`ResponseSlot`] that asynchronous batch sends report into.

pub mod error;
pub mod status;

pub use error::{SessionError, SessionResult};
pub use status::{ResponseSlot, SendStatus};

use crate::core::{
    ACTIVE_MEASUREMENT_ROUTE, AUTHORIZATION_HEADER, CONTENT_TYPE_HEADER, JSON_CONTENT_TYPE, LOGIN_ROUTE,
    READINGS_ROUTE, READY_ROUTE, SENSOR_DEVICE_HEADER, STATUS_BAD_REQUEST, STATUS_NO_CONTENT, STATUS_OK,
    STATUS_UNAUTHORIZED,
};
use crate::processing::{PollError, PollLoop};
use crate::transport::{Headers, HttpResponse, SendHandle, Transport, TransportResult};
use crate::utils::Credentials;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Selected server and the token issued by it
#[derive(Debug, Clone)]
struct ServerEndpoint {
    base_url: String,
    auth_token: String,
}

impl ServerEndpoint {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: String::new(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

/// Session with a single Flux server
pub struct ServerSession<T: Transport> {
    transport: T,
    credentials: Credentials,
    endpoint: Option<ServerEndpoint>,
    slot: ResponseSlot,
    poll_step: Duration,
}

impl<T: Transport> ServerSession<T> {
    /// Create a session with no server selected.
    /// `poll_step` is the pause between readiness and measurement probes.
    pub fn new(transport: T, credentials: Credentials, poll_step: Duration) -> Self {
        Self {
            transport,
            credentials,
            endpoint: None,
            slot: ResponseSlot::new(),
            poll_step,
        }
    }

    /// Probe `candidates` in order and select the first that reports ready.
    ///
    /// Each candidate is polled for at most `timeout`; connection errors count
    /// as "not ready yet". Returns false once every candidate is exhausted, in
    /// which case no server is selected.
    pub fn discover_server(&mut self, candidates: &[String], timeout: Duration) -> bool {
        for url in candidates {
            if self.selected_url() != Some(url.trim_end_matches('/')) {
                self.endpoint = Some(ServerEndpoint::new(url));
            }
            info!(url = %url, "waiting for server to become ready");

            let result = PollLoop::new(self.poll_step)
                .with_timeout(Some(timeout))
                .ignoring(|error| matches!(error, SessionError::Transport(_)))
                .on_step(|attempt| debug!(url = %url, attempt, "server not ready"))
                .run(|| self.probe(READY_ROUTE), |status| *status == STATUS_OK);

            match result {
                Ok(_) => {
                    info!(url = %url, "server selected");
                    return true;
                }
                Err(PollError::Timeout { elapsed }) => {
                    warn!(url = %url, ?elapsed, "server did not become ready");
                }
                Err(PollError::Aborted(e)) => {
                    warn!(url = %url, error = %e, "giving up on server");
                }
            }
        }

        self.endpoint = None;
        false
    }

    /// Block until the selected server reports an active measurement.
    ///
    /// Returns false if no server is selected, a request fails, or a login
    /// triggered by a 401 fails.
    pub fn await_active_measurement(&mut self) -> bool {
        let Some(url) = self.endpoint.as_ref().map(|endpoint| endpoint.url(ACTIVE_MEASUREMENT_ROUTE)) else {
            warn!("cannot wait for a measurement without a server");
            return false;
        };
        info!(url = %url, "waiting for an active measurement");

        let result = PollLoop::new(self.poll_step)
            .on_step(|attempt| debug!(attempt, "no active measurement yet"))
            .run(|| self.probe(ACTIVE_MEASUREMENT_ROUTE), |status| *status == STATUS_OK);

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(url = %url, error = %e, "stopped waiting for an active measurement");
                false
            }
        }
    }

    /// GET `route` on the selected server and return the status.
    /// A 401 logs in before the next attempt.
    fn probe(&mut self, route: &str) -> SessionResult<u16> {
        let url = self.route_url(route)?;
        let response = self.transport.get(&url, &self.headers())?;
        log_server_response(&url, &response);

        if response.status == STATUS_UNAUTHORIZED {
            self.login()?;
        }
        Ok(response.status)
    }

    /// Obtain an auth token using the configured credentials.
    ///
    /// Does nothing when no server is selected.
    pub fn login(&mut self) -> SessionResult<()> {
        let Some(url) = self.endpoint.as_ref().map(|endpoint| endpoint.url(LOGIN_ROUTE)) else {
            debug!("skipping login, no server selected");
            return Ok(());
        };

        let headers = vec![
            (AUTHORIZATION_HEADER.to_string(), self.credentials.basic_auth()),
            (SENSOR_DEVICE_HEADER.to_string(), String::new()),
        ];
        let response = self.transport.get(&url, &headers)?;
        log_server_response(&url, &response);

        if response.status == STATUS_UNAUTHORIZED {
            error!(url = %url, username = %self.credentials.username, "login rejected");
            return Err(SessionError::Authorization { url });
        }
        if !response.is_success() {
            return Err(SessionError::UnexpectedStatus {
                url,
                status: response.status,
            });
        }

        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.auth_token = response.body.trim().to_string();
        }
        info!(url = %url, "logged in");
        Ok(())
    }

    /// Issue a request, logging in and retrying once if it is answered with 401.
    ///
    /// At most two requests reach the transport. The response to the retry
    /// is returned whatever its status.
    pub fn request_with_reauth<F>(&mut self, make_request: F) -> SessionResult<HttpResponse>
    where
        F: Fn(&T, &Headers) -> TransportResult<HttpResponse>,
    {
        if self.endpoint.is_none() {
            return Err(SessionError::NoServerSelected);
        }

        let response = make_request(&self.transport, &self.headers())?;
        if response.status != STATUS_UNAUTHORIZED {
            return Ok(response);
        }

        warn!("request unauthorized, logging in again");
        self.login()?;
        Ok(make_request(&self.transport, &self.headers())?)
    }

    /// Fetch the active measurement description
    pub fn fetch_active_measurement(&mut self) -> SessionResult<HttpResponse> {
        let url = self.route_url(ACTIVE_MEASUREMENT_ROUTE)?;
        let response = self.request_with_reauth(|transport, headers| transport.get(&url, headers))?;
        log_server_response(&url, &response);
        Ok(response)
    }

    /// Start sending a serialized batch of readings.
    ///
    /// Returns as soon as the request is handed to the transport. The outcome
    /// lands in [`ServerSession::response_slot`].
    pub fn send_batch(&self, body: String) -> SessionResult<SendHandle> {
        let url = self.route_url(READINGS_ROUTE)?;
        let mut headers = self.headers();
        headers.push((CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.to_string()));

        let slot = self.slot.clone();
        let callback_url = url.clone();
        let handle = self.transport.post_async(
            &url,
            body,
            &headers,
            Box::new(move |result| match result {
                Ok(response) => {
                    log_server_response(&callback_url, &response);
                    slot.store(SendStatus::Completed(response.status));
                }
                Err(e) => {
                    error!(url = %callback_url, error = %e, "batch send failed");
                    slot.store(SendStatus::TransportFailed);
                }
            }),
        );
        Ok(handle)
    }

    /// Absolute URL of `route` on the selected server
    pub fn route_url(&self, route: &str) -> SessionResult<String> {
        self.endpoint
            .as_ref()
            .map(|endpoint| endpoint.url(route))
            .ok_or(SessionError::NoServerSelected)
    }

    fn headers(&self) -> Headers {
        let token = self
            .endpoint
            .as_ref()
            .map(|endpoint| endpoint.auth_token.clone())
            .unwrap_or_default();
        vec![
            (AUTHORIZATION_HEADER.to_string(), token),
            (SENSOR_DEVICE_HEADER.to_string(), String::new()),
        ]
    }

    pub fn response_slot(&self) -> &ResponseSlot {
        &self.slot
    }

    /// Replace the response slot with a fresh one holding 200.
    ///
    /// Sends started before the call keep reporting into the old slot, which
    /// nothing reads any more.
    pub fn renew_response_slot(&mut self) {
        self.slot = ResponseSlot::new();
    }

    pub fn selected_url(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|endpoint| endpoint.base_url.as_str())
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|endpoint| endpoint.auth_token.as_str())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn log_server_response(url: &str, response: &HttpResponse) {
    let status = response.status;
    let reason = response.reason();
    match status {
        STATUS_NO_CONTENT => info!(url, status, reason, "no active measurement available"),
        STATUS_BAD_REQUEST => warn!(
            url,
            status,
            reason,
            "check firewall settings or AllowedHostsFilter from flux-server"
        ),
        _ if response.is_success() => debug!(url, status, reason, "server response"),
        _ => warn!(url, status, reason, "server response"),
    }
}
