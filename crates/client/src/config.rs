//! Connection settings shared by every controller.

use std::time::Duration;

use flashdeck_core::{ChannelKind, PageOrigin, RetryPolicy};

/// API base used when nothing else is configured.
pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";

/// Dial timeout for event-stream requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Absolute (`https://api.example.com/api`) or page-relative (`/api`).
    pub api_base: String,
    /// Passed to the event stream as the `token` query parameter.
    pub auth_token: Option<String>,
    /// Origin of the page the client acts for; resolves relative bases.
    pub page: PageOrigin,
    pub event_stream_retry: RetryPolicy,
    pub socket_retry: RetryPolicy,
    pub connect_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            auth_token: None,
            page: PageOrigin::default(),
            event_stream_retry: ChannelKind::EventStream.default_policy(),
            socket_retry: ChannelKind::Socket.default_policy(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TrackerConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_page(mut self, page: PageOrigin) -> Self {
        self.page = page;
        self
    }

    pub fn with_event_stream_retry(mut self, policy: RetryPolicy) -> Self {
        self.event_stream_retry = policy;
        self
    }

    pub fn with_socket_retry(mut self, policy: RetryPolicy) -> Self {
        self.socket_retry = policy;
        self
    }

    pub fn retry_for(&self, kind: ChannelKind) -> RetryPolicy {
        match kind {
            ChannelKind::EventStream => self.event_stream_retry,
            ChannelKind::Socket => self.socket_retry,
        }
    }

    /// HTTP client for event streams. Only the dial is bounded; the stream
    /// itself stays open as long as the server keeps it.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
    }
}
