use std::time::Duration;

use crate::error::ClientError;

/// Configuration for the askdb client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the backend service.
    pub base_url: String,
    /// HTTP timeout for non-streaming REST requests.
    ///
    /// Not applied to the streaming connection, which stays open for as
    /// long as the server keeps sending events.
    pub timeout: Duration,
    /// Interval between reachability probes.
    pub health_period: Duration,
    /// Bounded event buffer size used by the streaming channel.
    pub stream_buffer_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
            health_period: Duration::from_secs(30),
            stream_buffer_capacity: 128,
        }
    }
}

impl ClientConfig {
    /// Creates a config with sensible defaults and a provided base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from `ASKDB_BASE_URL`, falling back to the default
    /// local address when the variable is unset or empty.
    pub fn from_env() -> Self {
        match std::env::var("ASKDB_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url),
            _ => Self::default(),
        }
    }

    /// Overrides the REST request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the health probe interval.
    pub fn health_period(mut self, period: Duration) -> Self {
        self.health_period = period;
        self
    }

    /// Overrides the bounded stream buffer size.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn route(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}
