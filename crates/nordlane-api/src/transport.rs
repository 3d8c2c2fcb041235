// Shared transport configuration for building reqwest::Client instances.
//
// The directory and geocode clients share timeout and user-agent settings
// through this module, avoiding duplicated builder logic.

use std::time::Duration;

use crate::error::Error;

/// Default user agent for directory requests.
pub const DEFAULT_USER_AGENT: &str = concat!("nordlane/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.builder()
            .build()
            .map_err(|e| Error::Client(e.to_string()))
    }

    /// Build a `reqwest::Client` with additional default headers.
    pub fn build_client_with_headers(
        &self,
        headers: reqwest::header::HeaderMap,
    ) -> Result<reqwest::Client, Error> {
        self.builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Client(e.to_string()))
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs()
    }

    fn builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
    }
}
