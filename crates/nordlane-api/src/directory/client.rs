// Server directory HTTP client
//
// Wraps `reqwest::Client` with URL construction and schema decoding. The
// body is read as text first so decode failures carry the raw payload.

use tracing::debug;
use url::Url;

use crate::directory::models::ServerRecord;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Public base URL of the provider API.
pub const DEFAULT_BASE_URL: &str = "https://api.nordvpn.com";

/// Raw HTTP client for the server directory.
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
}

impl DirectoryClient {
    /// Create a new directory client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Create a directory client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout_secs: TransportConfig::default().timeout_secs(),
        }
    }

    /// Build `{base}/{path}` without `Url::join` dropping a base path segment.
    fn url(&self, path: &str) -> Result<Url, Error> {
        let full = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path);
        Ok(Url::parse(&full)?)
    }

    /// Fetch the full server list.
    pub async fn servers(&self) -> Result<Vec<ServerRecord>, Error> {
        let url = self.url("server")?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited { url: url.into() });
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.into(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::from_send(e, self.timeout_secs))?;

        let servers: Vec<ServerRecord> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        debug!(count = servers.len(), "directory fetched");
        Ok(servers)
    }
}
