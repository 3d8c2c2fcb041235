// Reverse geocoding HTTP client
//
// Public Nominatim instances throttle aggressively by user agent, so each
// request takes the next identity from a fixed pool. Request spacing is
// the caller's job; this client never sleeps.

use std::sync::atomic::{AtomicUsize, Ordering};

use reqwest::header::USER_AGENT;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::geocode::models::{Address, ReverseResponse};
use crate::transport::TransportConfig;

/// Public Nominatim endpoint.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Client identities rotated across requests.
pub const USER_AGENTS: [&str; 6] = [
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.5; rv:128.0) Gecko/20100101 Firefox/128.0",
    "Mozilla/5.0 (X11; Fedora; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Windows NT 10.0; rv:115.0) Gecko/20100101 Firefox/115.0",
];

/// Raw HTTP client for reverse geocoding.
pub struct GeocodeClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
    next_agent: AtomicUsize,
}

impl GeocodeClient {
    /// Create a new geocode client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout_secs: transport.timeout_secs(),
            next_agent: AtomicUsize::new(0),
        })
    }

    /// Create a geocode client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout_secs: TransportConfig::default().timeout_secs(),
            next_agent: AtomicUsize::new(0),
        }
    }

    fn next_user_agent(&self) -> &'static str {
        let idx = self.next_agent.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len();
        USER_AGENTS[idx]
    }

    /// Resolve a coordinate pair to its address components.
    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<Address, Error> {
        let mut url = Url::parse(&format!(
            "{}/reverse",
            self.base_url.as_str().trim_end_matches('/')
        ))?;
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &lat.to_string())
            .append_pair("lon", &lon.to_string());

        let agent = self.next_user_agent();
        debug!(%url, agent, "reverse geocode");

        let resp = self
            .http
            .get(url.clone())
            .header(USER_AGENT, agent)
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

        let parsed: ReverseResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        Ok(parsed.address)
    }
}
