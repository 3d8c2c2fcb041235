use thiserror::Error;

/// Top-level error type for the `nordlane-api` crate.
///
/// Covers every failure mode of the two remote services this crate talks
/// to: the server directory and the reverse geocoder. `nordlane-core` maps
/// these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The remote service is throttling us (HTTP 429).
    #[error("Rate limited by {url}")]
    RateLimited { url: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the response arrived but did not match the
    /// expected schema.
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::Deserialization { .. } => true,
            Self::Transport(e) => e.is_decode(),
            _ => false,
        }
    }

    /// Returns `true` if the remote rejected the call for rate reasons.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Map a reqwest failure, folding timeouts into [`Error::Timeout`].
    pub(crate) fn from_send(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::Transport(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_transient() {
        let err = Error::RateLimited {
            url: "https://example.test".into(),
        };
        assert!(err.is_transient());
        assert!(err.is_rate_limited());
        assert!(!err.is_malformed());
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = Error::Status {
            status: 503,
            url: String::new(),
        };
        let client = Error::Status {
            status: 404,
            url: String::new(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    fn deserialization_is_malformed() {
        let err = Error::Deserialization {
            message: "expected array".into(),
            body: "{}".into(),
        };
        assert!(err.is_malformed());
        assert!(!err.is_transient());
    }
}
