// ── Core error types ──
//
// User-facing errors from nordlane-core. Consumers never see HTTP status
// codes or JSON parse failures directly: the `From<nordlane_api::Error>`
// impl folds transport-layer errors into the directory variants.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Directory ────────────────────────────────────────────────────
    #[error("Server directory unavailable: {message}")]
    DirectoryUnavailable { message: String },

    #[error("Server directory returned an unexpected response: {message}")]
    DirectoryMalformed { message: String },

    // ── Selection ────────────────────────────────────────────────────
    #[error("No servers match {criteria}")]
    NoServersMatch { criteria: String },

    #[error("Probe of {server} excluded: {reason}")]
    ProbeDegraded { server: String, reason: String },

    #[error("No latency-ranked candidates left to choose from")]
    NoCandidates,

    #[error("Invalid selection criteria: {field} {reason}")]
    InvalidCriteria { field: String, reason: String },

    #[error("Unknown country: {name}")]
    UnknownCountry { name: String },

    #[error("Unknown server: {identifier}")]
    UnknownServer { identifier: String },

    // ── Geocoding ────────────────────────────────────────────────────
    #[error("Geocoding service is rate limiting requests")]
    GeocodeRateLimited,

    #[error("Geocoding service unavailable: {message}")]
    GeocodeUnavailable { message: String },

    // ── Host ─────────────────────────────────────────────────────────
    #[error("Permission denied: {operation} requires root")]
    PermissionDenied { operation: String },

    #[error("Firewall operation failed: {message}")]
    Firewall { message: String },

    #[error("Invalid allowed-ports configuration:\n{}", problems.join("\n"))]
    AllowedPorts { problems: Vec<String> },

    #[error("No connection profile for {server} at {}", path.display())]
    ProfileNotFound { server: String, path: PathBuf },

    #[error("Connection profile {} has no usable remote: {reason}", path.display())]
    ProfileInvalid { path: PathBuf, reason: String },

    #[error("Tunnel failed: {message}")]
    Tunnel { message: String },

    #[error("Every connection attempt failed ({attempts} tried)")]
    AttemptsExhausted { attempts: usize },

    #[error("Interrupted, shutting down safely")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Failures a user can fix by naming a server manually.
    pub fn suggests_manual_server(&self) -> bool {
        matches!(
            self,
            Self::DirectoryUnavailable { .. } | Self::DirectoryMalformed { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<nordlane_api::Error> for CoreError {
    fn from(err: nordlane_api::Error) -> Self {
        if err.is_malformed() {
            CoreError::DirectoryMalformed {
                message: err.to_string(),
            }
        } else {
            CoreError::DirectoryUnavailable {
                message: err.to_string(),
            }
        }
    }
}
