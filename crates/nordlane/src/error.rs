//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use nordlane_config::ConfigError;
use nordlane_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NO_MATCH: i32 = 3;
    pub const DIRECTORY: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFIG: i32 = 6;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Directory ────────────────────────────────────────────────────
    #[error("Server directory unavailable: {message}")]
    #[diagnostic(code(nordlane::directory_unavailable))]
    DirectoryUnavailable {
        message: String,
        #[help]
        hint: Option<String>,
    },

    #[error("Server directory returned an unexpected response: {message}")]
    #[diagnostic(code(nordlane::directory_malformed))]
    DirectoryMalformed {
        message: String,
        #[help]
        hint: Option<String>,
    },

    // ── Selection ────────────────────────────────────────────────────
    #[error("No servers match {criteria}")]
    #[diagnostic(
        code(nordlane::no_match),
        help(
            "Relax the filters: raise --max-load, lower --load-floor, drop --area,\n\
             or list what exists with: nordlane list <country>"
        )
    )]
    NoServersMatch { criteria: String },

    #[error("Every probed server was unreachable")]
    #[diagnostic(
        code(nordlane::no_candidates),
        help("Latency probes need outbound ICMP. Try --top-servers with a larger value.")
    )]
    NoCandidates,

    #[error("Unknown country '{name}'")]
    #[diagnostic(
        code(nordlane::unknown_country),
        help("Run: nordlane countries to see available countries")
    )]
    UnknownCountry { name: String },

    #[error("Server '{identifier}' not found")]
    #[diagnostic(
        code(nordlane::unknown_server),
        help("Run: nordlane list <country> to see available servers")
    )]
    UnknownServer { identifier: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(nordlane::validation))]
    Validation { field: String, reason: String },

    #[error("Invalid allowed-ports configuration:\n{}", problems.join("\n"))]
    #[diagnostic(
        code(nordlane::allowed_ports),
        help("Each entry needs a port (number or \"a-b\") and may set protocol, internal, allowed_ip_range.")
    )]
    AllowedPorts { problems: Vec<String> },

    // ── Host ─────────────────────────────────────────────────────────
    #[error("{operation} requires root")]
    #[diagnostic(
        code(nordlane::permission_denied),
        help("Re-run with sudo, or use --test to preview the selection without touching the host.")
    )]
    PermissionDenied { operation: String },

    #[error("Firewall operation failed: {message}")]
    #[diagnostic(
        code(nordlane::firewall),
        help("Reset the rules with: sudo nordlane firewall clear")
    )]
    Firewall { message: String },

    #[error("No connection profile for {server} at {}", path.display())]
    #[diagnostic(
        code(nordlane::profile_not_found),
        help("Refresh the OpenVPN profile bundle into paths.profiles_dir.")
    )]
    ProfileNotFound { server: String, path: PathBuf },

    #[error("Connection profile {} is unusable: {reason}", path.display())]
    #[diagnostic(code(nordlane::profile_invalid))]
    ProfileInvalid { path: PathBuf, reason: String },

    #[error("Tunnel failed: {message}")]
    #[diagnostic(
        code(nordlane::tunnel),
        help("Check that OpenVPN is installed and tunnel.openvpn points at it.")
    )]
    Tunnel { message: String },

    #[error("Every connection attempt failed ({attempts} tried)")]
    #[diagnostic(
        code(nordlane::attempts_exhausted),
        help("Run with -v to see each attempt, or pick another server with --server.")
    )]
    AttemptsExhausted { attempts: usize },

    #[error("Interrupted, shutting down safely")]
    #[diagnostic(code(nordlane::interrupted))]
    Interrupted,

    #[error("{message}")]
    #[diagnostic(
        code(nordlane::degraded),
        help("Probe and area lookup failures normally skip one server. Retry, or run with -v.")
    )]
    Degraded { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration value for {field}: {reason}")]
    #[diagnostic(
        code(nordlane::config_invalid),
        help("Fix it with: nordlane config set {field} <value>")
    )]
    ConfigInvalid { field: String, reason: String },

    #[error("Unknown configuration key '{key}'")]
    #[diagnostic(
        code(nordlane::unknown_key),
        help("Keys are section.field, e.g. selection.max_load. See: nordlane config show")
    )]
    UnknownKey { key: String },

    #[error("Configuration file already exists at {}", path.display())]
    #[diagnostic(
        code(nordlane::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: PathBuf },

    #[error(transparent)]
    #[diagnostic(code(nordlane::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("'{action}' requires confirmation")]
    #[diagnostic(
        code(nordlane::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DirectoryUnavailable { .. } | Self::DirectoryMalformed { .. } => {
                exit_code::DIRECTORY
            }
            Self::NoServersMatch { .. }
            | Self::NoCandidates
            | Self::UnknownCountry { .. }
            | Self::UnknownServer { .. } => exit_code::NO_MATCH,
            Self::Validation { .. }
            | Self::AllowedPorts { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::ConfigInvalid { .. }
            | Self::UnknownKey { .. }
            | Self::ConfigExists { .. }
            | Self::Config(_) => exit_code::CONFIG,
            Self::Interrupted => exit_code::INTERRUPTED,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

/// Help for failures that naming a server with `--server` works around.
const MANUAL_SERVER_HINT: &str = "Check your network connection, or skip selection with:\n\
                                  nordlane connect --server <id>   (e.g. --server se42)";

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let hint = err
            .suggests_manual_server()
            .then(|| MANUAL_SERVER_HINT.to_owned());
        match err {
            CoreError::DirectoryUnavailable { message } => {
                Self::DirectoryUnavailable { message, hint }
            }
            CoreError::DirectoryMalformed { message } => Self::DirectoryMalformed { message, hint },

            CoreError::NoServersMatch { criteria } => Self::NoServersMatch { criteria },
            CoreError::NoCandidates => Self::NoCandidates,
            CoreError::UnknownCountry { name } => Self::UnknownCountry { name },
            CoreError::UnknownServer { identifier } => Self::UnknownServer { identifier },

            CoreError::InvalidCriteria { field, reason } => Self::Validation { field, reason },
            CoreError::AllowedPorts { problems } => Self::AllowedPorts { problems },

            CoreError::PermissionDenied { operation } => Self::PermissionDenied { operation },
            CoreError::Firewall { message } => Self::Firewall { message },

            CoreError::ProfileNotFound { server, path } => Self::ProfileNotFound { server, path },
            CoreError::ProfileInvalid { path, reason } => Self::ProfileInvalid { path, reason },

            CoreError::Tunnel { message } => Self::Tunnel { message },
            CoreError::AttemptsExhausted { attempts } => Self::AttemptsExhausted { attempts },
            CoreError::Interrupted => Self::Interrupted,

            // Item-level failures only surface here when a caller chose to
            // raise them instead of skipping.
            e @ (CoreError::ProbeDegraded { .. }
            | CoreError::GeocodeRateLimited
            | CoreError::GeocodeUnavailable { .. }) => Self::Degraded {
                message: e.to_string(),
            },

            CoreError::Io(e) => Self::Io(e),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::ConfigInvalid { field, reason },
            ConfigError::UnknownKey { key } => Self::UnknownKey { key },
            other => Self::Config(Box::new(other)),
        }
    }
}
