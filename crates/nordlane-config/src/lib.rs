//! Configuration for the nordlane CLI.
//!
//! One TOML file layered under `NORDLANE_*` environment overrides, plus the
//! translation from file settings into `nordlane_core` values. The binary
//! applies its flags on top of what this crate returns.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use nordlane_core::dns::DnsOptions;
use nordlane_core::{
    ArmPolicy, CountryScope, GeocodeSpacing, Protocol, SelectionCriteria, SelectionPolicy,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown config key '{key}'")]
    UnknownKey { key: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub directory: DirectorySettings,
    #[serde(default)]
    pub selection: SelectionSettings,
    #[serde(default)]
    pub firewall: FirewallSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub tunnel: TunnelSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DirectorySettings {
    /// Server directory base URL.
    #[serde(default = "default_server_list_url")]
    pub server_list_url: String,

    /// Reverse-geocoding base URL for area filtering.
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Seconds a cached server list stays fresh. 0 disables the cache.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Use an expired cache when the directory is unreachable.
    #[serde(default)]
    pub allow_stale: bool,

    #[serde(default = "default_host_suffix")]
    pub host_suffix: String,

    #[serde(default = "default_geocode_min_ms")]
    pub geocode_spacing_min_ms: u64,

    #[serde(default = "default_geocode_max_ms")]
    pub geocode_spacing_max_ms: u64,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            server_list_url: default_server_list_url(),
            geocoder_url: default_geocoder_url(),
            timeout: default_timeout(),
            cache_ttl: default_cache_ttl(),
            allow_stale: false,
            host_suffix: default_host_suffix(),
            geocode_spacing_min_ms: default_geocode_min_ms(),
            geocode_spacing_max_ms: default_geocode_max_ms(),
        }
    }
}

fn default_server_list_url() -> String {
    "https://api.nordvpn.com".into()
}
fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org".into()
}
fn default_timeout() -> u64 {
    15
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_host_suffix() -> String {
    "nordvpn.com".into()
}
fn default_geocode_min_ms() -> u64 {
    100
}
fn default_geocode_max_ms() -> u64 {
    400
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SelectionSettings {
    #[serde(default = "default_max_load")]
    pub max_load: u8,

    #[serde(default = "default_load_floor")]
    pub load_floor: u8,

    /// Servers probed after load ranking.
    #[serde(default = "default_top")]
    pub top_servers: usize,

    /// Pool size after latency ranking.
    #[serde(default = "default_top")]
    pub top_k: usize,

    #[serde(default = "default_probe_count")]
    pub probe_count: u32,

    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    #[serde(default)]
    pub policy: SelectionPolicy,

    #[serde(default)]
    pub protocol: Protocol,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            max_load: default_max_load(),
            load_floor: default_load_floor(),
            top_servers: default_top(),
            top_k: default_top(),
            probe_count: default_probe_count(),
            probe_interval_ms: default_probe_interval_ms(),
            policy: SelectionPolicy::default(),
            protocol: Protocol::default(),
        }
    }
}

fn default_max_load() -> u8 {
    70
}
fn default_load_floor() -> u8 {
    4
}
fn default_top() -> usize {
    10
}
fn default_probe_count() -> u32 {
    5
}
fn default_probe_interval_ms() -> u64 {
    200
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FirewallSettings {
    /// Provider resolvers allowed through the kill switch.
    #[serde(default = "default_dns_servers")]
    pub dns_servers: Vec<Ipv4Addr>,

    /// iptables pattern matching the tunnel device.
    #[serde(default = "default_tunnel_interface")]
    pub tunnel_interface: String,

    /// TCP ports always opened to the local subnet.
    #[serde(default)]
    pub allowed_ports: Vec<u16>,

    /// JSON allowed-ports file applied on every arm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_ports_file: Option<PathBuf>,

    #[serde(default)]
    pub allow_locally: bool,
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            dns_servers: default_dns_servers(),
            tunnel_interface: default_tunnel_interface(),
            allowed_ports: Vec::new(),
            allowed_ports_file: None,
            allow_locally: false,
        }
    }
}

fn default_dns_servers() -> Vec<Ipv4Addr> {
    ArmPolicy::default().dns_servers
}
fn default_tunnel_interface() -> String {
    "tun+".into()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PathSettings {
    /// Root of the `ovpn_udp/` and `ovpn_tcp/` profile folders.
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,

    /// OpenVPN `--auth-user-pass` file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PathBuf>,

    /// Overrides the platform cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// OpenVPN `--status` file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_file: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            profiles_dir: default_profiles_dir(),
            credentials: None,
            cache_dir: None,
            status_file: None,
        }
    }
}

fn default_profiles_dir() -> PathBuf {
    PathBuf::from("/etc/nordlane/ovpn")
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TunnelSettings {
    #[serde(default = "default_openvpn")]
    pub openvpn: String,

    #[serde(default = "default_true")]
    pub redirect_gateway: bool,

    /// Appended to every OpenVPN command line.
    #[serde(default)]
    pub extra_options: Vec<String>,

    #[serde(default = "default_resolv_conf")]
    pub resolv_conf: PathBuf,

    #[serde(default = "default_resolvconf_binary")]
    pub resolvconf_binary: PathBuf,

    #[serde(default = "default_resolved_hook")]
    pub resolved_hook: PathBuf,

    #[serde(default = "default_resolvconf_hook")]
    pub resolvconf_hook: PathBuf,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            openvpn: default_openvpn(),
            redirect_gateway: true,
            extra_options: Vec::new(),
            resolv_conf: default_resolv_conf(),
            resolvconf_binary: default_resolvconf_binary(),
            resolved_hook: default_resolved_hook(),
            resolvconf_hook: default_resolvconf_hook(),
        }
    }
}

fn default_openvpn() -> String {
    "openvpn".into()
}
fn default_true() -> bool {
    true
}
fn default_resolv_conf() -> PathBuf {
    PathBuf::from("/etc/resolv.conf")
}
fn default_resolvconf_binary() -> PathBuf {
    PathBuf::from("/sbin/resolvconf")
}
fn default_resolved_hook() -> PathBuf {
    PathBuf::from("/etc/openvpn/update-systemd-resolved")
}
fn default_resolvconf_hook() -> PathBuf {
    PathBuf::from("/etc/openvpn/update-resolv-conf")
}

// ── Translation into core values ────────────────────────────────────

impl Config {
    /// Selection defaults for `country`; flags override fields afterwards.
    pub fn criteria(&self, country: CountryScope) -> SelectionCriteria {
        SelectionCriteria {
            country,
            protocol: self.selection.protocol,
            max_load: self.selection.max_load,
            load_floor: self.selection.load_floor,
            top_n: self.selection.top_servers,
            top_k: self.selection.top_k.min(self.selection.top_servers),
            policy: self.selection.policy,
            ..SelectionCriteria::default()
        }
    }

    pub fn geocode_spacing(&self) -> GeocodeSpacing {
        let min = self.directory.geocode_spacing_min_ms;
        let max = self.directory.geocode_spacing_max_ms.max(min);
        GeocodeSpacing {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.selection.probe_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.directory.timeout)
    }

    /// Cache TTL, or `None` when caching is disabled.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.directory.cache_ttl > 0).then(|| Duration::from_secs(self.directory.cache_ttl))
    }

    /// Kill-switch policy without per-invocation allowances.
    pub fn arm_policy(&self) -> ArmPolicy {
        ArmPolicy {
            dns_servers: self.firewall.dns_servers.clone(),
            tunnel_pattern: self.firewall.tunnel_interface.clone(),
            allow_locally: self.firewall.allow_locally,
            allowed_ports: self
                .firewall
                .allowed_ports
                .iter()
                .map(|port| nordlane_core::AllowedPort::tcp(*port))
                .collect(),
        }
    }

    pub fn dns_options(&self, skip: bool) -> DnsOptions {
        DnsOptions {
            skip,
            resolv_conf: self.tunnel.resolv_conf.clone(),
            resolvconf_binary: self.tunnel.resolvconf_binary.clone(),
            resolved_hook: self.tunnel.resolved_hook.clone(),
            resolvconf_hook: self.tunnel.resolvconf_hook.clone(),
            servers: self.firewall.dns_servers.clone(),
        }
    }

    /// Directory cache file location.
    pub fn cache_file(&self) -> PathBuf {
        self.paths
            .cache_dir
            .clone()
            .unwrap_or_else(cache_dir)
            .join("servers.json")
    }

    /// Check URLs and numeric bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("directory.server_list_url", &self.directory.server_list_url),
            ("directory.geocoder_url", &self.directory.geocoder_url),
        ] {
            value
                .parse::<url::Url>()
                .map_err(|e| ConfigError::Validation {
                    field: field.into(),
                    reason: format!("'{value}' is not a URL: {e}"),
                })?;
        }
        let s = &self.selection;
        if s.top_servers == 0 {
            return Err(invalid("selection.top_servers", "must be at least 1"));
        }
        if s.top_k == 0 {
            return Err(invalid("selection.top_k", "must be at least 1"));
        }
        if s.load_floor >= s.max_load {
            return Err(invalid(
                "selection.load_floor",
                "must be below selection.max_load",
            ));
        }
        if s.max_load > 101 {
            return Err(invalid("selection.max_load", "must be at most 101"));
        }
        if s.probe_count == 0 {
            return Err(invalid("selection.probe_count", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Config file path ────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "nordlane", "nordlane")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory for the server-list cache.
pub fn cache_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

fn dirs_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("nordlane");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then `NORDLANE_SECTION__KEY` environment overrides.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("NORDLANE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Set one `section.key` from its string form, as typed on a command line.
pub fn set_value(cfg: &Config, key: &str, raw: &str) -> Result<Config, ConfigError> {
    let Some((section, field)) = key.split_once('.') else {
        return Err(ConfigError::UnknownKey { key: key.into() });
    };

    let mut doc = toml::Value::try_from(cfg)?;
    let table = doc
        .get_mut(section)
        .and_then(toml::Value::as_table_mut)
        .ok_or_else(|| ConfigError::UnknownKey { key: key.into() })?;

    let value = parse_scalar(raw);
    if !table.contains_key(field) && !is_optional_key(section, field) {
        return Err(ConfigError::UnknownKey { key: key.into() });
    }
    table.insert(field.to_owned(), value);

    Figment::from(Serialized::defaults(doc))
        .extract()
        .map_err(|e: figment::Error| ConfigError::Validation {
            field: key.into(),
            reason: e.to_string(),
        })
}

fn is_optional_key(section: &str, field: &str) -> bool {
    matches!(
        (section, field),
        ("firewall", "allowed_ports_file")
            | ("paths", "credentials" | "cache_dir" | "status_file")
    )
}

/// Interpret a command-line value: TOML literal if it parses (numbers,
/// booleans, arrays), otherwise a plain string.
fn parse_scalar(raw: &str) -> toml::Value {
    format!("v = {raw}")
        .parse::<toml::Table>()
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.selection.max_load, 70);
        assert_eq!(cfg.selection.load_floor, 4);
        assert_eq!(cfg.selection.top_servers, 10);
        assert_eq!(cfg.selection.top_k, 10);
        assert_eq!(cfg.selection.probe_count, 5);
        assert_eq!(cfg.directory.cache_ttl, 300);
        assert_eq!(cfg.firewall.dns_servers.len(), 2);
        cfg.validate().unwrap();
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[selection]\nmax_load = 50\npolicy = \"best\"\nprotocol = \"tcp\"\n\n\
             [firewall]\nallowed_ports = [22, 8080]\n",
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.selection.max_load, 50);
        assert_eq!(cfg.selection.load_floor, 4);
        assert_eq!(cfg.selection.policy, SelectionPolicy::Best);
        assert_eq!(cfg.selection.protocol, Protocol::Tcp);
        assert_eq!(cfg.arm_policy().allowed_ports.len(), 2);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.directory.host_suffix, "nordvpn.com");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut cfg = Config::default();
        cfg.paths.credentials = Some("/etc/nordlane/credentials".into());
        cfg.selection.top_k = 3;

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }

    #[test]
    fn criteria_from_settings() {
        let mut cfg = Config::default();
        cfg.selection.top_servers = 4;
        cfg.selection.top_k = 8;

        let criteria = cfg.criteria(CountryScope::Code("se".into()));
        assert_eq!(criteria.top_n, 4);
        assert_eq!(criteria.top_k, 4);
        criteria.validate().unwrap();
    }

    #[test]
    fn set_value_parses_types() {
        let cfg = Config::default();
        let cfg = set_value(&cfg, "selection.max_load", "55").unwrap();
        let cfg = set_value(&cfg, "selection.policy", "best").unwrap();
        let cfg = set_value(&cfg, "paths.credentials", "/root/creds").unwrap();
        let cfg = set_value(&cfg, "directory.allow_stale", "true").unwrap();

        assert_eq!(cfg.selection.max_load, 55);
        assert_eq!(cfg.selection.policy, SelectionPolicy::Best);
        assert_eq!(cfg.paths.credentials, Some(PathBuf::from("/root/creds")));
        assert!(cfg.directory.allow_stale);

        assert!(matches!(
            set_value(&cfg, "selection.nope", "1"),
            Err(ConfigError::UnknownKey { .. })
        ));
        assert!(matches!(
            set_value(&cfg, "selection.max_load", "lots"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn validation_catches_bad_bounds() {
        let mut cfg = Config::default();
        cfg.selection.load_floor = 80;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.directory.server_list_url = "not a url".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn disabled_cache_has_no_ttl() {
        let mut cfg = Config::default();
        cfg.directory.cache_ttl = 0;
        assert_eq!(cfg.cache_ttl(), None);
    }
}
