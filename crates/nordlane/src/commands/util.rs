//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use url::Url;

use nordlane_api::{DirectoryClient, GeocodeClient, TransportConfig};
use nordlane_config::{self as config, Config};
use nordlane_core::firewall::allowed_ports;
use nordlane_core::{
    ApiGeocoder, ArmPolicy, Category, Coordinates, CountryScope, DirectoryCache,
    DirectoryService, LatencyProber, PingRunner, Protocol, SelectionCriteria, SelectionPipeline,
    SelectionPolicy,
};

use crate::cli::{CategoryArgs, GlobalOpts, LocalAccessArgs, PlaceArgs, RankArgs};
use crate::error::CliError;

pub type Pipeline = SelectionPipeline<DirectoryService, ApiGeocoder, PingRunner>;

// ── Configuration ────────────────────────────────────────────────────

/// Load and validate the effective configuration.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let cfg = match &global.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config()?,
    };
    cfg.validate()?;
    Ok(cfg)
}

fn parse_url(field: &str, raw: &str) -> Result<Url, CliError> {
    raw.parse().map_err(|e| CliError::ConfigInvalid {
        field: field.into(),
        reason: format!("'{raw}' is not a URL: {e}"),
    })
}

// ── Collaborators ────────────────────────────────────────────────────

fn transport(cfg: &Config) -> TransportConfig {
    TransportConfig::default().with_timeout(cfg.http_timeout())
}

/// Server directory with the on-disk cache configured in `cfg`.
pub fn directory_service(cfg: &Config) -> Result<DirectoryService, CliError> {
    let url = parse_url("directory.server_list_url", &cfg.directory.server_list_url)?;
    let client = DirectoryClient::new(url, &transport(cfg)).map_err(nordlane_core::CoreError::from)?;

    let mut service = DirectoryService::new(client).allow_stale(cfg.directory.allow_stale);
    if let Some(ttl) = cfg.cache_ttl() {
        service = service.with_cache(DirectoryCache::new(cfg.cache_file(), ttl));
    }
    Ok(service)
}

/// Directory, geocoder and latency prober wired into one pipeline.
pub async fn build_pipeline(cfg: &Config, pings: Option<u32>) -> Result<Pipeline, CliError> {
    let probe_count = pings.unwrap_or(cfg.selection.probe_count);
    if probe_count == 0 {
        return Err(CliError::Validation {
            field: "pings".into(),
            reason: "must be at least 1".into(),
        });
    }
    let runner = PingRunner::detect(cfg.probe_interval()).await;
    assemble(cfg, runner, probe_count)
}

/// Pipeline for commands that never probe; skips the ping capability check.
pub fn listing_pipeline(cfg: &Config) -> Result<Pipeline, CliError> {
    let runner = PingRunner::new(Some(cfg.probe_interval()));
    assemble(cfg, runner, cfg.selection.probe_count.max(1))
}

fn assemble(cfg: &Config, runner: PingRunner, probe_count: u32) -> Result<Pipeline, CliError> {
    let directory = directory_service(cfg)?;

    let geocode_url = parse_url("directory.geocoder_url", &cfg.directory.geocoder_url)?;
    let geocoder = GeocodeClient::new(geocode_url, &transport(cfg))
        .map(ApiGeocoder::new)
        .map_err(|e| CliError::ConfigInvalid {
            field: "directory.geocoder_url".into(),
            reason: e.to_string(),
        })?;

    let prober = LatencyProber::new(runner, probe_count, &cfg.directory.host_suffix);
    Ok(SelectionPipeline::new(directory, geocoder, prober)
        .with_geocode_spacing(cfg.geocode_spacing()))
}

// ── Criteria ─────────────────────────────────────────────────────────

pub fn protocol(tcp: bool) -> Protocol {
    if tcp { Protocol::Tcp } else { Protocol::Udp }
}

/// The chosen category flag, `None` when no flag was given.
pub fn category(args: &CategoryArgs) -> Option<Category> {
    [
        (args.p2p, Category::P2p),
        (args.dedicated, Category::Dedicated),
        (args.double_vpn, Category::Double),
        (args.tor, Category::Onion),
        (args.obfuscated, Category::Obfuscated),
        (args.streaming, Category::Streaming),
    ]
    .into_iter()
    .find_map(|(set, category)| set.then_some(category))
}

/// Config defaults overlaid with the place and ranking flags.
pub async fn criteria(
    pipeline: &Pipeline,
    cfg: &Config,
    place: &PlaceArgs,
    rank: &RankArgs,
) -> Result<SelectionCriteria, CliError> {
    let scope = match place.country.as_deref() {
        Some(country) => pipeline.resolve_country(country).await?,
        None => CountryScope::All,
    };

    let mut criteria = cfg.criteria(scope);
    criteria.area = place.area.clone();
    criteria.location = location(place.location.as_deref())?;
    if place.tcp {
        criteria.protocol = Protocol::Tcp;
    }
    if let Some(category) = category(&place.category) {
        criteria.category = category;
    }

    if let Some(max_load) = rank.max_load {
        criteria.max_load = max_load;
    }
    if let Some(load_floor) = rank.load_floor {
        criteria.load_floor = load_floor;
    }
    if let Some(top_servers) = rank.top_servers {
        criteria.top_n = top_servers;
    }
    // An explicit --top-k is validated as given; the config default
    // shrinks to fit a smaller --top-servers.
    criteria.top_k = rank
        .top_k
        .unwrap_or_else(|| cfg.selection.top_k.min(criteria.top_n));
    if rank.best {
        criteria.policy = SelectionPolicy::Best;
    }

    criteria.validate()?;
    Ok(criteria)
}

fn location(raw: Option<&[f64]>) -> Result<Option<Coordinates>, CliError> {
    match raw {
        None => Ok(None),
        Some(&[lat, lon]) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(CliError::Validation {
                    field: "location".into(),
                    reason: format!("{lat} {lon} is not a valid latitude/longitude"),
                });
            }
            Ok(Some(Coordinates::new(lat, lon)))
        }
        Some(_) => Err(CliError::Validation {
            field: "location".into(),
            reason: "expected LAT LON".into(),
        }),
    }
}

// ── Local access ─────────────────────────────────────────────────────

/// Kill-switch policy from config plus this invocation's allowances.
pub fn arm_policy(cfg: &Config, access: &LocalAccessArgs) -> Result<ArmPolicy, CliError> {
    let mut policy = cfg.arm_policy();
    policy.allow_locally |= access.allow_locally;
    policy
        .allowed_ports
        .extend(access.allow.iter().copied().map(nordlane_core::AllowedPort::tcp));

    if let Some(path) = &cfg.firewall.allowed_ports_file {
        policy.allowed_ports.extend(allowed_ports::load(path)?);
    }
    if let Some(path) = &access.allow_config {
        policy.allowed_ports.extend(allowed_ports::load(path)?);
    }
    if let Some(json) = &access.allow_config_json {
        policy.allowed_ports.extend(allowed_ports::parse(json)?);
    }
    Ok(policy)
}

// ── Interaction ──────────────────────────────────────────────────────

/// Spinner on stderr while a slow step runs; hidden when quiet or piped.
pub fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_owned());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Status line on stderr, suppressed by `--quiet`.
pub fn status(global: &GlobalOpts, message: &str) {
    if !global.quiet {
        eprintln!("{message}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn category_flag_maps_to_category() {
        let args = CategoryArgs {
            tor: true,
            ..CategoryArgs::default()
        };
        assert_eq!(category(&args), Some(Category::Onion));
        assert_eq!(category(&CategoryArgs::default()), None);
    }

    #[test]
    fn listing_pipeline_is_built_without_probing() {
        let mut cfg = Config::default();
        cfg.selection.probe_count = 0;
        assert!(listing_pipeline(&cfg).is_ok());
    }

    #[test]
    fn location_bounds_are_checked() {
        assert!(location(Some(&[91.0, 0.0])).is_err());
        assert_eq!(
            location(Some(&[-33.86, 151.2])).unwrap(),
            Some(Coordinates::new(-33.86, 151.2))
        );
        assert_eq!(location(None).unwrap(), None);
    }

    #[test]
    fn allowances_merge_config_and_flags() {
        let mut cfg = Config::default();
        cfg.firewall.allowed_ports = vec![22];
        let access = LocalAccessArgs {
            allow: vec![8080],
            allow_locally: true,
            allow_config: None,
            allow_config_json: Some(r#"[{"port": "6000-6010", "protocol": "udp"}]"#.into()),
        };

        let policy = arm_policy(&cfg, &access).unwrap();
        assert!(policy.allow_locally);
        assert_eq!(policy.allowed_ports.len(), 3);
    }

    #[test]
    fn bad_allowance_json_is_rejected() {
        let access = LocalAccessArgs {
            allow_config_json: Some(r#"[{"port": "x"}]"#.into()),
            ..LocalAccessArgs::default()
        };
        let err = arm_policy(&Config::default(), &access).unwrap_err();
        assert!(matches!(err, CliError::AllowedPorts { .. }));
    }
}
