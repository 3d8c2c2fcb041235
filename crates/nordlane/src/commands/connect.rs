//! `nordlane connect`: select a server, then hand over to the session.

use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use nordlane_config::Config;
use nordlane_core::dns::{self, DnsPatcher, NoopPatcher};
use nordlane_core::{
    ConnectPlan, ConnectionSession, FirewallController, IptablesBackend, OpenVpnDriver,
    ProfileStore, Protocol, SelectionReport, SessionEnd, SessionOptions, interfaces,
};

use crate::cli::{ConnectArgs, GlobalOpts};
use crate::error::CliError;
use crate::output::{self, CandidateRow};

use super::util;

const STILL_ARMED: &str = "Kill switch is still armed. Restore access with: nordlane kill --flush";

/// What `connect` decided before starting the tunnel.
#[derive(Debug, Serialize)]
struct ConnectReport {
    server: String,
    protocol: Protocol,
    profile: PathBuf,
    /// Servers tried in order after the first.
    failover: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selection: Option<SelectionReport>,
}

pub async fn handle(
    args: ConnectArgs,
    cfg: &Config,
    global: &GlobalOpts,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    let protocol = if args.place.tcp {
        Protocol::Tcp
    } else {
        cfg.selection.protocol
    };
    let profiles = ProfileStore::new(&cfg.paths.profiles_dir, &cfg.directory.host_suffix);

    let (plan, selection) = match &args.server {
        Some(server) => {
            let top_servers = args.rank.top_servers.unwrap_or(cfg.selection.top_servers);
            (ConnectPlan::manual(server, 3 * top_servers), None)
        }
        None => {
            let report = select(&args, cfg, global, cancel).await?;
            (ConnectPlan::from_selection(&report.selection), Some(report))
        }
    };

    let first = plan.servers.first().cloned().unwrap_or_default();
    let report = ConnectReport {
        profile: profiles.path(&first, protocol),
        failover: plan.servers.iter().skip(1).cloned().collect(),
        server: first,
        protocol,
        selection,
    };
    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &report,
        |r| detail(r, color),
        |r| r.server.clone(),
    );
    output::print_output(&out, global.quiet);

    let options = SessionOptions {
        protocol,
        test_mode: args.test,
        arm_policy: util::arm_policy(cfg, &args.access)?,
        credentials: args.credentials.clone().or_else(|| cfg.paths.credentials.clone()),
        status_file: cfg.paths.status_file.clone(),
        redirect_gateway: cfg.tunnel.redirect_gateway && !args.no_redirect_gateway,
        extra_args: extra_args(cfg, args.openvpn_options.as_deref()),
    };

    let patcher: Box<dyn DnsPatcher> = if args.test {
        Box::new(NoopPatcher)
    } else {
        dns::detect(&cfg.dns_options(args.skip_dns_patch)).await
    };
    debug!(dns = patcher.name(), "dns patcher selected");

    let driver = OpenVpnDriver::new(&cfg.tunnel.openvpn);
    let mut session: ConnectionSession<IptablesBackend, _> =
        ConnectionSession::new(driver, profiles, patcher, options);
    if args.kill_switch && !args.test {
        let ifaces = interfaces::discover().await?;
        session = session.with_firewall(FirewallController::new(IptablesBackend::new()), ifaces);
    }

    let outcome = session.run(&plan, cancel).await?;
    let armed = session
        .firewall()
        .is_some_and(|fw| fw.state() == nordlane_core::FirewallState::Armed);

    match outcome.end {
        SessionEnd::Simulated { server, profile } => {
            util::status(
                global,
                &format!(
                    "Test mode: would connect to {server} with {}; nothing was changed",
                    profile.display()
                ),
            );
            Ok(())
        }
        SessionEnd::Stopped { server } => {
            util::status(global, &format!("Tunnel to {server} closed"));
            if armed {
                util::status(global, STILL_ARMED);
            }
            Ok(())
        }
        SessionEnd::Interrupted => {
            if armed {
                util::status(global, STILL_ARMED);
            }
            Err(CliError::Interrupted)
        }
    }
}

async fn select(
    args: &ConnectArgs,
    cfg: &Config,
    global: &GlobalOpts,
    cancel: &CancellationToken,
) -> Result<SelectionReport, CliError> {
    let pipeline = util::build_pipeline(cfg, args.rank.pings).await?;
    let criteria = util::criteria(&pipeline, cfg, &args.place, &args.rank).await?;
    debug!(criteria = %criteria.describe(), "selecting server");

    let mut rng = StdRng::from_entropy();
    let bar = util::spinner("Probing server latency", global.quiet);
    let result = pipeline.select_server(&criteria, &mut rng, cancel).await;
    bar.finish_and_clear();
    result.map_err(CliError::from)
}

fn detail(report: &ConnectReport, color: bool) -> String {
    let mut lines = Vec::new();
    if let Some(selection) = &report.selection {
        let chosen = selection.selection.chosen.identifier();
        let rows: Vec<CandidateRow> = selection
            .selection
            .pool
            .iter()
            .map(|c| CandidateRow::new(c, c.identifier() == chosen, color))
            .collect();
        lines.push(output::render_table(&rows));
        lines.push(format!(
            "{} matched, {} probed, {} excluded",
            selection.matched,
            selection.load_ranked.len(),
            selection.excluded.len()
        ));
        for (server, reason) in &selection.excluded {
            lines.push(format!("  {server}: {reason}"));
        }
    }
    lines.push(format!("Server:   {} ({})", report.server, report.protocol));
    lines.push(format!("Profile:  {}", report.profile.display()));
    if !report.failover.is_empty() {
        lines.push(format!("Failover: {}", report.failover.join(", ")));
    }
    lines.join("\n")
}

/// Configured pass-through options, then the ones given on the command line.
fn extra_args(cfg: &Config, cli: Option<&str>) -> Vec<String> {
    cfg.tunnel
        .extra_options
        .iter()
        .cloned()
        .chain(cli.into_iter().flat_map(|raw| raw.split_whitespace().map(str::to_owned)))
        .collect()
}
