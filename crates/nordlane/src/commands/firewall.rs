//! `nordlane firewall plan|clear`.

use std::net::Ipv4Addr;

use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use nordlane_config::Config;
use nordlane_core::{
    CoreError, FirewallController, FirewallOp, IptablesBackend, MemoryBackend, ProfileStore,
    interfaces,
};

use crate::cli::{FirewallArgs, FirewallCommand, GlobalOpts, LocalAccessArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct PlannedOp {
    step: usize,
    command: String,
    op: FirewallOp,
}

#[derive(Tabled)]
struct PlannedOpRow {
    #[tabled(rename = "#")]
    step: usize,
    #[tabled(rename = "Command")]
    command: String,
}

pub async fn handle(args: FirewallArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        FirewallCommand::Plan {
            server,
            tcp,
            access,
        } => plan(&server, tcp, &access, cfg, global).await,
        FirewallCommand::Clear => {
            if !util::confirm(
                "Disable the kill switch and allow traffic outside the tunnel?",
                global.yes,
            )? {
                return Ok(());
            }
            let mut firewall = FirewallController::new(IptablesBackend::new());
            firewall.clear().await?;
            util::status(global, "Firewall cleared and IPv6 re-enabled");
            Ok(())
        }
    }
}

async fn plan(
    server: &str,
    tcp: bool,
    access: &LocalAccessArgs,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let ips = server_addresses(server, util::protocol(tcp), cfg).await?;
    let policy = util::arm_policy(cfg, access)?;
    let ifaces = interfaces::discover().await?;

    let mut firewall = FirewallController::new(MemoryBackend::new());
    firewall.arm(&ifaces, &ips, &policy).await?;
    let steps: Vec<PlannedOp> = firewall
        .into_backend()
        .take_log()
        .into_iter()
        .enumerate()
        .map(|(i, op)| PlannedOp {
            step: i + 1,
            command: op.to_string(),
            op,
        })
        .collect();

    let out = output::render_list(
        global.output,
        &steps,
        |p| PlannedOpRow {
            step: p.step,
            command: p.command.clone(),
        },
        |p| p.command.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Remote addresses from the server's profile, falling back to the
/// directory entry when no profile is installed.
async fn server_addresses(
    server: &str,
    protocol: nordlane_core::Protocol,
    cfg: &Config,
) -> Result<Vec<Ipv4Addr>, CliError> {
    let profiles = ProfileStore::new(&cfg.paths.profiles_dir, &cfg.directory.host_suffix);
    match profiles.load(server, protocol) {
        Ok(profile) => Ok(profile.server_ips()),
        Err(CoreError::ProfileNotFound { .. }) => {
            debug!(%server, "no profile installed, asking the directory");
            let pipeline = util::listing_pipeline(cfg)?;
            let endpoint = pipeline.endpoint(server).await?;
            endpoint
                .ip_address
                .map(|ip| vec![ip])
                .ok_or_else(|| CliError::Validation {
                    field: "server".into(),
                    reason: format!("{server} has no IPv4 address in the directory"),
                })
        }
        Err(e) => Err(e.into()),
    }
}
