//! `nordlane kill`: stop tunnels, optionally flush the firewall.

use nordlane_config::Config;
use nordlane_core::tunnel;
use nordlane_core::{FirewallController, IptablesBackend, interfaces};

use crate::cli::{GlobalOpts, KillArgs};
use crate::error::CliError;

use super::util;

pub async fn handle(args: KillArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    if tunnel::terminate_all(&cfg.tunnel.openvpn).await? {
        util::status(global, "Tunnel stopped");
    } else {
        util::status(global, "No tunnel was running");
    }

    if !args.flush {
        return Ok(());
    }

    let policy = util::arm_policy(cfg, &args.access)?;
    let ifaces = interfaces::discover().await?;
    let mut firewall = FirewallController::new(IptablesBackend::new());
    firewall.flush_and_allow(&ifaces, &policy).await?;

    let reopened = policy.allowed_ports.len();
    if reopened > 0 || policy.allow_locally {
        util::status(
            global,
            &format!("Firewall flushed, IPv6 re-enabled, {reopened} port rule(s) re-opened"),
        );
    } else {
        util::status(global, "Firewall flushed and IPv6 re-enabled");
    }
    Ok(())
}
