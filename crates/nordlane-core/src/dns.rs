// ── DNS leak protection ──
//
// While the tunnel is up, name resolution must go to the provider's
// resolvers. Which mechanism does that depends on the host; one patcher is
// chosen at startup and used for the whole session.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::CoreError;

const RESOLVED_STUB: &str = "127.0.0.53";

/// Host DNS integration used while connected.
pub trait DnsPatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extra OpenVPN arguments (hook scripts, DHCP options).
    fn openvpn_args(&self) -> Vec<String> {
        Vec::new()
    }

    /// Point the host at the provider's resolvers before connecting.
    fn apply(&self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Undo [`apply`](Self::apply). Safe to call when nothing was applied.
    fn revert(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

fn hook_args(script: &Path) -> Vec<String> {
    let script = script.display().to_string();
    vec![
        "--script-security".into(),
        "2".into(),
        "--up".into(),
        script.clone(),
        "--down".into(),
        script,
    ]
}

/// systemd-resolved via its OpenVPN hook script.
#[derive(Debug, Clone)]
pub struct ResolvedPatcher {
    pub hook_script: PathBuf,
}

impl DnsPatcher for ResolvedPatcher {
    fn name(&self) -> &'static str {
        "systemd-resolved"
    }

    fn openvpn_args(&self) -> Vec<String> {
        let mut args = vec![
            "--dhcp-option".to_owned(),
            "DOMAIN-ROUTE".to_owned(),
            ".".to_owned(),
        ];
        args.extend(hook_args(&self.hook_script));
        args
    }
}

/// `resolvconf` via the update-resolv-conf hook script.
#[derive(Debug, Clone)]
pub struct ResolvconfPatcher {
    pub hook_script: PathBuf,
}

impl DnsPatcher for ResolvconfPatcher {
    fn name(&self) -> &'static str {
        "resolvconf"
    }

    fn openvpn_args(&self) -> Vec<String> {
        hook_args(&self.hook_script)
    }
}

/// Rewrites resolv.conf directly, keeping a backup to restore.
#[derive(Debug, Clone)]
pub struct ManualPatcher {
    pub resolv_conf: PathBuf,
    pub backup: PathBuf,
    pub servers: Vec<Ipv4Addr>,
}

impl ManualPatcher {
    pub fn new(resolv_conf: impl Into<PathBuf>, servers: Vec<Ipv4Addr>) -> Self {
        let resolv_conf = resolv_conf.into();
        let backup = resolv_conf.with_extension("conf.nordlane-backup");
        Self {
            resolv_conf,
            backup,
            servers,
        }
    }

    fn contents(&self) -> String {
        let mut out = String::from("# Generated by nordlane; restored on disconnect\n");
        for server in &self.servers {
            out.push_str(&format!("nameserver {server}\n"));
        }
        out
    }
}

impl DnsPatcher for ManualPatcher {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn apply(&self) -> Result<(), CoreError> {
        // An existing backup is the pristine file from an interrupted run.
        if !self.backup.exists() && self.resolv_conf.exists() {
            std::fs::copy(&self.resolv_conf, &self.backup)?;
        }
        std::fs::write(&self.resolv_conf, self.contents())?;
        info!(path = %self.resolv_conf.display(), "resolv.conf now points at provider DNS");
        Ok(())
    }

    fn revert(&self) -> Result<(), CoreError> {
        if self.backup.exists() {
            std::fs::rename(&self.backup, &self.resolv_conf)?;
            info!(path = %self.resolv_conf.display(), "resolv.conf restored");
        }
        Ok(())
    }
}

/// Leaves DNS alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPatcher;

impl DnsPatcher for NoopPatcher {
    fn name(&self) -> &'static str {
        "none"
    }

    fn apply(&self) -> Result<(), CoreError> {
        warn!("not modifying DNS; lookups will likely bypass the tunnel");
        Ok(())
    }
}

// ── Detection ────────────────────────────────────────────────────────

/// Inputs for choosing a patcher.
#[derive(Debug, Clone)]
pub struct DnsOptions {
    pub skip: bool,
    pub resolv_conf: PathBuf,
    pub resolvconf_binary: PathBuf,
    pub resolved_hook: PathBuf,
    pub resolvconf_hook: PathBuf,
    pub servers: Vec<Ipv4Addr>,
}

/// What the host looks like.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostDns {
    pub resolved_active: bool,
    pub nameservers: Vec<String>,
    pub has_resolvconf: bool,
    pub resolved_hook_present: bool,
    pub resolvconf_hook_present: bool,
}

/// `nameserver` entries from resolv.conf contents.
pub fn nameservers(resolv_conf: &str) -> Vec<String> {
    resolv_conf
        .lines()
        .filter_map(|line| line.trim().strip_prefix("nameserver"))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

/// Pick a patcher for the given host facts.
pub fn choose(host: &HostDns, options: &DnsOptions) -> Box<dyn DnsPatcher> {
    if options.skip {
        return Box::new(NoopPatcher);
    }
    if host.resolved_active && host.resolved_hook_present {
        if host.nameservers != [RESOLVED_STUB] {
            warn!(
                nameservers = ?host.nameservers,
                "systemd-resolved is running but resolv.conf does not point at it; check for DNS leaks"
            );
        }
        return Box::new(ResolvedPatcher {
            hook_script: options.resolved_hook.clone(),
        });
    }
    if host.has_resolvconf && host.resolvconf_hook_present {
        return Box::new(ResolvconfPatcher {
            hook_script: options.resolvconf_hook.clone(),
        });
    }
    if host.resolved_active || host.has_resolvconf {
        warn!("DNS hook script not found, rewriting resolv.conf directly");
    }
    Box::new(ManualPatcher::new(&options.resolv_conf, options.servers.clone()))
}

/// Inspect the host and pick a patcher.
pub async fn detect(options: &DnsOptions) -> Box<dyn DnsPatcher> {
    let host = if options.skip {
        HostDns::default()
    } else {
        let resolved_active = Command::new("systemctl")
            .args(["is-active", "--quiet", "systemd-resolved"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .is_ok_and(|s| s.success());
        HostDns {
            resolved_active,
            nameservers: std::fs::read_to_string(&options.resolv_conf)
                .map(|c| nameservers(&c))
                .unwrap_or_default(),
            has_resolvconf: options.resolvconf_binary.is_file(),
            resolved_hook_present: options.resolved_hook.is_file(),
            resolvconf_hook_present: options.resolvconf_hook.is_file(),
        }
    };
    let patcher = choose(&host, options);
    info!(patcher = patcher.name(), "DNS integration selected");
    patcher
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn options() -> DnsOptions {
        DnsOptions {
            skip: false,
            resolv_conf: "/etc/resolv.conf".into(),
            resolvconf_binary: "/sbin/resolvconf".into(),
            resolved_hook: "/etc/openvpn/update-systemd-resolved".into(),
            resolvconf_hook: "/etc/openvpn/update-resolv-conf".into(),
            servers: vec![Ipv4Addr::new(103, 86, 96, 100)],
        }
    }

    #[test]
    fn nameserver_lines() {
        let conf = "# comment\nnameserver 127.0.0.53\noptions edns0\nnameserver 1.1.1.1 # x\n";
        assert_eq!(nameservers(conf), vec!["127.0.0.53", "1.1.1.1"]);
    }

    #[test]
    fn patcher_preference() {
        let resolved = HostDns {
            resolved_active: true,
            nameservers: vec![RESOLVED_STUB.into()],
            has_resolvconf: true,
            resolved_hook_present: true,
            resolvconf_hook_present: true,
        };
        assert_eq!(choose(&resolved, &options()).name(), "systemd-resolved");

        let resolvconf = HostDns {
            resolved_active: false,
            ..resolved.clone()
        };
        assert_eq!(choose(&resolvconf, &options()).name(), "resolvconf");

        let bare = HostDns::default();
        assert_eq!(choose(&bare, &options()).name(), "manual");

        let skipped = DnsOptions {
            skip: true,
            ..options()
        };
        assert_eq!(choose(&resolved, &skipped).name(), "none");
    }

    #[test]
    fn resolved_passes_domain_route() {
        let patcher = ResolvedPatcher {
            hook_script: "/hooks/resolved.sh".into(),
        };
        assert_eq!(
            patcher.openvpn_args().join(" "),
            "--dhcp-option DOMAIN-ROUTE . --script-security 2 --up /hooks/resolved.sh --down /hooks/resolved.sh"
        );
    }

    #[test]
    fn manual_patch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let resolv = dir.path().join("resolv.conf");
        std::fs::write(&resolv, "nameserver 192.168.1.1\n").unwrap();

        let patcher = ManualPatcher::new(&resolv, vec![Ipv4Addr::new(103, 86, 96, 100)]);
        patcher.apply().unwrap();
        assert_eq!(
            nameservers(&std::fs::read_to_string(&resolv).unwrap()),
            vec!["103.86.96.100"]
        );

        // A second apply keeps the original backup.
        patcher.apply().unwrap();
        patcher.revert().unwrap();
        assert_eq!(std::fs::read_to_string(&resolv).unwrap(), "nameserver 192.168.1.1\n");

        patcher.revert().unwrap();
    }
}
