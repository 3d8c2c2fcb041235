// ── Firewall backends ──
//
// A backend applies one `FirewallOp` at a time, in the order given. The
// iptables backend shells out; the memory backend keeps a simulated rule
// table for previews and tests.

use std::fmt;
use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use super::rules::{Chain, FirewallOp, Rule, Target};
use crate::error::CoreError;

/// Host packet-filter capability.
pub trait FirewallBackend: Send {
    /// Fail with [`CoreError::PermissionDenied`] unless mutations are allowed.
    fn ensure_privileged(
        &self,
        operation: &str,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn apply(&mut self, op: &FirewallOp) -> impl Future<Output = Result<(), CoreError>> + Send;
}

// ── iptables ─────────────────────────────────────────────────────────

/// Applies operations with `iptables` and `sysctl`.
#[derive(Debug, Clone)]
pub struct IptablesBackend {
    iptables: String,
    sysctl: String,
}

impl Default for IptablesBackend {
    fn default() -> Self {
        Self {
            iptables: "iptables".into(),
            sysctl: "sysctl".into(),
        }
    }
}

impl IptablesBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_programs(iptables: impl Into<String>, sysctl: impl Into<String>) -> Self {
        Self {
            iptables: iptables.into(),
            sysctl: sysctl.into(),
        }
    }

    async fn run(program: &str, args: &[String]) -> Result<std::process::Output, CoreError> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CoreError::Firewall {
                message: format!("could not run {program}: {e}"),
            })
    }
}

fn denied(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("permission denied") || lower.contains("you must be root")
}

impl FirewallBackend for IptablesBackend {
    async fn ensure_privileged(&self, operation: &str) -> Result<(), CoreError> {
        let output = Command::new("id")
            .arg("-u")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        let uid = String::from_utf8_lossy(&output.stdout);
        if uid.trim() == "0" {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied {
                operation: operation.to_owned(),
            })
        }
    }

    async fn apply(&mut self, op: &FirewallOp) -> Result<(), CoreError> {
        debug!(%op, "applying");
        match op {
            FirewallOp::DisableIpv6(disable) => {
                let args = vec![
                    "-q".to_owned(),
                    "-w".to_owned(),
                    format!("net.ipv6.conf.all.disable_ipv6={}", u8::from(*disable)),
                ];
                match Self::run(&self.sysctl, &args).await {
                    Ok(out) if out.status.success() => {}
                    Ok(out) => warn!(
                        "could not toggle IPv6: {}",
                        String::from_utf8_lossy(&out.stderr).trim()
                    ),
                    Err(e) => warn!("could not toggle IPv6: {e}"),
                }
                Ok(())
            }
            _ => {
                let Some(args) = op.iptables_args() else {
                    return Ok(());
                };
                let out = Self::run(&self.iptables, &args).await?;
                if out.status.success() {
                    return Ok(());
                }
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_owned();
                if denied(&stderr) {
                    Err(CoreError::PermissionDenied {
                        operation: op.to_string(),
                    })
                } else {
                    Err(CoreError::Firewall {
                        message: format!("'{op}' failed: {stderr}"),
                    })
                }
            }
        }
    }
}

// ── In-memory ────────────────────────────────────────────────────────

/// Simulated filter table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    pub input_policy: Target,
    pub output_policy: Target,
    pub input: Vec<Rule>,
    pub output: Vec<Rule>,
    pub ipv6_disabled: bool,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            input_policy: Target::Accept,
            output_policy: Target::Accept,
            input: Vec::new(),
            output: Vec::new(),
            ipv6_disabled: false,
        }
    }
}

impl RuleTable {
    fn chain_mut(&mut self, chain: Chain) -> &mut Vec<Rule> {
        match chain {
            Chain::Input => &mut self.input,
            Chain::Output => &mut self.output,
        }
    }

    fn apply(&mut self, op: &FirewallOp) {
        match op {
            FirewallOp::Flush(chain) => self.chain_mut(*chain).clear(),
            FirewallOp::Policy(Chain::Input, target) => self.input_policy = *target,
            FirewallOp::Policy(Chain::Output, target) => self.output_policy = *target,
            FirewallOp::Append(rule) => self.chain_mut(rule.chain).push(rule.clone()),
            FirewallOp::DisableIpv6(disable) => self.ipv6_disabled = *disable,
        }
    }
}

/// `iptables -S` style listing.
impl fmt::Display for RuleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-P INPUT {}", self.input_policy)?;
        writeln!(f, "-P OUTPUT {}", self.output_policy)?;
        for rule in self.input.iter().chain(&self.output) {
            writeln!(f, "-A {} {}", rule.chain, rule.match_args().join(" "))?;
        }
        write!(f, "# ipv6 {}", if self.ipv6_disabled { "disabled" } else { "enabled" })
    }
}

/// Backend that mutates a [`RuleTable`] and records every operation.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    table: RuleTable,
    log: Vec<FirewallOp>,
    privileged: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            table: RuleTable::default(),
            log: Vec::new(),
            privileged: true,
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses every mutation.
    pub fn unprivileged() -> Self {
        Self {
            privileged: false,
            ..Self::default()
        }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    /// Every operation applied so far, in order.
    pub fn log(&self) -> &[FirewallOp] {
        &self.log
    }

    pub fn take_log(&mut self) -> Vec<FirewallOp> {
        std::mem::take(&mut self.log)
    }
}

impl FirewallBackend for MemoryBackend {
    async fn ensure_privileged(&self, operation: &str) -> Result<(), CoreError> {
        if self.privileged {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied {
                operation: operation.to_owned(),
            })
        }
    }

    async fn apply(&mut self, op: &FirewallOp) -> Result<(), CoreError> {
        if !self.privileged {
            return Err(CoreError::PermissionDenied {
                operation: op.to_string(),
            });
        }
        self.table.apply(op);
        self.log.push(op.clone());
        Ok(())
    }
}
