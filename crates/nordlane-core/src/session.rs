// ── Connection session ──
//
// Drives one `connect` invocation after selection: for each server in
// failover order, load its profile, clear and re-arm the firewall around
// that server's addresses, then hand over to the tunnel driver. A clean
// tunnel exit or an interrupt ends the session; a failed tunnel moves on
// to the next server. DNS changes are reverted on every way out.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dns::DnsPatcher;
use crate::error::CoreError;
use crate::firewall::{ArmPolicy, FirewallBackend, FirewallController};
use crate::model::{NetworkInterface, Protocol};
use crate::profile::ProfileStore;
use crate::select::Selection;
use crate::tunnel::{TunnelDriver, TunnelExit, TunnelRequest};

/// Per-invocation connection settings.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub protocol: Protocol,
    /// Run everything up to the tunnel, then stop without touching the host.
    pub test_mode: bool,
    pub arm_policy: ArmPolicy,
    pub credentials: Option<PathBuf>,
    pub status_file: Option<PathBuf>,
    pub redirect_gateway: bool,
    pub extra_args: Vec<String>,
}

/// Servers to try, in order. A manual server repeats its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPlan {
    pub servers: Vec<String>,
}

impl ConnectPlan {
    /// The chosen server, then the rest of the pool by latency.
    pub fn from_selection(selection: &Selection) -> Self {
        Self {
            servers: selection
                .failover_order()
                .into_iter()
                .map(|c| c.identifier().to_owned())
                .collect(),
        }
    }

    /// The same server, `attempts` times.
    pub fn manual(identifier: &str, attempts: usize) -> Self {
        Self {
            servers: vec![identifier.trim().to_ascii_lowercase(); attempts.max(1)],
        }
    }
}

/// What one attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub server: String,
    pub outcome: Result<TunnelExit, String>,
}

/// How the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Test mode stopped before any host change.
    Simulated { server: String, profile: PathBuf },
    /// The tunnel exited cleanly after a deliberate stop.
    Stopped { server: String },
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub end: SessionEnd,
    pub attempts: Vec<Attempt>,
}

/// Host-side orchestration of one connect run.
pub struct ConnectionSession<B, T> {
    firewall: Option<FirewallController<B>>,
    driver: T,
    profiles: ProfileStore,
    dns: Box<dyn DnsPatcher>,
    interfaces: Vec<NetworkInterface>,
    options: SessionOptions,
}

impl<B, T> ConnectionSession<B, T>
where
    B: FirewallBackend,
    T: TunnelDriver,
{
    pub fn new(
        driver: T,
        profiles: ProfileStore,
        dns: Box<dyn DnsPatcher>,
        options: SessionOptions,
    ) -> Self {
        Self {
            firewall: None,
            driver,
            profiles,
            dns,
            interfaces: Vec::new(),
            options,
        }
    }

    /// Enforce the kill switch with `firewall` on the given interfaces.
    pub fn with_firewall(
        mut self,
        firewall: FirewallController<B>,
        interfaces: Vec<NetworkInterface>,
    ) -> Self {
        self.firewall = Some(firewall);
        self.interfaces = interfaces;
        self
    }

    pub fn firewall(&self) -> Option<&FirewallController<B>> {
        self.firewall.as_ref()
    }

    pub async fn run(
        &mut self,
        plan: &ConnectPlan,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, CoreError> {
        if self.options.test_mode {
            return self.simulate(plan);
        }

        let mut attempts = Vec::new();
        let mut dns_applied = false;
        let result = self.attempt_all(plan, cancel, &mut attempts, &mut dns_applied).await;

        if dns_applied {
            if let Err(e) = self.dns.revert() {
                warn!("could not revert DNS changes: {e}");
            }
        }
        result.map(|end| SessionOutcome { end, attempts })
    }

    fn simulate(&self, plan: &ConnectPlan) -> Result<SessionOutcome, CoreError> {
        let server = plan.servers.first().ok_or(CoreError::NoCandidates)?;
        let profile = self.profiles.path(server, self.options.protocol);
        info!(
            %server,
            protocol = %self.options.protocol,
            "test mode: would connect now; no firewall, DNS or tunnel changes made"
        );
        Ok(SessionOutcome {
            end: SessionEnd::Simulated {
                server: server.clone(),
                profile,
            },
            attempts: Vec::new(),
        })
    }

    async fn attempt_all(
        &mut self,
        plan: &ConnectPlan,
        cancel: &CancellationToken,
        attempts: &mut Vec<Attempt>,
        dns_applied: &mut bool,
    ) -> Result<SessionEnd, CoreError> {
        let mut last_profile_error = None;
        let mut reached_tunnel = false;

        for (index, server) in plan.servers.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(SessionEnd::Interrupted);
            }
            info!(%server, attempt = index + 1, of = plan.servers.len(), "connecting");

            let profile = match self.profiles.load(server, self.options.protocol) {
                Ok(profile) => profile,
                Err(e @ (CoreError::ProfileNotFound { .. } | CoreError::ProfileInvalid { .. })) => {
                    warn!(%server, "{e}, trying the next server");
                    attempts.push(Attempt {
                        server: server.clone(),
                        outcome: Err(e.to_string()),
                    });
                    last_profile_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(firewall) = self.firewall.as_mut() {
                // Rules from the previous server must never survive into the
                // next attempt.
                firewall.clear().await?;
                firewall
                    .arm(&self.interfaces, &profile.server_ips(), &self.options.arm_policy)
                    .await?;
            }

            if !*dns_applied {
                self.dns.apply()?;
                *dns_applied = true;
            }

            let request = TunnelRequest {
                server: server.clone(),
                protocol: self.options.protocol,
                profile: profile.path.clone(),
                credentials: self.options.credentials.clone(),
                status_file: self.options.status_file.clone(),
                redirect_gateway: self.options.redirect_gateway,
                dns_args: self.dns.openvpn_args(),
                extra_args: self.options.extra_args.clone(),
            };
            if cancel.is_cancelled() {
                return Ok(SessionEnd::Interrupted);
            }
            reached_tunnel = true;

            match self.driver.run(&request, cancel).await {
                Ok(exit) => {
                    attempts.push(Attempt {
                        server: server.clone(),
                        outcome: Ok(exit),
                    });
                    match exit {
                        TunnelExit::Stopped => {
                            return Ok(SessionEnd::Stopped {
                                server: server.clone(),
                            });
                        }
                        TunnelExit::Interrupted => return Ok(SessionEnd::Interrupted),
                        TunnelExit::Failed { code } => {
                            warn!(%server, ?code, "tunnel failed, trying the next server");
                        }
                    }
                }
                Err(CoreError::Interrupted) => return Ok(SessionEnd::Interrupted),
                Err(e) => {
                    warn!(%server, "{e}, trying the next server");
                    attempts.push(Attempt {
                        server: server.clone(),
                        outcome: Err(e.to_string()),
                    });
                }
            }
        }

        match last_profile_error {
            Some(e) if !reached_tunnel => Err(e),
            _ => Err(CoreError::AttemptsExhausted {
                attempts: attempts.len(),
            }),
        }
    }
}
