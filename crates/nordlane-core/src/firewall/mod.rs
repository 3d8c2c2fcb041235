// ── Firewall lifecycle ──
//
// `FirewallController` owns the host rule table while a session runs and
// tracks what it last asserted. Every transition flushes before it appends,
// so any sequence of transitions ends in the same table as applying the last
// one directly.

pub mod allowed_ports;
pub mod backend;
pub mod rules;

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};

pub use allowed_ports::{AllowedPort, PortProtocol};
pub use backend::{FirewallBackend, IptablesBackend, MemoryBackend, RuleTable};
pub use rules::{ArmPolicy, Chain, FirewallOp, PortSpec, Rule, Target, Transport};

use crate::error::CoreError;
use crate::model::{FirewallState, NetworkInterface};

/// Drives a [`FirewallBackend`] through the
/// `Unmanaged -> Cleared <-> Armed` lifecycle.
#[derive(Debug)]
pub struct FirewallController<B> {
    backend: B,
    state: FirewallState,
}

impl<B: FirewallBackend> FirewallController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: FirewallState::Unmanaged,
        }
    }

    pub fn state(&self) -> FirewallState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    async fn apply_all(&mut self, ops: &[FirewallOp]) -> Result<(), CoreError> {
        for op in ops {
            if let Err(e) = self.backend.apply(op).await {
                // Partially applied; only a fresh clear restores a known table.
                self.state = FirewallState::Unmanaged;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Open outbound, close inbound, re-enable IPv6. Idempotent.
    pub async fn clear(&mut self) -> Result<(), CoreError> {
        self.backend.ensure_privileged("clearing the firewall").await?;
        debug!(from = %self.state, "clearing firewall");
        self.apply_all(&rules::cleared_plan()).await?;
        self.state = FirewallState::Cleared;
        Ok(())
    }

    /// Default-deny everything except the VPN servers, the tunnel, provider
    /// DNS, and the local allowances in `policy`. Clears first unless the
    /// table is already known to be cleared.
    pub async fn arm(
        &mut self,
        interfaces: &[NetworkInterface],
        server_ips: &[Ipv4Addr],
        policy: &ArmPolicy,
    ) -> Result<(), CoreError> {
        if server_ips.is_empty() {
            return Err(CoreError::Firewall {
                message: "no VPN server address to allow".into(),
            });
        }
        self.backend.ensure_privileged("arming the firewall").await?;

        if self.state != FirewallState::Cleared {
            self.clear().await?;
        }

        let plan = rules::armed_plan(interfaces, server_ips, policy);
        if rules::physical_interfaces(interfaces, &policy.tunnel_pattern)
            .next()
            .is_none()
        {
            warn!("no addressed network interface found; only the tunnel will pass traffic");
        }
        self.apply_all(&plan).await?;
        self.state = FirewallState::Armed;
        info!(servers = ?server_ips, rules = plan.len(), "firewall armed");
        Ok(())
    }

    /// Clear, then re-open the local allowances in `policy`.
    pub async fn flush_and_allow(
        &mut self,
        interfaces: &[NetworkInterface],
        policy: &ArmPolicy,
    ) -> Result<(), CoreError> {
        self.clear().await?;
        let ops = rules::local_access_rules(interfaces, policy);
        if !ops.is_empty() {
            self.apply_all(&ops).await?;
            info!(rules = ops.len(), "local access re-opened");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use super::rules::tests::host_interfaces;

    fn server() -> Vec<Ipv4Addr> {
        vec![Ipv4Addr::new(198, 51, 100, 7)]
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let mut once = FirewallController::new(MemoryBackend::new());
        once.clear().await.unwrap();

        let mut twice = FirewallController::new(MemoryBackend::new());
        twice.clear().await.unwrap();
        twice.clear().await.unwrap();

        assert_eq!(once.state(), FirewallState::Cleared);
        assert_eq!(once.backend().table(), twice.backend().table());
    }

    #[tokio::test]
    async fn rearming_does_not_duplicate_rules() {
        let policy = ArmPolicy::default();
        let mut fw = FirewallController::new(MemoryBackend::new());
        fw.arm(&host_interfaces(), &server(), &policy).await.unwrap();
        let first = fw.backend().table().clone();

        fw.arm(&host_interfaces(), &server(), &policy).await.unwrap();
        assert_eq!(fw.backend().table(), &first);
        assert_eq!(fw.state(), FirewallState::Armed);
    }

    #[tokio::test]
    async fn arm_clear_arm_matches_direct_arm() {
        let policy = ArmPolicy {
            allowed_ports: vec![AllowedPort::tcp(22)],
            ..ArmPolicy::default()
        };

        let mut direct = FirewallController::new(MemoryBackend::new());
        direct.arm(&host_interfaces(), &server(), &policy).await.unwrap();

        let mut cycled = FirewallController::new(MemoryBackend::new());
        cycled
            .arm(&host_interfaces(), &[Ipv4Addr::new(203, 0, 113, 1)], &policy)
            .await
            .unwrap();
        cycled.clear().await.unwrap();
        assert!(!cycled.backend().table().ipv6_disabled);
        cycled.arm(&host_interfaces(), &server(), &policy).await.unwrap();

        assert_eq!(
            direct.backend().table().to_string(),
            cycled.backend().table().to_string()
        );
    }

    #[tokio::test]
    async fn arming_from_unmanaged_clears_first() {
        let mut fw = FirewallController::new(MemoryBackend::new());
        fw.arm(&host_interfaces(), &server(), &ArmPolicy::default())
            .await
            .unwrap();

        let log = fw.backend().log();
        assert_eq!(log[..rules::cleared_plan().len()], rules::cleared_plan()[..]);
        assert!(fw.backend().table().ipv6_disabled);
        assert_eq!(fw.backend().table().output_policy, Target::Drop);
    }

    #[tokio::test]
    async fn permission_is_required() {
        let mut fw = FirewallController::new(MemoryBackend::unprivileged());
        let err = fw.clear().await.unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));

        let err = fw
            .arm(&host_interfaces(), &server(), &ArmPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PermissionDenied { .. }));
        assert_eq!(fw.state(), FirewallState::Unmanaged);
    }

    #[tokio::test]
    async fn arming_needs_a_server_address() {
        let mut fw = FirewallController::new(MemoryBackend::new());
        let err = fw
            .arm(&host_interfaces(), &[], &ArmPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Firewall { .. }));
        assert!(fw.backend().log().is_empty());
    }

    #[tokio::test]
    async fn flush_and_allow_reopens_ports() {
        let policy = ArmPolicy {
            allowed_ports: vec![AllowedPort::tcp(22)],
            ..ArmPolicy::default()
        };
        let mut fw = FirewallController::new(MemoryBackend::new());
        fw.flush_and_allow(&host_interfaces(), &policy).await.unwrap();

        let table = fw.backend().table();
        assert_eq!(fw.state(), FirewallState::Cleared);
        assert_eq!(table.output_policy, Target::Accept);
        assert_eq!(
            table.input.last().map(|r| r.match_args().join(" ")),
            Some("-i eth0 -p tcp -s 192.168.1.0/24 --dport 22 -j ACCEPT".to_owned())
        );
    }
}
