// ── Firewall domain types ──

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use strum::Display;

/// What this process last asserted about the host packet filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FirewallState {
    /// Nothing asserted yet; host rules are whatever the user configured.
    #[default]
    Unmanaged,
    /// Outbound open, inbound closed except loopback and established.
    Cleared,
    /// Default-deny both ways, VPN server and tunnel allowed.
    Armed,
}

/// IPv4 address with its prefix length, as `ip addr` reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAddress {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl InterfaceAddress {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            address,
            prefix_len: prefix_len.min(32),
        }
    }

    /// Network address with host bits cleared.
    pub fn network(&self) -> Ipv4Addr {
        let mask = u32::MAX
            .checked_shl(32 - u32::from(self.prefix_len))
            .unwrap_or(0);
        Ipv4Addr::from(u32::from(self.address) & mask)
    }

    /// Subnet in CIDR notation, e.g. `192.168.1.0/24`.
    pub fn subnet(&self) -> String {
        format!("{}/{}", self.network(), self.prefix_len)
    }
}

/// A host network interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub name: String,
    /// Kernel flags, e.g. `UP`, `LOOPBACK`, `POINTOPOINT`.
    pub flags: Vec<String>,
    pub ipv4: Option<InterfaceAddress>,
}

impl NetworkInterface {
    fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn is_loopback(&self) -> bool {
        self.has_flag("LOOPBACK") || self.name == "lo"
    }

    pub fn is_up(&self) -> bool {
        self.has_flag("UP")
    }

    /// Whether the name matches an iptables-style interface pattern, where a
    /// trailing `+` matches any suffix (`tun+`).
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        match pattern.strip_suffix('+') {
            Some(prefix) => self.name.starts_with(prefix),
            None => self.name == pattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_clears_host_bits() {
        let addr = InterfaceAddress::new(Ipv4Addr::new(192, 168, 1, 57), 24);
        assert_eq!(addr.subnet(), "192.168.1.0/24");

        let wide = InterfaceAddress::new(Ipv4Addr::new(10, 20, 30, 40), 8);
        assert_eq!(wide.network(), Ipv4Addr::new(10, 0, 0, 0));
    }

    #[test]
    fn zero_prefix_is_whole_space() {
        let addr = InterfaceAddress::new(Ipv4Addr::new(8, 8, 8, 8), 0);
        assert_eq!(addr.subnet(), "0.0.0.0/0");
    }

    #[test]
    fn host_prefix_keeps_address() {
        let addr = InterfaceAddress::new(Ipv4Addr::new(172, 16, 0, 9), 32);
        assert_eq!(addr.subnet(), "172.16.0.9/32");
    }

    #[test]
    fn tunnel_pattern_matching() {
        let tun = NetworkInterface {
            name: "tun0".into(),
            flags: vec!["POINTOPOINT".into(), "UP".into()],
            ipv4: None,
        };
        assert!(tun.matches_pattern("tun+"));
        assert!(!tun.matches_pattern("tun"));
        assert!(tun.matches_pattern("tun0"));
        assert!(tun.is_up());
        assert!(!tun.is_loopback());
    }
}
