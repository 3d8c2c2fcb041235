// ── Firewall rule planning ──
//
// Pure functions from host facts (interfaces, server IPs, local-access
// policy) to an ordered list of rule-table mutations. First match wins in
// the packet filter, so the order produced here is the order applied.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::allowed_ports::AllowedPort;
use crate::model::NetworkInterface;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Chain {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Target {
    Accept,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
    Icmp,
    All,
}

/// Destination port match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSpec {
    Single(u16),
    /// Inclusive range.
    Range(u16, u16),
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(port) => write!(f, "{port}"),
            Self::Range(lo, hi) => write!(f, "{lo}-{hi}"),
        }
    }
}

/// One appended rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub chain: Chain,
    /// Match `ESTABLISHED,RELATED` connections only.
    pub established: bool,
    pub in_interface: Option<String>,
    pub out_interface: Option<String>,
    pub protocol: Option<Transport>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub dport: Option<PortSpec>,
    pub target: Target,
}

impl Rule {
    pub fn new(chain: Chain, target: Target) -> Self {
        Self {
            chain,
            established: false,
            in_interface: None,
            out_interface: None,
            protocol: None,
            source: None,
            destination: None,
            dport: None,
            target,
        }
    }

    pub fn established(mut self) -> Self {
        self.established = true;
        self
    }

    pub fn in_iface(mut self, name: impl Into<String>) -> Self {
        self.in_interface = Some(name.into());
        self
    }

    pub fn out_iface(mut self, name: impl Into<String>) -> Self {
        self.out_interface = Some(name.into());
        self
    }

    pub fn protocol(mut self, protocol: Transport) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn dport(mut self, port: PortSpec) -> Self {
        self.dport = Some(port);
        self
    }

    /// iptables match and target arguments, without the `-A CHAIN` prefix.
    pub fn match_args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if self.established {
            args.extend(["-m", "conntrack", "--ctstate", "ESTABLISHED,RELATED"].map(String::from));
        }
        if let Some(name) = &self.in_interface {
            args.extend(["-i".to_owned(), name.clone()]);
        }
        if let Some(name) = &self.out_interface {
            args.extend(["-o".to_owned(), name.clone()]);
        }
        if let Some(protocol) = self.protocol {
            args.extend(["-p".to_owned(), protocol.to_string()]);
            if protocol == Transport::Icmp {
                args.extend(["--icmp-type".to_owned(), "any".to_owned()]);
            }
        }
        if let Some(source) = &self.source {
            args.extend(["-s".to_owned(), source.clone()]);
        }
        if let Some(destination) = &self.destination {
            args.extend(["-d".to_owned(), destination.clone()]);
        }
        match self.dport {
            Some(PortSpec::Single(port)) => {
                args.extend(["--dport".to_owned(), port.to_string()]);
            }
            Some(PortSpec::Range(lo, hi)) => {
                args.extend(["-m", "multiport", "--dports"].map(String::from));
                args.push(format!("{lo}:{hi}"));
            }
            None => {}
        }
        args.extend(["-j".to_owned(), self.target.to_string()]);
        args
    }
}

/// One mutation of the host packet filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirewallOp {
    Flush(Chain),
    Policy(Chain, Target),
    Append(Rule),
    /// Toggle the kernel IPv6 stack (`true` disables it).
    DisableIpv6(bool),
}

impl FirewallOp {
    /// iptables arguments, or `None` for non-iptables operations.
    pub fn iptables_args(&self) -> Option<Vec<String>> {
        match self {
            Self::Flush(chain) => Some(vec!["-F".into(), chain.to_string()]),
            Self::Policy(chain, target) => {
                Some(vec!["-P".into(), chain.to_string(), target.to_string()])
            }
            Self::Append(rule) => {
                let mut args = vec!["-A".into(), rule.chain.to_string()];
                args.extend(rule.match_args());
                Some(args)
            }
            Self::DisableIpv6(_) => None,
        }
    }
}

impl fmt::Display for FirewallOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.iptables_args() {
            Some(args) => write!(f, "iptables {}", args.join(" ")),
            None => match self {
                Self::DisableIpv6(disable) => write!(
                    f,
                    "sysctl -w net.ipv6.conf.all.disable_ipv6={}",
                    u8::from(*disable)
                ),
                _ => Ok(()),
            },
        }
    }
}

// ── Plans ────────────────────────────────────────────────────────────

/// Local-network allowances and leak-protection parameters for arming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmPolicy {
    /// Provider resolvers reachable over loopback and the tunnel.
    pub dns_servers: Vec<Ipv4Addr>,
    /// iptables interface pattern for the tunnel device.
    pub tunnel_pattern: String,
    /// Accept everything inbound from each local subnet.
    pub allow_locally: bool,
    pub allowed_ports: Vec<AllowedPort>,
}

impl Default for ArmPolicy {
    fn default() -> Self {
        Self {
            dns_servers: vec![
                Ipv4Addr::new(103, 86, 96, 100),
                Ipv4Addr::new(103, 86, 99, 100),
            ],
            tunnel_pattern: "tun+".into(),
            allow_locally: false,
            allowed_ports: Vec::new(),
        }
    }
}

const LOOPBACK: &str = "lo";
const LOOPBACK_NET: &str = "127.0.0.0/8";

/// Interfaces that carry traffic to the VPN server: up, addressed, not
/// loopback, not the tunnel itself.
pub fn physical_interfaces<'a>(
    interfaces: &'a [NetworkInterface],
    tunnel_pattern: &'a str,
) -> impl Iterator<Item = &'a NetworkInterface> + 'a {
    interfaces.iter().filter(move |i| {
        i.is_up() && i.ipv4.is_some() && !i.is_loopback() && !i.matches_pattern(tunnel_pattern)
    })
}

/// Outbound open; inbound only loopback, established, and ICMP.
pub fn cleared_plan() -> Vec<FirewallOp> {
    vec![
        FirewallOp::Flush(Chain::Output),
        FirewallOp::Policy(Chain::Output, Target::Accept),
        FirewallOp::Flush(Chain::Input),
        FirewallOp::Append(Rule::new(Chain::Input, Target::Accept).in_iface(LOOPBACK)),
        FirewallOp::Append(Rule::new(Chain::Output, Target::Accept).out_iface(LOOPBACK)),
        FirewallOp::Append(Rule::new(Chain::Input, Target::Accept).established()),
        FirewallOp::Append(Rule::new(Chain::Input, Target::Accept).protocol(Transport::Icmp)),
        FirewallOp::Append(Rule::new(Chain::Input, Target::Drop).source(LOOPBACK_NET)),
        FirewallOp::Policy(Chain::Input, Target::Drop),
        FirewallOp::DisableIpv6(false),
    ]
}

/// Inbound allowances from the local network: per-port rules, then the
/// blanket allow-locally rule.
pub fn local_access_rules(interfaces: &[NetworkInterface], policy: &ArmPolicy) -> Vec<FirewallOp> {
    let mut ops = Vec::new();

    for allowed in &policy.allowed_ports {
        for transport in allowed.protocol.transports() {
            for iface in physical_interfaces(interfaces, &policy.tunnel_pattern) {
                let mut rule = Rule::new(Chain::Input, Target::Accept)
                    .protocol(transport)
                    .dport(allowed.port)
                    .in_iface(&iface.name);
                let sources = allowed.sources(iface);
                if !sources.is_empty() {
                    rule = rule.source(sources.join(","));
                }
                ops.push(FirewallOp::Append(rule));
            }
        }
    }

    if policy.allow_locally {
        for iface in physical_interfaces(interfaces, &policy.tunnel_pattern) {
            if let Some(addr) = iface.ipv4 {
                ops.push(FirewallOp::Append(
                    Rule::new(Chain::Input, Target::Accept)
                        .in_iface(&iface.name)
                        .source(addr.subnet()),
                ));
            }
        }
    }
    ops
}

/// Full arming sequence: flush, local allowances, DNS, IPv6 off, tunnel,
/// VPN server and subnet exceptions per interface, loopback, default DROP.
pub fn armed_plan(
    interfaces: &[NetworkInterface],
    server_ips: &[Ipv4Addr],
    policy: &ArmPolicy,
) -> Vec<FirewallOp> {
    let tun = policy.tunnel_pattern.as_str();
    let mut ops = vec![FirewallOp::Flush(Chain::Output), FirewallOp::Flush(Chain::Input)];
    ops.extend(local_access_rules(interfaces, policy));

    for dns in &policy.dns_servers {
        for iface in [LOOPBACK, tun] {
            ops.push(FirewallOp::Append(
                Rule::new(Chain::Output, Target::Accept)
                    .out_iface(iface)
                    .protocol(Transport::Udp)
                    .destination(dns.to_string())
                    .dport(PortSpec::Single(53)),
            ));
        }
    }
    ops.push(FirewallOp::DisableIpv6(true));

    ops.push(FirewallOp::Append(
        Rule::new(Chain::Output, Target::Accept)
            .out_iface(tun)
            .protocol(Transport::All)
            .destination("0.0.0.0/0"),
    ));
    ops.push(FirewallOp::Append(
        Rule::new(Chain::Input, Target::Accept).established().in_iface(tun),
    ));

    for iface in physical_interfaces(interfaces, tun) {
        for ip in server_ips {
            ops.push(FirewallOp::Append(
                Rule::new(Chain::Output, Target::Accept)
                    .out_iface(&iface.name)
                    .destination(ip.to_string()),
            ));
            ops.push(FirewallOp::Append(
                Rule::new(Chain::Input, Target::Accept)
                    .established()
                    .in_iface(&iface.name)
                    .source(ip.to_string()),
            ));
        }
        if let Some(addr) = iface.ipv4 {
            ops.push(FirewallOp::Append(
                Rule::new(Chain::Output, Target::Accept)
                    .out_iface(&iface.name)
                    .destination(addr.subnet()),
            ));
            ops.push(FirewallOp::Append(
                Rule::new(Chain::Input, Target::Accept)
                    .established()
                    .in_iface(&iface.name)
                    .source(addr.subnet()),
            ));
        }
    }

    ops.extend([
        FirewallOp::Append(Rule::new(Chain::Input, Target::Accept).in_iface(LOOPBACK)),
        FirewallOp::Append(Rule::new(Chain::Output, Target::Accept).out_iface(LOOPBACK)),
        FirewallOp::Append(Rule::new(Chain::Input, Target::Drop).source(LOOPBACK_NET)),
        FirewallOp::Policy(Chain::Output, Target::Drop),
        FirewallOp::Policy(Chain::Input, Target::Drop),
    ]);
    ops
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::firewall::allowed_ports::{AllowedPort, PortProtocol};
    use crate::model::InterfaceAddress;

    pub(crate) fn host_interfaces() -> Vec<NetworkInterface> {
        vec![
            NetworkInterface {
                name: "lo".into(),
                flags: vec!["LOOPBACK".into(), "UP".into()],
                ipv4: Some(InterfaceAddress::new(Ipv4Addr::LOCALHOST, 8)),
            },
            NetworkInterface {
                name: "eth0".into(),
                flags: vec!["BROADCAST".into(), "UP".into()],
                ipv4: Some(InterfaceAddress::new(Ipv4Addr::new(192, 168, 1, 57), 24)),
            },
            NetworkInterface {
                name: "wlan0".into(),
                flags: vec!["BROADCAST".into()],
                ipv4: None,
            },
            NetworkInterface {
                name: "tun0".into(),
                flags: vec!["POINTOPOINT".into(), "UP".into()],
                ipv4: Some(InterfaceAddress::new(Ipv4Addr::new(10, 8, 0, 2), 24)),
            },
        ]
    }

    fn rendered(ops: &[FirewallOp]) -> Vec<String> {
        ops.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn rule_rendering() {
        let rule = Rule::new(Chain::Input, Target::Accept)
            .established()
            .in_iface("eth0")
            .source("192.0.2.1");
        assert_eq!(
            FirewallOp::Append(rule).to_string(),
            "iptables -A INPUT -m conntrack --ctstate ESTABLISHED,RELATED -i eth0 -s 192.0.2.1 -j ACCEPT"
        );

        let range = Rule::new(Chain::Input, Target::Accept)
            .protocol(Transport::Udp)
            .dport(PortSpec::Range(6000, 6010));
        assert_eq!(
            range.match_args().join(" "),
            "-p udp -m multiport --dports 6000:6010 -j ACCEPT"
        );
        assert_eq!(FirewallOp::DisableIpv6(true).to_string(), "sysctl -w net.ipv6.conf.all.disable_ipv6=1");
    }

    #[test]
    fn cleared_plan_order() {
        assert_eq!(
            rendered(&cleared_plan()),
            vec![
                "iptables -F OUTPUT",
                "iptables -P OUTPUT ACCEPT",
                "iptables -F INPUT",
                "iptables -A INPUT -i lo -j ACCEPT",
                "iptables -A OUTPUT -o lo -j ACCEPT",
                "iptables -A INPUT -m conntrack --ctstate ESTABLISHED,RELATED -j ACCEPT",
                "iptables -A INPUT -p icmp --icmp-type any -j ACCEPT",
                "iptables -A INPUT -s 127.0.0.0/8 -j DROP",
                "iptables -P INPUT DROP",
                "sysctl -w net.ipv6.conf.all.disable_ipv6=0",
            ]
        );
    }

    #[test]
    fn armed_plan_order() {
        let policy = ArmPolicy::default();
        let plan = armed_plan(&host_interfaces(), &[Ipv4Addr::new(198, 51, 100, 7)], &policy);

        assert_eq!(
            rendered(&plan),
            vec![
                "iptables -F OUTPUT",
                "iptables -F INPUT",
                "iptables -A OUTPUT -o lo -p udp -d 103.86.96.100 --dport 53 -j ACCEPT",
                "iptables -A OUTPUT -o tun+ -p udp -d 103.86.96.100 --dport 53 -j ACCEPT",
                "iptables -A OUTPUT -o lo -p udp -d 103.86.99.100 --dport 53 -j ACCEPT",
                "iptables -A OUTPUT -o tun+ -p udp -d 103.86.99.100 --dport 53 -j ACCEPT",
                "sysctl -w net.ipv6.conf.all.disable_ipv6=1",
                "iptables -A OUTPUT -o tun+ -p all -d 0.0.0.0/0 -j ACCEPT",
                "iptables -A INPUT -m conntrack --ctstate ESTABLISHED,RELATED -i tun+ -j ACCEPT",
                "iptables -A OUTPUT -o eth0 -d 198.51.100.7 -j ACCEPT",
                "iptables -A INPUT -m conntrack --ctstate ESTABLISHED,RELATED -i eth0 -s 198.51.100.7 -j ACCEPT",
                "iptables -A OUTPUT -o eth0 -d 192.168.1.0/24 -j ACCEPT",
                "iptables -A INPUT -m conntrack --ctstate ESTABLISHED,RELATED -i eth0 -s 192.168.1.0/24 -j ACCEPT",
                "iptables -A INPUT -i lo -j ACCEPT",
                "iptables -A OUTPUT -o lo -j ACCEPT",
                "iptables -A INPUT -s 127.0.0.0/8 -j DROP",
                "iptables -P OUTPUT DROP",
                "iptables -P INPUT DROP",
            ]
        );
    }

    #[test]
    fn local_allowances_precede_dns_rules() {
        let policy = ArmPolicy {
            allow_locally: true,
            allowed_ports: vec![AllowedPort::tcp(22)],
            ..ArmPolicy::default()
        };
        let plan = rendered(&armed_plan(&host_interfaces(), &[], &policy));

        assert_eq!(plan[2], "iptables -A INPUT -i eth0 -p tcp -s 192.168.1.0/24 --dport 22 -j ACCEPT");
        assert_eq!(plan[3], "iptables -A INPUT -i eth0 -s 192.168.1.0/24 -j ACCEPT");
        assert!(plan[4].contains("--dport 53"));
    }

    #[test]
    fn allowed_port_permutations() {
        let allowed = AllowedPort {
            port: PortSpec::Range(8000, 8080),
            protocol: PortProtocol::Both,
            internal: false,
            allowed_ip_ranges: vec!["10.0.0.0/8".into()],
        };
        let policy = ArmPolicy {
            allowed_ports: vec![allowed],
            ..ArmPolicy::default()
        };

        assert_eq!(
            rendered(&local_access_rules(&host_interfaces(), &policy)),
            vec![
                "iptables -A INPUT -i eth0 -p tcp -s 10.0.0.0/8 -m multiport --dports 8000:8080 -j ACCEPT",
                "iptables -A INPUT -i eth0 -p udp -s 10.0.0.0/8 -m multiport --dports 8000:8080 -j ACCEPT",
            ]
        );
    }

    #[test]
    fn loopback_unaddressed_and_tunnel_interfaces_are_skipped() {
        let interfaces = host_interfaces();
        let names: Vec<_> = physical_interfaces(&interfaces, "tun+")
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["eth0"]);
    }

    #[test]
    fn down_interfaces_get_no_rules() {
        let mut interfaces = host_interfaces();
        interfaces.push(NetworkInterface {
            name: "eth1".into(),
            flags: vec!["BROADCAST".into(), "MULTICAST".into()],
            ipv4: Some(InterfaceAddress::new(Ipv4Addr::new(172, 16, 0, 9), 16)),
        });

        let names: Vec<_> = physical_interfaces(&interfaces, "tun+")
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["eth0"]);

        let plan = rendered(&armed_plan(
            &interfaces,
            &[Ipv4Addr::new(198, 51, 100, 1)],
            &ArmPolicy::default(),
        ));
        assert!(plan.iter().all(|line| !line.contains("eth1")));
    }
}
