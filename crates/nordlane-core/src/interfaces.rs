// ── Network interface discovery ──
//
// Reads the one-line-per-record output of `ip -o link show` and
// `ip -o -4 addr show` into `NetworkInterface` values.

use std::net::Ipv4Addr;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{InterfaceAddress, NetworkInterface};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterfaceParseError {
    #[error("line {line}: expected '<index>: <name>: <FLAGS>'")]
    MalformedLink { line: usize },
    #[error("line {line}: expected '<index>: <name> inet <address>/<prefix>'")]
    MalformedAddress { line: usize },
}

/// Parse `ip -o link show`. Blank lines are skipped.
pub fn parse_links(output: &str) -> Result<Vec<NetworkInterface>, InterfaceParseError> {
    let mut interfaces = Vec::new();
    for (index, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || InterfaceParseError::MalformedLink { line: index + 1 };

        let mut parts = line.splitn(3, ": ");
        let _ordinal = parts.next().ok_or_else(malformed)?;
        let name = parts.next().ok_or_else(malformed)?;
        let rest = parts.next().ok_or_else(malformed)?;

        // Veth and vlan links print as `eth0@if5`.
        let name = name.split('@').next().unwrap_or(name).trim();
        let flags = rest
            .strip_prefix('<')
            .and_then(|r| r.split_once('>'))
            .map(|(flags, _)| flags)
            .ok_or_else(malformed)?;

        if name.is_empty() {
            return Err(malformed());
        }
        interfaces.push(NetworkInterface {
            name: name.to_owned(),
            flags: flags
                .split(',')
                .filter(|f| !f.is_empty())
                .map(str::to_owned)
                .collect(),
            ipv4: None,
        });
    }
    Ok(interfaces)
}

/// Parse `ip -o -4 addr show` into `(interface, address)` pairs.
pub fn parse_addresses(
    output: &str,
) -> Result<Vec<(String, InterfaceAddress)>, InterfaceParseError> {
    let mut addresses = Vec::new();
    for (index, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || InterfaceParseError::MalformedAddress { line: index + 1 };

        let mut fields = line.split_whitespace();
        let _ordinal = fields.next().ok_or_else(malformed)?;
        let name = fields.next().ok_or_else(malformed)?;
        if fields.next() != Some("inet") {
            return Err(malformed());
        }
        let cidr = fields.next().ok_or_else(malformed)?;
        let (addr, prefix) = cidr.split_once('/').unwrap_or((cidr, "32"));
        let address: Ipv4Addr = addr.parse().map_err(|_| malformed())?;
        let prefix: u8 = prefix.parse().map_err(|_| malformed())?;

        addresses.push((name.to_owned(), InterfaceAddress::new(address, prefix)));
    }
    Ok(addresses)
}

/// Attach each interface's first IPv4 address.
pub fn merge(
    mut interfaces: Vec<NetworkInterface>,
    addresses: &[(String, InterfaceAddress)],
) -> Vec<NetworkInterface> {
    for iface in &mut interfaces {
        iface.ipv4 = addresses
            .iter()
            .find(|(name, _)| *name == iface.name)
            .map(|(_, addr)| *addr);
    }
    interfaces
}

async fn ip(args: &[&str]) -> Result<String, CoreError> {
    let output = Command::new("ip")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    if !output.status.success() {
        return Err(CoreError::Firewall {
            message: format!(
                "'ip {}' failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// List the host's interfaces with their IPv4 addresses.
pub async fn discover() -> Result<Vec<NetworkInterface>, CoreError> {
    let invalid = |e: InterfaceParseError| CoreError::Firewall {
        message: format!("unexpected interface listing: {e}"),
    };
    let links = parse_links(&ip(&["-o", "link", "show"]).await?).map_err(invalid)?;
    let addresses = parse_addresses(&ip(&["-o", "-4", "addr", "show"]).await?).map_err(invalid)?;
    let interfaces = merge(links, &addresses);
    debug!(count = interfaces.len(), "discovered interfaces");
    Ok(interfaces)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const LINKS: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000\\    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
2: eth0@if7: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP mode DEFAULT group default qlen 1000\\    link/ether 02:42:ac:11:00:02 brd ff:ff:ff:ff:ff:ff link-netnsid 0
3: wlan0: <NO-CARRIER,BROADCAST,MULTICAST,UP> mtu 1500 qdisc noqueue state DOWN mode DORMANT group default qlen 1000\\    link/ether 3c:a9:f4:00:00:01 brd ff:ff:ff:ff:ff:ff
4: tun0: <POINTOPOINT,MULTICAST,NOARP,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UNKNOWN mode DEFAULT group default qlen 100\\    link/none
";

    const ADDRS: &str = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: eth0    inet 192.168.1.57/24 brd 192.168.1.255 scope global dynamic eth0\\       valid_lft 86000sec preferred_lft 86000sec
2: eth0    inet 192.168.1.99/24 brd 192.168.1.255 scope global secondary eth0\\       valid_lft forever preferred_lft forever
4: tun0    inet 10.8.0.2/24 brd 10.8.0.255 scope global tun0\\       valid_lft forever preferred_lft forever
";

    #[test]
    fn links_parse_names_and_flags() {
        let links = parse_links(LINKS).unwrap();
        let names: Vec<_> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["lo", "eth0", "wlan0", "tun0"]);
        assert!(links[0].is_loopback());
        assert_eq!(links[2].flags[0], "NO-CARRIER");
    }

    #[test]
    fn first_address_wins() {
        let interfaces = merge(parse_links(LINKS).unwrap(), &parse_addresses(ADDRS).unwrap());

        assert_eq!(
            interfaces[1].ipv4,
            Some(InterfaceAddress::new(Ipv4Addr::new(192, 168, 1, 57), 24))
        );
        assert_eq!(interfaces[2].ipv4, None);
        assert_eq!(interfaces[3].ipv4.unwrap().subnet(), "10.8.0.0/24");
    }

    #[test]
    fn malformed_lines_are_reported() {
        assert_eq!(
            parse_links("garbage\n").unwrap_err(),
            InterfaceParseError::MalformedLink { line: 1 }
        );
        assert_eq!(
            parse_addresses("\n2: eth0 inet6 fe80::1/64 scope link\n").unwrap_err(),
            InterfaceParseError::MalformedAddress { line: 2 }
        );
    }
}
