// ── Connection profiles ──
//
// OpenVPN profiles live at `<dir>/ovpn_<proto>/<id>.<suffix>.<proto>.ovpn`.
// Arming needs the server addresses from their `remote` lines.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use tracing::debug;

use crate::error::CoreError;
use crate::model::Protocol;

/// Locates profiles on disk.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
    host_suffix: String,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>, host_suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            host_suffix: host_suffix.into(),
        }
    }

    pub fn path(&self, identifier: &str, protocol: Protocol) -> PathBuf {
        self.dir.join(format!("ovpn_{protocol}")).join(format!(
            "{identifier}.{}.{protocol}.ovpn",
            self.host_suffix
        ))
    }

    /// Load and parse the profile for `identifier`.
    pub fn load(&self, identifier: &str, protocol: Protocol) -> Result<ConnectionProfile, CoreError> {
        let path = self.path(identifier, protocol);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::ProfileNotFound {
                    server: identifier.to_owned(),
                    path,
                });
            }
            Err(e) => return Err(e.into()),
        };
        let profile = ConnectionProfile::parse(path, &raw)?;
        debug!(server = identifier, remotes = profile.remotes.len(), "loaded profile");
        Ok(profile)
    }
}

/// One `remote <host> [port] [proto]` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub address: Ipv4Addr,
    pub port: Option<u16>,
}

/// A parsed OpenVPN profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub path: PathBuf,
    pub remotes: Vec<Remote>,
}

impl ConnectionProfile {
    /// Collect every `remote` line with a literal IPv4 address. Hostnames
    /// cannot be pinned in the firewall and are skipped.
    pub fn parse(path: PathBuf, contents: &str) -> Result<Self, CoreError> {
        let mut remotes = Vec::new();
        for line in contents.lines() {
            let mut words = line.split_whitespace();
            if words.next() != Some("remote") {
                continue;
            }
            let Some(address) = words.next().and_then(|h| h.parse().ok()) else {
                continue;
            };
            let port = words.next().and_then(|p| p.parse().ok());
            remotes.push(Remote { address, port });
        }

        if remotes.is_empty() {
            return Err(CoreError::ProfileInvalid {
                path,
                reason: "no 'remote <ipv4> <port>' line".into(),
            });
        }
        Ok(Self { path, remotes })
    }

    /// Distinct server addresses, in file order.
    pub fn server_ips(&self) -> Vec<Ipv4Addr> {
        let mut ips: Vec<Ipv4Addr> = Vec::with_capacity(self.remotes.len());
        for remote in &self.remotes {
            if !ips.contains(&remote.address) {
                ips.push(remote.address);
            }
        }
        ips
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const PROFILE: &str = "\
client
dev tun
proto udp
remote 185.93.3.10 1194
remote 185.93.3.10 1194
remote-random
resolv-retry infinite
";

    #[test]
    fn path_layout() {
        let store = ProfileStore::new("/etc/nordlane/profiles", "nordvpn.com");
        assert_eq!(
            store.path("au10", Protocol::Tcp),
            PathBuf::from("/etc/nordlane/profiles/ovpn_tcp/au10.nordvpn.com.tcp.ovpn")
        );
    }

    #[test]
    fn remotes_are_parsed() {
        let profile = ConnectionProfile::parse("x.ovpn".into(), PROFILE).unwrap();
        assert_eq!(profile.remotes.len(), 2);
        assert_eq!(profile.remotes[0].port, Some(1194));
        assert_eq!(profile.server_ips(), vec![Ipv4Addr::new(185, 93, 3, 10)]);
    }

    #[test]
    fn profile_without_remote_is_invalid() {
        let err = ConnectionProfile::parse("x.ovpn".into(), "client\nremote vpn.example.com 443\n").unwrap_err();
        assert!(matches!(err, CoreError::ProfileInvalid { .. }));
    }

    #[test]
    fn load_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path(), "nordvpn.com");
        std::fs::create_dir_all(dir.path().join("ovpn_udp")).unwrap();
        std::fs::write(store.path("us4030", Protocol::Udp), PROFILE).unwrap();

        let profile = store.load("us4030", Protocol::Udp).unwrap();
        assert_eq!(profile.server_ips().len(), 1);

        let err = store.load("us1", Protocol::Udp).unwrap_err();
        assert!(matches!(err, CoreError::ProfileNotFound { .. }));
    }
}
