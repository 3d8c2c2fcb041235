// ── Endpoint domain types ──

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Capability tag. Selection treats these as mutually exclusive selectors:
/// one request asks for exactly one category.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Category {
    #[default]
    Standard,
    P2p,
    Dedicated,
    Double,
    Onion,
    Obfuscated,
    /// Derived from the streaming range table, not sent by the directory.
    Streaming,
}

impl Category {
    /// Category name as the directory spells it.
    pub fn directory_name(self) -> Option<&'static str> {
        match self {
            Self::Standard => Some("Standard VPN servers"),
            Self::P2p => Some("P2P"),
            Self::Dedicated => Some("Dedicated IP"),
            Self::Double => Some("Double VPN"),
            Self::Onion => Some("Onion Over VPN"),
            Self::Obfuscated => Some("Obfuscated Servers"),
            Self::Streaming => None,
        }
    }

    /// Inverse of [`Category::directory_name`]. Unknown names yield `None`.
    pub fn from_directory_name(name: &str) -> Option<Self> {
        match name {
            "Standard VPN servers" => Some(Self::Standard),
            "P2P" => Some(Self::P2p),
            "Dedicated IP" => Some(Self::Dedicated),
            "Double VPN" => Some(Self::Double),
            "Onion Over VPN" => Some(Self::Onion),
            "Obfuscated Servers" => Some(Self::Obfuscated),
            _ => None,
        }
    }
}

/// Tunnel transport.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

impl Protocol {
    /// Port the provider's OpenVPN profiles use for this transport.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Udp => 1194,
            Self::Tcp => 443,
        }
    }
}

/// Which tunnel transports an endpoint accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSupport {
    pub udp: bool,
    pub tcp: bool,
}

impl ProtocolSupport {
    pub fn supports(self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Udp => self.udp,
            Protocol::Tcp => self.tcp,
        }
    }
}

/// Latitude/longitude pair.
///
/// Equality and hashing compare the exact bit patterns, so two values are
/// the same key only if the directory reported identical numbers. This is
/// what area caching and location filtering need.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    fn bits(self) -> (u64, u64) {
        (self.lat.to_bits(), self.lon.to_bits())
    }
}

impl PartialEq for Coordinates {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Coordinates {}

impl Hash for Coordinates {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// A remote VPN server as reported by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Short code, e.g. `au10`.
    pub identifier: String,
    /// Fully qualified host, e.g. `au10.nordvpn.com`.
    pub host: String,
    /// Lowercase two-letter code taken from the identifier.
    pub country_code: String,
    pub country_name: String,
    /// Locality names, empty until area resolution fills them in.
    #[serde(default)]
    pub area_names: Vec<String>,
    pub coordinates: Coordinates,
    pub load_percent: u8,
    pub categories: BTreeSet<Category>,
    pub protocol_support: ProtocolSupport,
    pub ip_address: Option<Ipv4Addr>,
}

impl Endpoint {
    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    /// Copy of this endpoint carrying resolved locality names.
    pub fn with_area_names(&self, names: Vec<String>) -> Self {
        Self {
            area_names: names,
            ..self.clone()
        }
    }

    /// Projection handed from the protocol filter to the load ranker.
    pub fn ranked(&self) -> RankedServer {
        RankedServer {
            identifier: self.identifier.clone(),
            load_percent: self.load_percent,
        }
    }
}

/// `(identifier, load)` pair flowing through load ranking and probing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankedServer {
    pub identifier: String,
    pub load_percent: u8,
}

impl RankedServer {
    pub fn new(identifier: impl Into<String>, load_percent: u8) -> Self {
        Self {
            identifier: identifier.into(),
            load_percent,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!(Category::from_str("P2P").unwrap(), Category::P2p);
        assert_eq!(Category::from_str("onion").unwrap(), Category::Onion);
        assert!(Category::from_str("netflix").is_err());
    }

    #[test]
    fn directory_names_round_trip() {
        for name in ["Standard VPN servers", "P2P", "Dedicated IP", "Double VPN"] {
            let category = Category::from_directory_name(name).unwrap();
            assert_eq!(category.directory_name(), Some(name));
        }
        assert_eq!(Category::Streaming.directory_name(), None);
        assert_eq!(Category::from_directory_name("Anti DDoS"), None);
    }

    #[test]
    fn coordinates_compare_exactly() {
        let a = Coordinates::new(52.5, 13.4);
        let b = Coordinates::new(52.5, 13.4);
        let c = Coordinates::new(52.500_000_1, 13.4);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn protocol_ports() {
        assert_eq!(Protocol::Udp.default_port(), 1194);
        assert_eq!(Protocol::Tcp.default_port(), 443);
        assert_eq!(Protocol::Tcp.to_string(), "tcp");
    }
}
