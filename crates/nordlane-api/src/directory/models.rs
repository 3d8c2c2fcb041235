// Server directory response types
//
// The directory returns a bare JSON array. Only the fields the selection
// pipeline needs are modelled; unknown fields are ignored. Optional blocks
// use `#[serde(default)]` because older records omit them.

use serde::{Deserialize, Serialize};

/// One server entry from `GET /server`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Fully qualified host, e.g. `au10.nordvpn.com`.
    pub domain: String,
    /// Utilization in percent.
    pub load: u8,
    /// Human-readable country name, e.g. `Australia`.
    pub country: String,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub features: Features,
    pub location: Location,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Category tag, e.g. `{"name": "P2P"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
}

/// Per-protocol capability flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub openvpn_udp: bool,
    #[serde(default)]
    pub openvpn_tcp: bool,
}

/// Server coordinates. The directory spells longitude `long`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    #[serde(rename = "long")]
    pub lon: f64,
}
