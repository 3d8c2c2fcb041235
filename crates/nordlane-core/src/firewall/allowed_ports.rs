// ── Local-network port allowances ──
//
// JSON format, one object per allowance:
//
//   [{ "port": 22 },
//    { "port": "6881-6889", "protocol": "both", "internal": false,
//      "allowed_ip_range": ["10.0.0.0/8", "172.16.0.0/12"] }]
//
// `protocol` defaults to tcp, `internal` (allow the interface's own subnet)
// defaults to true. Every problem in a document is reported at once.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rules::{PortSpec, Transport};
use crate::error::CoreError;
use crate::model::NetworkInterface;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
    Both,
}

impl PortProtocol {
    pub fn transports(self) -> Vec<Transport> {
        match self {
            Self::Tcp => vec![Transport::Tcp],
            Self::Udp => vec![Transport::Udp],
            Self::Both => vec![Transport::Tcp, Transport::Udp],
        }
    }
}

/// One validated allowance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedPort {
    pub port: PortSpec,
    pub protocol: PortProtocol,
    /// Include the receiving interface's own subnet as a source.
    pub internal: bool,
    pub allowed_ip_ranges: Vec<String>,
}

impl AllowedPort {
    /// TCP from the local subnet, the `--allow <port>` shorthand.
    pub fn tcp(port: u16) -> Self {
        Self {
            port: PortSpec::Single(port),
            protocol: PortProtocol::Tcp,
            internal: true,
            allowed_ip_ranges: Vec::new(),
        }
    }

    /// Source ranges for a rule on `iface`. Empty means any source.
    pub fn sources(&self, iface: &NetworkInterface) -> Vec<String> {
        let mut sources = Vec::new();
        if self.internal {
            if let Some(addr) = iface.ipv4 {
                sources.push(addr.subnet());
            }
        }
        sources.extend(self.allowed_ip_ranges.iter().cloned());
        sources
    }
}

/// Parse and validate an allowed-ports JSON document.
pub fn parse(json: &str) -> Result<Vec<AllowedPort>, CoreError> {
    let document: Value = serde_json::from_str(json).map_err(|e| CoreError::AllowedPorts {
        problems: vec![format!("invalid JSON at line {} column {}: {e}", e.line(), e.column())],
    })?;
    validate(&document)
}

/// Read, parse, and validate an allowed-ports file.
pub fn load(path: &Path) -> Result<Vec<AllowedPort>, CoreError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CoreError::AllowedPorts {
        problems: vec![format!("cannot read {}: {e}", path.display())],
    })?;
    parse(&raw)
}

/// Validate an already-decoded document.
pub fn validate(document: &Value) -> Result<Vec<AllowedPort>, CoreError> {
    let Some(entries) = document.as_array() else {
        return Err(CoreError::AllowedPorts {
            problems: vec!["root: expected an array of port objects".into()],
        });
    };

    let mut problems = Vec::new();
    let mut allowed = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let Some(object) = entry.as_object() else {
            problems.push(format!("root.{index}: expected an object"));
            continue;
        };

        let mut problem = |field: &str, message: String| {
            problems.push(format!("root.{index}.{field}: {message}"));
        };

        let port = match object.get("port") {
            None => {
                problem("port", "is required".into());
                None
            }
            Some(value) => parse_port(value).map_err(|m| problem("port", m)).ok(),
        };

        let protocol = match object.get("protocol") {
            None => Some(PortProtocol::default()),
            Some(Value::String(s)) => match s.as_str() {
                "tcp" => Some(PortProtocol::Tcp),
                "udp" => Some(PortProtocol::Udp),
                "both" => Some(PortProtocol::Both),
                other => {
                    problem("protocol", format!("'{other}' is not one of tcp, udp, both"));
                    None
                }
            },
            Some(other) => {
                problem("protocol", format!("expected a string, got {other}"));
                None
            }
        };

        let internal = match object.get("internal") {
            None => Some(true),
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                problem("internal", format!("expected a boolean, got {other}"));
                None
            }
        };

        let ranges = match object.get("allowed_ip_range") {
            None | Some(Value::Null) => Some(Vec::new()),
            Some(value) => parse_ranges(value)
                .map_err(|m| problem("allowed_ip_range", m))
                .ok(),
        };

        if let (Some(port), Some(protocol), Some(internal), Some(allowed_ip_ranges)) =
            (port, protocol, internal, ranges)
        {
            allowed.push(AllowedPort {
                port,
                protocol,
                internal,
                allowed_ip_ranges,
            });
        }
    }

    if problems.is_empty() {
        Ok(allowed)
    } else {
        Err(CoreError::AllowedPorts { problems })
    }
}

fn parse_port(value: &Value) -> Result<PortSpec, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(PortSpec::Single)
            .ok_or_else(|| format!("{n} is not a port between 0 and 65535")),
        Value::String(s) => parse_port_str(s),
        other => Err(format!("expected an integer or \"from-to\" string, got {other}")),
    }
}

fn parse_port_str(s: &str) -> Result<PortSpec, String> {
    let number = |part: &str| -> Result<u16, String> {
        if part.is_empty() || part.len() > 5 || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("'{s}' is not a port or port range"));
        }
        part.parse::<u16>()
            .map_err(|_| format!("'{part}' is not a port between 0 and 65535"))
    };

    match s.split_once('-') {
        None => number(s).map(PortSpec::Single),
        Some((lo, hi)) => {
            let (lo, hi) = (number(lo)?, number(hi)?);
            if lo > hi {
                return Err(format!("range '{s}' is reversed"));
            }
            Ok(PortSpec::Range(lo, hi))
        }
    }
}

fn parse_ranges(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::String(s) => Ok(vec![parse_block(s)?]),
        Value::Array(items) => {
            let mut blocks: Vec<String> = Vec::with_capacity(items.len());
            for item in items {
                let Value::String(s) = item else {
                    return Err(format!("expected CIDR strings, got {item}"));
                };
                let block = parse_block(s)?;
                if blocks.contains(&block) {
                    return Err(format!("'{block}' is listed twice"));
                }
                blocks.push(block);
            }
            Ok(blocks)
        }
        other => Err(format!("expected a CIDR string or list, got {other}")),
    }
}

/// `a.b.c.d` or `a.b.c.d/n`, returned as written.
fn parse_block(s: &str) -> Result<String, String> {
    let (addr, prefix) = match s.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (s, None),
    };
    let bad = || format!("'{s}' is not an IPv4 address or CIDR block");
    addr.parse::<Ipv4Addr>().map_err(|_| bad())?;
    if let Some(prefix) = prefix {
        let len: u8 = prefix.parse().map_err(|_| bad())?;
        if len > 32 {
            return Err(bad());
        }
    }
    Ok(s.to_owned())
}
