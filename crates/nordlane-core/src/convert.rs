// ── Directory record → domain model conversion ──
//
// Bridges `nordlane_api::directory::ServerRecord` into `Endpoint`. Records
// that cannot yield an identifier are dropped with a debug log rather than
// failing the whole fetch.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use nordlane_api::directory::ServerRecord;
use tracing::debug;

use crate::model::{Category, Coordinates, Endpoint, ProtocolSupport};
use crate::streaming;

/// Convert one directory record. Returns `None` for unusable records.
pub fn endpoint_from_record(record: &ServerRecord) -> Option<Endpoint> {
    let host = record.domain.trim().to_ascii_lowercase();
    let identifier = host.split('.').next().unwrap_or_default().to_owned();
    let country_code: String = identifier.chars().take(2).collect();

    if identifier.is_empty() || country_code.len() < 2 {
        debug!(domain = %record.domain, "skipping record without identifier");
        return None;
    }

    let mut categories: BTreeSet<Category> = record
        .categories
        .iter()
        .filter_map(|c| {
            let mapped = Category::from_directory_name(&c.name);
            if mapped.is_none() {
                debug!(server = %identifier, category = %c.name, "unknown category");
            }
            mapped
        })
        .collect();
    if streaming::is_streaming(&identifier) {
        categories.insert(Category::Streaming);
    }

    let ip_address = record
        .ip_address
        .as_deref()
        .and_then(|ip| ip.parse::<Ipv4Addr>().ok());

    Some(Endpoint {
        identifier,
        host,
        country_code,
        country_name: record.country.clone(),
        area_names: Vec::new(),
        coordinates: Coordinates::new(record.location.lat, record.location.lon),
        load_percent: record.load.min(100),
        categories,
        protocol_support: ProtocolSupport {
            udp: record.features.openvpn_udp,
            tcp: record.features.openvpn_tcp,
        },
        ip_address,
    })
}

/// Convert a full directory snapshot, dropping unusable records.
pub fn endpoints_from_records(records: &[ServerRecord]) -> Vec<Endpoint> {
    records.iter().filter_map(endpoint_from_record).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nordlane_api::directory::{Category as ApiCategory, Features, Location};
    use pretty_assertions::assert_eq;

    fn record(domain: &str, categories: &[&str]) -> ServerRecord {
        ServerRecord {
            domain: domain.into(),
            load: 25,
            country: "United States".into(),
            categories: categories
                .iter()
                .map(|n| ApiCategory { name: (*n).into() })
                .collect(),
            features: Features {
                openvpn_udp: true,
                openvpn_tcp: false,
            },
            location: Location {
                lat: 40.7,
                lon: -74.0,
            },
            ip_address: Some("198.51.100.7".into()),
            name: None,
        }
    }

    #[test]
    fn converts_basic_fields() {
        let endpoint =
            endpoint_from_record(&record("US1602.nordvpn.com", &["Standard VPN servers", "P2P"]))
                .unwrap();

        assert_eq!(endpoint.identifier, "us1602");
        assert_eq!(endpoint.host, "us1602.nordvpn.com");
        assert_eq!(endpoint.country_code, "us");
        assert_eq!(endpoint.load_percent, 25);
        assert!(endpoint.protocol_support.udp);
        assert!(!endpoint.protocol_support.tcp);
        assert_eq!(endpoint.ip_address, Some(Ipv4Addr::new(198, 51, 100, 7)));
        assert_eq!(
            endpoint.categories.iter().copied().collect::<Vec<_>>(),
            vec![Category::Standard, Category::P2p, Category::Streaming]
        );
    }

    #[test]
    fn unknown_categories_are_ignored() {
        let endpoint = endpoint_from_record(&record("us1.nordvpn.com", &["Anti DDoS"])).unwrap();
        assert!(endpoint.categories.is_empty());
    }

    #[test]
    fn records_without_identifier_are_dropped() {
        let records = vec![record("", &[]), record("x", &[]), record("ca5.nordvpn.com", &[])];
        let endpoints = endpoints_from_records(&records);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].identifier, "ca5");
    }

    #[test]
    fn bad_ip_is_none() {
        let mut rec = record("se1.nordvpn.com", &[]);
        rec.ip_address = Some("not-an-ip".into());
        assert_eq!(endpoint_from_record(&rec).unwrap().ip_address, None);
    }
}
