// ── Capability filter ──
//
// Narrows a directory snapshot in a fixed stage order:
// category, then country, then area or exact location, then protocol.
// Area lookups run against the country-filtered set so the geocoder sees
// as few coordinates as possible.

use tracing::debug;

use crate::area::{AreaResolver, GeocodeSpacing, Geocoder, area_matches};
use crate::criteria::{CountryScope, SelectionCriteria};
use crate::model::{Category, Coordinates, Endpoint, Protocol, RankedServer};

/// Keep endpoints tagged with `category`.
pub fn by_category(endpoints: Vec<Endpoint>, category: Category) -> Vec<Endpoint> {
    endpoints
        .into_iter()
        .filter(|e| e.has_category(category))
        .collect()
}

/// Keep endpoints in `scope`; [`CountryScope::All`] keeps everything.
pub fn by_country(endpoints: Vec<Endpoint>, scope: &CountryScope) -> Vec<Endpoint> {
    endpoints
        .into_iter()
        .filter(|e| scope.matches(&e.country_code))
        .collect()
}

/// Keep endpoints at exactly `location`.
pub fn by_location(endpoints: Vec<Endpoint>, location: Coordinates) -> Vec<Endpoint> {
    endpoints
        .into_iter()
        .filter(|e| e.coordinates == location)
        .collect()
}

/// Resolve areas for `endpoints` and keep those whose names contain `area`.
/// Surviving endpoints carry their resolved names.
pub async fn by_area<G: Geocoder>(
    endpoints: &[Endpoint],
    area: &str,
    resolver: &mut AreaResolver<'_, G>,
) -> Vec<Endpoint> {
    resolver
        .annotate(endpoints)
        .await
        .into_iter()
        .filter(|e| area_matches(&e.area_names, area))
        .collect()
}

/// Keep endpoints accepting `protocol`, projected to `(identifier, load)`.
pub fn by_protocol(endpoints: &[Endpoint], protocol: Protocol) -> Vec<RankedServer> {
    endpoints
        .iter()
        .filter(|e| e.protocol_support.supports(protocol))
        .map(Endpoint::ranked)
        .collect()
}

/// Run every stage up to, but not including, the protocol projection.
pub async fn apply<G: Geocoder>(
    endpoints: Vec<Endpoint>,
    criteria: &SelectionCriteria,
    geocoder: &G,
    spacing: GeocodeSpacing,
) -> Vec<Endpoint> {
    let total = endpoints.len();
    let typed = by_category(endpoints, criteria.category);
    let in_country = by_country(typed, &criteria.country);
    debug!(
        total,
        after_country = in_country.len(),
        category = %criteria.category,
        country = %criteria.country,
        "category and country filters applied"
    );

    if let Some(area) = criteria.area.as_deref() {
        let mut resolver = AreaResolver::new(geocoder, spacing);
        let matched = by_area(&in_country, area, &mut resolver).await;
        debug!(area, lookups = resolver.lookups(), kept = matched.len(), "area filter applied");
        matched
    } else if let Some(location) = criteria.location {
        by_location(in_country, location)
    } else {
        in_country
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::area::tests::FakeGeocoder;
    use crate::model::ProtocolSupport;

    pub(crate) fn endpoint(id: &str, load: u8, categories: &[Category]) -> Endpoint {
        Endpoint {
            identifier: id.into(),
            host: format!("{id}.nordvpn.com"),
            country_code: id.chars().take(2).collect(),
            country_name: String::new(),
            area_names: Vec::new(),
            coordinates: Coordinates::new(0.0, 0.0),
            load_percent: load,
            categories: categories.iter().copied().collect::<BTreeSet<_>>(),
            protocol_support: ProtocolSupport { udp: true, tcp: true },
            ip_address: None,
        }
    }

    fn ids(endpoints: &[Endpoint]) -> Vec<&str> {
        endpoints.iter().map(|e| e.identifier.as_str()).collect()
    }

    #[test]
    fn requested_category_keeps_multi_tagged_only() {
        let endpoints = vec![
            endpoint("au1", 10, &[Category::Standard, Category::P2p]),
            endpoint("au2", 10, &[Category::Standard]),
        ];
        let kept = by_category(endpoints, Category::P2p);
        assert_eq!(ids(&kept), vec!["au1"]);
    }

    #[test]
    fn default_category_keeps_standard() {
        let endpoints = vec![
            endpoint("au1", 10, &[Category::Dedicated]),
            endpoint("au2", 10, &[Category::Standard]),
        ];
        let kept = by_category(endpoints, Category::default());
        assert_eq!(ids(&kept), vec!["au2"]);
    }

    #[test]
    fn country_scope_all_keeps_everything() {
        let endpoints = vec![
            endpoint("au1", 10, &[]),
            endpoint("de1", 10, &[]),
        ];
        assert_eq!(by_country(endpoints.clone(), &CountryScope::All).len(), 2);
        let de = by_country(endpoints, &CountryScope::Code("DE".into()));
        assert_eq!(ids(&de), vec!["de1"]);
    }

    #[test]
    fn location_filter_is_exact() {
        let mut a = endpoint("us1", 10, &[]);
        a.coordinates = Coordinates::new(40.0, -74.0);
        let mut b = endpoint("us2", 10, &[]);
        b.coordinates = Coordinates::new(40.000_001, -74.0);

        let kept = by_location(vec![a, b], Coordinates::new(40.0, -74.0));
        assert_eq!(ids(&kept), vec!["us1"]);
    }

    #[test]
    fn protocol_projection() {
        let mut tcp_only = endpoint("nl1", 33, &[]);
        tcp_only.protocol_support = ProtocolSupport { udp: false, tcp: true };
        let both = endpoint("nl2", 12, &[]);

        let udp = by_protocol(&[tcp_only.clone(), both.clone()], Protocol::Udp);
        assert_eq!(udp, vec![RankedServer::new("nl2", 12)]);

        let tcp = by_protocol(&[tcp_only, both], Protocol::Tcp);
        assert_eq!(tcp.len(), 2);
    }

    #[tokio::test]
    async fn area_filter_resolves_country_set_only() {
        let sydney = Coordinates::new(-33.86, 151.2);
        let perth = Coordinates::new(-31.95, 115.86);
        let berlin = Coordinates::new(52.52, 13.4);

        let mut au1 = endpoint("au1", 10, &[Category::Standard]);
        au1.coordinates = sydney;
        let mut au2 = endpoint("au2", 10, &[Category::Standard]);
        au2.coordinates = perth;
        let mut au3 = endpoint("au3", 10, &[Category::Standard]);
        au3.coordinates = sydney;
        let mut de1 = endpoint("de1", 10, &[Category::Standard]);
        de1.coordinates = berlin;

        let geocoder = FakeGeocoder::with(&[
            (sydney, &["Sydney", "New South Wales"]),
            (perth, &["Perth", "Western Australia"]),
            (berlin, &["Berlin"]),
        ]);
        let criteria = SelectionCriteria {
            country: CountryScope::Code("au".into()),
            area: Some("sydney".into()),
            ..SelectionCriteria::default()
        };

        let kept = apply(vec![au1, au2, au3, de1], &criteria, &geocoder, GeocodeSpacing::NONE).await;

        assert_eq!(ids(&kept), vec!["au1", "au3"]);
        assert_eq!(kept[0].area_names, vec!["Sydney", "New South Wales"]);
        // two unique coordinates in Australia, Berlin never looked up
        assert_eq!(geocoder.call_count(), 2);
    }

    #[tokio::test]
    async fn filter_never_invents_endpoints() {
        let input = vec![
            endpoint("us1", 10, &[Category::Standard]),
            endpoint("us2", 10, &[Category::P2p]),
            endpoint("ca1", 10, &[Category::Standard, Category::Obfuscated]),
        ];
        let geocoder = FakeGeocoder::default();

        for category in [Category::Standard, Category::P2p, Category::Obfuscated] {
            for scope in [CountryScope::All, CountryScope::Code("us".into())] {
                let criteria = SelectionCriteria {
                    country: scope.clone(),
                    category,
                    ..SelectionCriteria::default()
                };
                let kept = apply(input.clone(), &criteria, &geocoder, GeocodeSpacing::NONE).await;
                for e in &kept {
                    assert!(input.contains(e));
                    assert!(e.has_category(category));
                    assert!(scope.matches(&e.country_code));
                }
            }
        }
    }
}
