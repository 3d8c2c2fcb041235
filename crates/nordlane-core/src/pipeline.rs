// ── Selection pipeline ──
//
// Directory → capability filter → load ranking → latency probing →
// selection, strictly in that order. Each stage narrows the previous
// stage's output; the report keeps every intermediate set for display.

use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::area::{AreaResolver, GeocodeSpacing, Geocoder};
use crate::criteria::{CountryScope, SelectionCriteria};
use crate::directory::{self, Directory};
use crate::error::CoreError;
use crate::filter;
use crate::model::{Endpoint, RankedServer};
use crate::probe::{LatencyProber, ProbeRunner};
use crate::rank::rank_by_load;
use crate::select::{Selection, select};

/// Everything one selection run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    /// Endpoints left after category, country and area filtering.
    pub matched: usize,
    /// Load-ranked servers that were probed.
    pub load_ranked: Vec<RankedServer>,
    /// `(identifier, reason)` for servers dropped by probing.
    pub excluded: Vec<(String, String)>,
    pub selection: Selection,
}

/// Owns the collaborators of one selection run.
pub struct SelectionPipeline<D, G, R> {
    directory: D,
    geocoder: G,
    prober: LatencyProber<R>,
    spacing: GeocodeSpacing,
}

impl<D, G, R> SelectionPipeline<D, G, R>
where
    D: Directory,
    G: Geocoder,
    R: ProbeRunner,
{
    pub fn new(directory: D, geocoder: G, prober: LatencyProber<R>) -> Self {
        Self {
            directory,
            geocoder,
            prober,
            spacing: GeocodeSpacing::default(),
        }
    }

    pub fn with_geocode_spacing(mut self, spacing: GeocodeSpacing) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Run the full pipeline and pick a server.
    pub async fn select_server(
        &self,
        criteria: &SelectionCriteria,
        rng: &mut (impl Rng + Send),
        cancel: &CancellationToken,
    ) -> Result<SelectionReport, CoreError> {
        criteria.validate()?;

        let endpoints = self.directory.endpoints().await?;
        let matched = filter::apply(endpoints, criteria, &self.geocoder, self.spacing).await;
        let by_protocol = filter::by_protocol(&matched, criteria.protocol);
        if by_protocol.is_empty() {
            return Err(CoreError::NoServersMatch {
                criteria: criteria.describe(),
            });
        }

        let load_ranked = rank_by_load(
            by_protocol,
            criteria.max_load,
            criteria.load_floor,
            criteria.top_n,
        )
        .map_err(|_| CoreError::NoServersMatch {
            criteria: criteria.describe(),
        })?;
        info!(
            matched = matched.len(),
            ranked = load_ranked.len(),
            "servers ranked by load"
        );

        let probes = self.prober.probe(&load_ranked, cancel).await?;
        let selection = select(&probes.ranked, criteria.top_k, criteria.policy, rng)?;
        info!(
            server = %selection.chosen.identifier(),
            avg_ms = selection.chosen.latency.avg,
            pool = selection.pool.len(),
            "server selected"
        );

        Ok(SelectionReport {
            matched: matched.len(),
            load_ranked,
            excluded: probes.excluded,
            selection,
        })
    }

    /// Filtered endpoints without ranking or probing. With `with_areas`,
    /// endpoints are annotated with their locality names even when the
    /// criteria carry no area.
    pub async fn list_servers(
        &self,
        criteria: &SelectionCriteria,
        with_areas: bool,
    ) -> Result<Vec<Endpoint>, CoreError> {
        criteria.validate()?;
        let endpoints = self.directory.endpoints().await?;
        let matched = filter::apply(endpoints, criteria, &self.geocoder, self.spacing).await;

        if with_areas && criteria.area.is_none() {
            let mut resolver = AreaResolver::new(&self.geocoder, self.spacing);
            return Ok(resolver.annotate(&matched).await);
        }
        Ok(matched)
    }

    /// Unique `(code, name)` pairs across the directory.
    pub async fn countries(&self) -> Result<Vec<(String, String)>, CoreError> {
        let endpoints = self.directory.endpoints().await?;
        Ok(directory::countries(&endpoints))
    }

    /// Accept `all`, a two-letter code, or a full country name.
    pub async fn resolve_country(&self, input: &str) -> Result<CountryScope, CoreError> {
        if let Ok(scope) = input.parse::<CountryScope>() {
            return Ok(scope);
        }
        let endpoints = self.directory.endpoints().await?;
        directory::country_code_for_name(&endpoints, input).map(CountryScope::Code)
    }

    /// Look up one endpoint by identifier.
    pub async fn endpoint(&self, identifier: &str) -> Result<Endpoint, CoreError> {
        let wanted = identifier.trim().to_ascii_lowercase();
        self.directory
            .endpoints()
            .await?
            .into_iter()
            .find(|e| e.identifier == wanted)
            .ok_or(CoreError::UnknownServer { identifier: wanted })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::area::tests::FakeGeocoder;
    use crate::filter::tests::endpoint;
    use crate::model::{Category, Coordinates, ProtocolSupport};
    use crate::probe::tests::ScriptedRunner;

    /// Directory returning a fixed snapshot and counting fetches.
    pub(crate) struct FakeDirectory {
        pub(crate) endpoints: Vec<Endpoint>,
        pub(crate) fail: bool,
        pub(crate) fetches: AtomicUsize,
    }

    impl FakeDirectory {
        pub(crate) fn new(endpoints: Vec<Endpoint>) -> Self {
            Self {
                endpoints,
                fail: false,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl Directory for FakeDirectory {
        async fn endpoints(&self) -> Result<Vec<Endpoint>, CoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CoreError::DirectoryUnavailable {
                    message: "connection refused".into(),
                });
            }
            Ok(self.endpoints.clone())
        }
    }

    fn pipeline(
        endpoints: Vec<Endpoint>,
        runner: ScriptedRunner,
    ) -> SelectionPipeline<FakeDirectory, FakeGeocoder, ScriptedRunner> {
        SelectionPipeline::new(
            FakeDirectory::new(endpoints),
            FakeGeocoder::default(),
            LatencyProber::new(runner, 5, "nordvpn.com").with_stagger(std::time::Duration::ZERO),
        )
        .with_geocode_spacing(GeocodeSpacing::NONE)
    }

    fn au_criteria() -> SelectionCriteria {
        SelectionCriteria {
            country: CountryScope::Code("au".into()),
            ..SelectionCriteria::default()
        }
    }

    #[tokio::test]
    async fn selects_lowest_latency_with_best_policy() {
        let endpoints = vec![
            endpoint("au1", 20, &[Category::Standard]),
            endpoint("au2", 90, &[Category::Standard]),
            endpoint("au3", 3, &[Category::Standard]),
            endpoint("au4", 30, &[Category::Standard]),
            endpoint("de1", 10, &[Category::Standard]),
        ];
        let runner = ScriptedRunner::default()
            .ok("au1.nordvpn.com", 0, 40, 2)
            .ok("au4.nordvpn.com", 0, 15, 2);
        let criteria = SelectionCriteria {
            policy: crate::criteria::SelectionPolicy::Best,
            ..au_criteria()
        };

        let report = pipeline(endpoints, runner)
            .select_server(&criteria, &mut StdRng::seed_from_u64(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.matched, 4);
        assert_eq!(
            report.load_ranked,
            vec![RankedServer::new("au1", 20), RankedServer::new("au4", 30)]
        );
        assert_eq!(report.selection.chosen.identifier(), "au4");
        assert_eq!(report.selection.pool.len(), 2);
    }

    #[tokio::test]
    async fn protocol_mismatch_is_no_match() {
        let mut udp_only = endpoint("au1", 20, &[Category::Standard]);
        udp_only.protocol_support = ProtocolSupport { udp: true, tcp: false };
        let criteria = SelectionCriteria {
            protocol: crate::model::Protocol::Tcp,
            ..au_criteria()
        };

        let err = pipeline(vec![udp_only], ScriptedRunner::default())
            .select_server(&criteria, &mut StdRng::seed_from_u64(0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NoServersMatch { .. }));
    }

    #[tokio::test]
    async fn every_probe_failing_is_no_candidates() {
        let endpoints = vec![endpoint("au1", 20, &[Category::Standard])];
        let runner = ScriptedRunner::default().reply("au1.nordvpn.com", 0, "garbage");

        let err = pipeline(endpoints, runner)
            .select_server(&au_criteria(), &mut StdRng::seed_from_u64(0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NoCandidates));
    }

    #[tokio::test]
    async fn directory_failure_propagates() {
        let mut directory = FakeDirectory::new(Vec::new());
        directory.fail = true;
        let pipeline = SelectionPipeline::new(
            directory,
            FakeGeocoder::default(),
            LatencyProber::new(ScriptedRunner::default(), 5, "nordvpn.com"),
        );

        let err = pipeline
            .select_server(&au_criteria(), &mut StdRng::seed_from_u64(0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.suggests_manual_server());
    }

    #[tokio::test]
    async fn invalid_criteria_fail_before_fetching() {
        let pipeline = pipeline(Vec::new(), ScriptedRunner::default());
        let criteria = SelectionCriteria {
            top_n: 2,
            top_k: 5,
            ..au_criteria()
        };

        let err = pipeline
            .select_server(&criteria, &mut StdRng::seed_from_u64(0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidCriteria { .. }));
        assert_eq!(pipeline.directory().fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listing_annotates_areas_on_request() {
        let sydney = Coordinates::new(-33.86, 151.2);
        let mut au1 = endpoint("au1", 20, &[Category::Standard]);
        au1.coordinates = sydney;

        let pipeline = SelectionPipeline::new(
            FakeDirectory::new(vec![au1]),
            FakeGeocoder::with(&[(sydney, &["Sydney"])]),
            LatencyProber::new(ScriptedRunner::default(), 5, "nordvpn.com"),
        )
        .with_geocode_spacing(GeocodeSpacing::NONE);

        let plain = pipeline.list_servers(&au_criteria(), false).await.unwrap();
        assert!(plain[0].area_names.is_empty());

        let named = pipeline.list_servers(&au_criteria(), true).await.unwrap();
        assert_eq!(named[0].area_names, vec!["Sydney"]);
    }

    #[tokio::test]
    async fn resolves_codes_and_names() {
        let mut us = endpoint("us1", 20, &[Category::Standard]);
        us.country_name = "United States".into();
        let pipeline = pipeline(vec![us], ScriptedRunner::default());

        assert_eq!(pipeline.resolve_country("US").await.unwrap(), CountryScope::Code("us".into()));
        assert_eq!(pipeline.resolve_country("all").await.unwrap(), CountryScope::All);
        assert_eq!(
            pipeline.resolve_country("united states").await.unwrap(),
            CountryScope::Code("us".into())
        );
        assert!(pipeline.resolve_country("Narnia").await.is_err());
        assert_eq!(pipeline.endpoint("US1").await.unwrap().identifier, "us1");
        assert!(pipeline.endpoint("us9").await.is_err());
    }
}
