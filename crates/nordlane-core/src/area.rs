// ── Area resolution ──
//
// Turns endpoint coordinates into locality names through a geocoder.
// Lookups are strictly sequential, spaced by a small random delay, and
// cached per exact coordinate pair for the lifetime of the resolver.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use nordlane_api::GeocodeClient;
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{Coordinates, Endpoint};

/// Anything that can map coordinates to locality names.
pub trait Geocoder: Send + Sync {
    fn locality_names(
        &self,
        at: Coordinates,
    ) -> impl Future<Output = Result<Vec<String>, CoreError>> + Send;
}

/// [`Geocoder`] backed by the HTTP reverse geocoding client.
pub struct ApiGeocoder {
    client: GeocodeClient,
}

impl ApiGeocoder {
    pub fn new(client: GeocodeClient) -> Self {
        Self { client }
    }
}

impl Geocoder for ApiGeocoder {
    async fn locality_names(&self, at: Coordinates) -> Result<Vec<String>, CoreError> {
        match self.client.reverse(at.lat, at.lon).await {
            Ok(address) => Ok(address.locality_names()),
            Err(e) if e.is_rate_limited() => Err(CoreError::GeocodeRateLimited),
            Err(e) => Err(CoreError::GeocodeUnavailable {
                message: e.to_string(),
            }),
        }
    }
}

/// Bounds of the random delay inserted before each uncached lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeocodeSpacing {
    pub min: Duration,
    pub max: Duration,
}

impl GeocodeSpacing {
    pub const NONE: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };
}

impl Default for GeocodeSpacing {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_millis(400),
        }
    }
}

/// Sequential, caching front for a [`Geocoder`].
pub struct AreaResolver<'g, G> {
    geocoder: &'g G,
    spacing: GeocodeSpacing,
    cache: HashMap<Coordinates, Vec<String>>,
    rng: StdRng,
    lookups: usize,
}

impl<'g, G: Geocoder> AreaResolver<'g, G> {
    pub fn new(geocoder: &'g G, spacing: GeocodeSpacing) -> Self {
        Self {
            geocoder,
            spacing,
            cache: HashMap::new(),
            rng: StdRng::from_entropy(),
            lookups: 0,
        }
    }

    /// Number of calls that actually reached the geocoder.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    fn delay(&mut self) -> Duration {
        let GeocodeSpacing { min, max } = self.spacing;
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Locality names for one coordinate pair. Failures resolve to an
    /// empty list and are logged, never raised.
    pub async fn resolve(&mut self, at: Coordinates) -> Vec<String> {
        if let Some(hit) = self.cache.get(&at) {
            return hit.clone();
        }

        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.lookups += 1;
        let names = match self.geocoder.locality_names(at).await {
            Ok(names) => {
                debug!(coordinates = %at, ?names, "area resolved");
                names
            }
            Err(e) => {
                warn!(coordinates = %at, error = %e, "area lookup failed, treating as unnamed");
                Vec::new()
            }
        };
        self.cache.insert(at, names.clone());
        names
    }

    /// Copies of `endpoints` with `area_names` filled in.
    pub async fn annotate(&mut self, endpoints: &[Endpoint]) -> Vec<Endpoint> {
        let mut out = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let names = self.resolve(endpoint.coordinates).await;
            out.push(endpoint.with_area_names(names));
        }
        out
    }
}

/// Case-insensitive exact membership of `area` in `names`.
pub fn area_matches(names: &[String], area: &str) -> bool {
    let wanted = area.trim().to_lowercase();
    names.iter().any(|n| n.to_lowercase() == wanted)
}
