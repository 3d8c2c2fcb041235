// ── Directory service ──
//
// Fetches the server list through `nordlane_api::DirectoryClient` and keeps
// a short-lived JSON copy on disk so repeated invocations within a few
// minutes skip the network. A missing or corrupt cache file just means a
// fresh fetch.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nordlane_api::DirectoryClient;
use nordlane_api::directory::ServerRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::convert::endpoints_from_records;
use crate::error::CoreError;
use crate::model::Endpoint;

/// Source of the current endpoint set.
pub trait Directory: Send + Sync {
    fn endpoints(&self) -> impl Future<Output = Result<Vec<Endpoint>, CoreError>> + Send;
}

// ── Cache ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct CachedDirectory {
    fetched_at: DateTime<Utc>,
    servers: Vec<ServerRecord>,
}

/// On-disk snapshot of the last successful fetch.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    path: PathBuf,
    ttl: Duration,
}

impl DirectoryCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<CachedDirectory> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt directory cache");
                None
            }
        }
    }

    fn is_fresh(&self, cached: &CachedDirectory, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(cached.fetched_at);
        age >= chrono::TimeDelta::zero() && age.to_std().is_ok_and(|age| age < self.ttl)
    }

    /// Records from a cache file younger than the TTL.
    pub fn fresh(&self, now: DateTime<Utc>) -> Option<Vec<ServerRecord>> {
        self.read()
            .filter(|c| self.is_fresh(c, now))
            .map(|c| c.servers)
    }

    /// Records regardless of age.
    pub fn any(&self) -> Option<Vec<ServerRecord>> {
        self.read().map(|c| c.servers)
    }

    pub fn store(&self, servers: &[ServerRecord], now: DateTime<Utc>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = CachedDirectory {
            fetched_at: now,
            servers: servers.to_vec(),
        };
        let json = serde_json::to_string(&snapshot).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

// ── Service ──────────────────────────────────────────────────────────

/// [`Directory`] backed by the HTTP client and an optional cache.
pub struct DirectoryService {
    client: DirectoryClient,
    cache: Option<DirectoryCache>,
    allow_stale: bool,
}

impl DirectoryService {
    pub fn new(client: DirectoryClient) -> Self {
        Self {
            client,
            cache: None,
            allow_stale: false,
        }
    }

    pub fn with_cache(mut self, cache: DirectoryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Serve an expired cache when the live fetch fails.
    pub fn allow_stale(mut self, allow: bool) -> Self {
        self.allow_stale = allow;
        self
    }

    /// Raw directory records, honouring the cache.
    pub async fn records(&self) -> Result<Vec<ServerRecord>, CoreError> {
        let now = Utc::now();
        if let Some(servers) = self.cache.as_ref().and_then(|c| c.fresh(now)) {
            debug!(count = servers.len(), "directory served from cache");
            return Ok(servers);
        }

        match self.client.servers().await {
            Ok(servers) => {
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.store(&servers, now) {
                        warn!(error = %e, "could not write directory cache");
                    }
                }
                info!(count = servers.len(), "directory fetched");
                Ok(servers)
            }
            Err(e) => {
                let stale = self
                    .cache
                    .as_ref()
                    .filter(|_| self.allow_stale)
                    .and_then(DirectoryCache::any);
                if let Some(servers) = stale {
                    warn!(error = %e, "directory fetch failed, using stale cache");
                    return Ok(servers);
                }
                Err(e.into())
            }
        }
    }
}

impl Directory for DirectoryService {
    async fn endpoints(&self) -> Result<Vec<Endpoint>, CoreError> {
        let records = self.records().await?;
        Ok(endpoints_from_records(&records))
    }
}

// ── Country lookups ──────────────────────────────────────────────────

/// Unique `(code, name)` pairs, ordered by code.
pub fn countries(endpoints: &[Endpoint]) -> Vec<(String, String)> {
    let unique: BTreeMap<&str, &str> = endpoints
        .iter()
        .map(|e| (e.country_code.as_str(), e.country_name.as_str()))
        .collect();
    unique
        .into_iter()
        .map(|(code, name)| (code.to_owned(), name.to_owned()))
        .collect()
}

/// Country code for a full country name, case-insensitive.
pub fn country_code_for_name(endpoints: &[Endpoint], name: &str) -> Result<String, CoreError> {
    let wanted = name.trim();
    endpoints
        .iter()
        .find(|e| e.country_name.eq_ignore_ascii_case(wanted))
        .map(|e| e.country_code.clone())
        .ok_or_else(|| CoreError::UnknownCountry {
            name: wanted.to_owned(),
        })
}
