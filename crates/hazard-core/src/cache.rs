//! Route outcome cache scoped to a hazard snapshot version.

use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{HazardError, Result};
use crate::route_engine::{ConstraintMode, RouteOutcome, RoutePriority};

/// Endpoints are quantized to 1e-5 degrees (~1 m) before keying.
const COORD_SCALE: f64 = 1e5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 1024,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(HazardError::InvalidConfig(
                "cache max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

pub trait CacheEntry {
    fn fetched_at(&self) -> Instant;
}

/// Drop entries older than `max_age`, then the oldest until at most
/// `max_entries` remain.
pub fn prune_cache<K, V>(cache: &DashMap<K, V>, max_entries: usize, max_age: Duration)
where
    K: Clone + Eq + Hash,
    V: CacheEntry,
{
    let now = Instant::now();
    let mut live: Vec<(K, Instant)> = Vec::with_capacity(cache.len());
    let expired: Vec<K> = cache
        .iter()
        .filter_map(|entry| {
            let fetched_at = entry.value().fetched_at();
            if now.duration_since(fetched_at) > max_age {
                Some(entry.key().clone())
            } else {
                live.push((entry.key().clone(), fetched_at));
                None
            }
        })
        .collect();
    for key in &expired {
        cache.remove(key);
    }

    if cache.len() <= max_entries {
        return;
    }

    live.sort_by_key(|(_, fetched_at)| *fetched_at);
    for (key, _) in live {
        if cache.len() <= max_entries {
            break;
        }
        cache.remove(&key);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub snapshot_version: u64,
    /// [`RoutingGraph::fingerprint`](crate::graph::RoutingGraph::fingerprint) of the graph searched
    pub graph_fingerprint: u64,
    pub vehicle: String,
    pub priority: RoutePriority,
    pub mode: ConstraintMode,
    origin: (i64, i64),
    destination: (i64, i64),
}

impl RouteKey {
    pub fn new(
        snapshot_version: u64,
        graph_fingerprint: u64,
        vehicle: impl Into<String>,
        priority: RoutePriority,
        mode: ConstraintMode,
        origin: (f64, f64),
        destination: (f64, f64),
    ) -> Self {
        Self {
            snapshot_version,
            graph_fingerprint,
            vehicle: vehicle.into(),
            priority,
            mode,
            origin: quantize(origin),
            destination: quantize(destination),
        }
    }
}

fn quantize((lat, lon): (f64, f64)) -> (i64, i64) {
    ((lat * COORD_SCALE).round() as i64, (lon * COORD_SCALE).round() as i64)
}

#[derive(Debug, Clone)]
struct CachedRoute {
    outcome: RouteOutcome,
    fetched_at: Instant,
}

impl CacheEntry for CachedRoute {
    fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}

/// Owned, internally synchronized cache of route outcomes.
///
/// Entries from an older hazard snapshot are never returned once
/// [`invalidate_before`](Self::invalidate_before) has run for the newer one.
#[derive(Debug)]
pub struct RouteCache {
    entries: DashMap<RouteKey, CachedRoute>,
    config: CacheConfig,
}

impl RouteCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn get(&self, key: &RouteKey) -> Option<RouteOutcome> {
        let ttl = self.config.ttl();
        let hit = self.entries.get(key).and_then(|entry| {
            (entry.fetched_at.elapsed() <= ttl).then(|| entry.outcome.clone())
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.fetched_at.elapsed() > ttl);
        }
        hit
    }

    pub fn insert(&self, key: RouteKey, outcome: RouteOutcome) {
        self.entries.insert(
            key,
            CachedRoute {
                outcome,
                fetched_at: Instant::now(),
            },
        );
        if self.entries.len() > self.config.max_entries {
            self.prune();
        }
    }

    /// Return the cached outcome or compute, store, and return a new one.
    /// Invalid-input outcomes are never stored.
    pub fn get_or_insert_with(&self, key: RouteKey, compute: impl FnOnce() -> RouteOutcome) -> RouteOutcome {
        if let Some(outcome) = self.get(&key) {
            return outcome;
        }
        let outcome = compute();
        if !matches!(outcome, RouteOutcome::InvalidInput { .. }) {
            self.insert(key, outcome.clone());
        }
        outcome
    }

    /// Drop every entry computed against a snapshot older than `version`.
    pub fn invalidate_before(&self, version: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.snapshot_version >= version);
        let dropped = before.saturating_sub(self.entries.len());
        if dropped > 0 {
            tracing::debug!("Invalidated {} cached routes older than snapshot {}", dropped, version);
        }
        dropped
    }

    pub fn prune(&self) {
        prune_cache(&self.entries, self.config.max_entries, self.config.ttl());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(version: u64, lat: f64) -> RouteKey {
        RouteKey::new(
            version,
            7,
            "civilian",
            RoutePriority::Safest,
            ConstraintMode::Soft,
            (lat, -118.0),
            (34.1, -118.1),
        )
    }

    #[test]
    fn nearby_endpoints_share_a_key() {
        assert_eq!(key(1, 34.000001), key(1, 34.000002));
        assert_ne!(key(1, 34.0), key(1, 34.001));
        assert_ne!(key(1, 34.0), key(2, 34.0));
    }

    #[test]
    fn graphs_with_the_same_version_get_distinct_keys() {
        let on = |fingerprint| {
            RouteKey::new(
                0,
                fingerprint,
                "civilian",
                RoutePriority::Safest,
                ConstraintMode::Soft,
                (34.0, -118.0),
                (34.1, -118.1),
            )
        };
        assert_ne!(on(1), on(2));
    }

    #[test]
    fn invalidation_drops_older_snapshots() {
        let cache = RouteCache::default();
        cache.insert(key(1, 34.0), RouteOutcome::NoPath);
        cache.insert(key(2, 34.0), RouteOutcome::NoPath);

        assert_eq!(cache.invalidate_before(2), 1);
        assert!(cache.get(&key(1, 34.0)).is_none());
        assert_eq!(cache.get(&key(2, 34.0)), Some(RouteOutcome::NoPath));
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = RouteCache::new(CacheConfig {
            ttl_secs: 0,
            max_entries: 8,
        });
        cache.insert(key(1, 34.0), RouteOutcome::NoPath);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key(1, 34.0)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn prune_keeps_newest_entries() {
        let cache = RouteCache::new(CacheConfig {
            ttl_secs: 60,
            max_entries: 2,
        });
        for i in 0..3 {
            cache.insert(key(1, 34.0 + i as f64 * 0.01), RouteOutcome::NoPath);
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(1, 34.0)).is_none());
        assert!(cache.get(&key(1, 34.02)).is_some());
    }

    #[test]
    fn invalid_input_is_not_cached() {
        let cache = RouteCache::default();
        let outcome = cache.get_or_insert_with(key(1, 34.0), || RouteOutcome::InvalidInput {
            detail: "bad".to_string(),
        });
        assert!(matches!(outcome, RouteOutcome::InvalidInput { .. }));
        assert!(cache.is_empty());

        let mut calls = 0;
        for _ in 0..2 {
            cache.get_or_insert_with(key(1, 34.0), || {
                calls += 1;
                RouteOutcome::NoPath
            });
        }
        assert_eq!(calls, 1);
    }
}
