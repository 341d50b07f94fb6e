//! TTL cache of diagnoses keyed by unit generation
//!
//! Handles:
//! - Lookup that treats entries past their expiry as misses
//! - Stamping cache timestamps onto stored diagnoses
//! - Sweeping entries for units that are no longer observed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

use crate::diagnosis::Diagnosis;
use crate::models::UnitSnapshot;

/// Identity of a cached diagnosis.
///
/// The generation is the highest restart count of the unit, so a restart
/// invalidates the previous diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub generation: u32,
}

impl CacheKey {
    pub fn for_unit(unit: &UnitSnapshot) -> Self {
        Self {
            namespace: unit.namespace.clone(),
            name: unit.name.clone(),
            uid: unit.uid.clone(),
            generation: unit.generation(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.namespace, self.name, self.uid, self.generation)
    }
}

/// Stored diagnosis with its validity window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub diagnosis: Diagnosis,
    #[serde(with = "crate::diagnosis::timestamp")]
    pub cached_at: DateTime<Utc>,
    #[serde(with = "crate::diagnosis::timestamp")]
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Valid up to and including `expires_at`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Concurrency-safe diagnosis cache
#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Diagnosis> {
        self.get_at(key, Utc::now())
    }

    /// Cached diagnosis if fresh at `now`. Expired entries stay until swept.
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<Diagnosis> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.is_fresh_at(now))
            .map(|entry| entry.diagnosis.clone())
    }

    pub fn put(&self, key: CacheKey, diagnosis: Diagnosis, ttl: Duration) -> Diagnosis {
        self.put_at(key, diagnosis, ttl, Utc::now())
    }

    /// Store a copy stamped with `cachedAt`/`cacheExpiresAt` and return it
    pub fn put_at(
        &self,
        key: CacheKey,
        mut diagnosis: Diagnosis,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Diagnosis {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let expires_at = now + ttl;

        diagnosis.cached_at = Some(now);
        diagnosis.cache_expires_at = Some(expires_at);

        debug!(key = %key, expires_at = %expires_at, "Caching diagnosis");

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.clone(),
            CacheEntry {
                key,
                diagnosis: diagnosis.clone(),
                cached_at: now,
                expires_at,
            },
        );

        diagnosis
    }

    /// Remove every entry whose key is not in `live`; returns the count removed
    pub fn sweep(&self, live: &HashSet<CacheKey>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| live.contains(key));
        let removed = before - entries.len();

        if removed > 0 {
            debug!(removed = removed, remaining = entries.len(), "Swept stale cache entries");
        }

        removed
    }

    /// All entries ordered by key
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshot: Vec<CacheEntry> = entries.values().cloned().collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::crashing_unit;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn diagnosis(root_cause: &str) -> Diagnosis {
        Diagnosis {
            root_cause: root_cause.to_string(),
            confidence: 80,
            method: "pattern".to_string(),
            methods: vec!["pattern".to_string()],
            pattern_result: None,
            ai_result: None,
            error_lines: vec![],
            analyzed_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            cached_at: None,
            cache_expires_at: None,
        }
    }

    #[test]
    fn test_key_tracks_generation() {
        let before = CacheKey::for_unit(&crashing_unit(2));
        let after = CacheKey::for_unit(&crashing_unit(3));

        assert_eq!(before.generation, 2);
        assert_ne!(before, after);
        assert_eq!(before.to_string(), "shop/checkout-6f9c/uid-1/2");
    }

    #[test]
    fn test_restart_misses_previous_entry() {
        let cache = AnalysisCache::new();
        cache.put(
            CacheKey::for_unit(&crashing_unit(2)),
            diagnosis("old"),
            Duration::from_secs(300),
        );

        assert!(cache.get(&CacheKey::for_unit(&crashing_unit(2))).is_some());
        assert!(cache.get(&CacheKey::for_unit(&crashing_unit(3))).is_none());
    }

    #[test]
    fn test_put_stamps_a_copy() {
        let cache = AnalysisCache::new();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();

        let stored = cache.put_at(
            CacheKey::for_unit(&crashing_unit(0)),
            diagnosis("x"),
            Duration::from_secs(300),
            now,
        );

        assert_eq!(stored.cached_at, Some(now));
        assert_eq!(stored.cache_expires_at, Some(now + chrono::Duration::minutes(5)));
        assert_eq!(cache.get_at(&CacheKey::for_unit(&crashing_unit(0)), now), Some(stored));
    }

    #[test]
    fn test_ttl_boundary() {
        let cache = AnalysisCache::new();
        let key = CacheKey::for_unit(&crashing_unit(1));
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        cache.put_at(key.clone(), diagnosis("x"), Duration::from_secs(60), now);

        let expiry = now + chrono::Duration::seconds(60);
        assert!(cache.get_at(&key, expiry).is_some());
        assert!(cache
            .get_at(&key, expiry + chrono::Duration::milliseconds(1))
            .is_none());
        // expired entries are kept until swept
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_removes_unobserved_keys() {
        let cache = AnalysisCache::new();
        let live = CacheKey::for_unit(&crashing_unit(1));
        let stale = CacheKey::for_unit(&crashing_unit(0));
        cache.put(live.clone(), diagnosis("live"), Duration::from_secs(60));
        cache.put(stale, diagnosis("stale"), Duration::from_secs(60));

        let removed = cache.sweep(&HashSet::from([live.clone()]));

        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.snapshot()[0].key, live);
        assert_eq!(cache.sweep(&HashSet::new()), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(AnalysisCache::new());

        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for j in 0..50u32 {
                        let key = CacheKey::for_unit(&crashing_unit(i * 100 + j));
                        cache.put(key.clone(), diagnosis("x"), Duration::from_secs(60));
                        assert!(cache.get(&key).is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 400);
    }

    #[test]
    fn test_entry_serializes_for_status_api() {
        let cache = AnalysisCache::new();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        cache.put_at(
            CacheKey::for_unit(&crashing_unit(1)),
            diagnosis("x"),
            Duration::from_secs(60),
            now,
        );

        let value = serde_json::to_value(cache.snapshot()).unwrap();

        assert_eq!(value[0]["key"]["generation"], 1);
        assert_eq!(value[0]["cachedAt"], "2025-01-01T10:00:00Z");
        assert_eq!(value[0]["expiresAt"], "2025-01-01T10:01:00Z");
        assert_eq!(value[0]["diagnosis"]["cacheExpiresAt"], "2025-01-01T10:01:00Z");
    }
}
