// Copyright 2025 Tenant Platform Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Short-TTL cache of tenant -> resolved backend target.
//!
//! Strictly a cache: entries are safe to evict or recompute at any time,
//! and a miss means re-discovery, never an error. Misses are not cached.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::platform::ServiceInfo;

/// Snapshot of one resolved route.
#[derive(Clone, Debug)]
pub struct RouteCacheEntry {
    pub target_url: String,
    pub service: ServiceInfo,
    pub cached_at: DateTime<Utc>,
    expires_at: Instant,
}

impl RouteCacheEntry {
    pub fn new(target_url: String, service: ServiceInfo, ttl: Duration) -> Self {
        Self {
            target_url,
            service,
            cached_at: Utc::now(),
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// TTL cache keyed by tenant id.
#[derive(Default)]
pub struct RouteCache {
    entries: DashMap<String, RouteCacheEntry>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached entry while unexpired; expired entries are
    /// evicted on read.
    pub fn get(&self, tenant_id: &str) -> Option<RouteCacheEntry> {
        self.get_at(tenant_id, Instant::now())
    }

    fn get_at(&self, tenant_id: &str, now: Instant) -> Option<RouteCacheEntry> {
        if let Some(entry) = self.entries.get(tenant_id) {
            if !entry.is_expired_at(now) {
                return Some(entry.clone());
            }
        }
        // Drop the read guard before removing.
        self.entries.remove(tenant_id);
        None
    }

    /// Overwrites unconditionally.
    pub fn insert(&self, tenant_id: &str, entry: RouteCacheEntry) {
        self.entries.insert(tenant_id.to_string(), entry);
    }

    /// Eager invalidation on lifecycle mutations for the tenant.
    pub fn invalidate(&self, tenant_id: &str) {
        self.entries.remove(tenant_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ttl: Duration) -> RouteCacheEntry {
        RouteCacheEntry::new(
            "http://10.0.0.1:80".to_string(),
            ServiceInfo::default(),
            ttl,
        )
    }

    #[test]
    fn test_put_then_get_round_trip() {
        let cache = RouteCache::new();
        cache.insert("t1", entry(Duration::from_secs(60)));
        let got = cache.get("t1").map(|e| e.target_url);
        assert_eq!(got.as_deref(), Some("http://10.0.0.1:80"));
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let cache = RouteCache::new();
        cache.insert("t1", entry(Duration::from_secs(60)));

        let later = Instant::now() + Duration::from_secs(61);
        assert!(cache.get_at("t1", later).is_none());
        // Evicted, not just hidden.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_overwrites() {
        let cache = RouteCache::new();
        cache.insert("t1", entry(Duration::from_secs(60)));
        let mut e = entry(Duration::from_secs(60));
        e.target_url = "http://10.0.0.2:80".to_string();
        cache.insert("t1", e);
        assert_eq!(
            cache.get("t1").map(|e| e.target_url).as_deref(),
            Some("http://10.0.0.2:80")
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let cache = RouteCache::new();
        cache.insert("t1", entry(Duration::from_secs(60)));
        cache.invalidate("t1");
        assert!(cache.get("t1").is_none());
    }
}
