//! Response cache: time-bounded memo of (provider set, category, params) -> envelope.
//!
//! - Absolute TTL measured from `put` (no sliding refresh).
//! - Expired entries behave as a miss and are removed on that read; there is
//!   no background sweep.
//! - Unbounded: the category/provider space is small and enumerable.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::envelope::ResultEnvelope;
use crate::providers::QueryParams;

/// Default TTL: 30 minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    provider_set: String,
    category: String,
    params: String,
}

impl CacheKey {
    /// `params` is serialized canonically (sorted keys), so insertion order of the
    /// caller's map never produces a different key.
    pub fn new(provider_set: &str, category: &str, params: &QueryParams) -> Self {
        let params = serde_json::to_string(params).unwrap_or_default();
        Self {
            provider_set: provider_set.to_string(),
            category: category.to_string(),
            params,
        }
    }

    /// Provider-set id: candidate ids in preference order, joined with `+`.
    pub fn provider_set_id<S: AsRef<str>>(ids: &[S]) -> String {
        ids.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("+")
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Short anonymized id for logs (first 6 bytes of SHA-256, hex).
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.provider_set.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.category.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.params.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    envelope: ResultEnvelope,
    written_at: Instant,
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    inner: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResultEnvelope> {
        self.get_at(key, Instant::now())
    }

    pub fn put(&self, key: CacheKey, envelope: ResultEnvelope) {
        self.put_at(key, envelope, Instant::now())
    }

    /// Read as of `now`; a stale entry is evicted and reported as a miss.
    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<ResultEnvelope> {
        let mut map = self.lock();
        let entry = map.get(key)?;
        if now.saturating_duration_since(entry.written_at) >= self.ttl {
            map.remove(key);
            return None;
        }
        Some(entry.envelope.clone())
    }

    pub fn put_at(&self, key: CacheKey, envelope: ResultEnvelope, now: Instant) {
        self.lock().insert(
            key,
            CacheEntry {
                envelope,
                written_at: now,
            },
        );
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every entry for `category`, whatever the params.
    pub fn invalidate_category(&self, category: &str) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|k, _| k.category != category);
        before - map.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EnvelopeMetadata, ResultEnvelope};
    use chrono::Utc;

    fn envelope(source: &str) -> ResultEnvelope {
        ResultEnvelope {
            data: vec![],
            metadata: EnvelopeMetadata {
                source: source.into(),
                reliability: 0.9,
                fetched_at: Utc::now(),
                validation: None,
                cached: false,
                dropped_records: 0,
            },
        }
    }

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn key_is_order_independent() {
        let a = CacheKey::new("a+b", "x", &params(&[("state", "OH"), ("year", "2022")]));
        let b = CacheKey::new("a+b", "x", &params(&[("year", "2022"), ("state", "OH")]));
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
    }

    #[test]
    fn key_differs_by_provider_set_and_params() {
        let p = params(&[("year", "2022")]);
        let a = CacheKey::new("a+b", "x", &p);
        assert_ne!(a, CacheKey::new("a", "x", &p));
        assert_ne!(a, CacheKey::new("a+b", "x", &params(&[("year", "2023")])));
        assert_eq!(CacheKey::provider_set_id(&["a", "b"]), "a+b");
    }

    #[test]
    fn hit_within_ttl_then_miss_after() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let key = CacheKey::new("a", "x", &QueryParams::new());
        let t0 = Instant::now();
        cache.put_at(key.clone(), envelope("a"), t0);

        assert!(cache.get_at(&key, t0 + Duration::from_secs(59)).is_some());
        assert!(cache.get_at(&key, t0 + Duration::from_secs(60)).is_none());
        // Stale entry was evicted by the read.
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = ResponseCache::default();
        let key = CacheKey::new("a", "x", &QueryParams::new());
        cache.put(key.clone(), envelope("a"));
        assert_eq!(cache.ttl(), DEFAULT_CACHE_TTL);
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn invalidate_category_keeps_others() {
        let cache = ResponseCache::default();
        cache.put(CacheKey::new("a", "x", &params(&[("y", "1")])), envelope("a"));
        cache.put(CacheKey::new("a", "x", &params(&[("y", "2")])), envelope("a"));
        cache.put(CacheKey::new("a", "z", &QueryParams::new()), envelope("a"));
        assert_eq!(cache.invalidate_category("x"), 2);
        assert_eq!(cache.len(), 1);
    }
}
