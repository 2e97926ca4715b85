//! Cache-aside layer for predictions.
//!
//! One entry per user under `predictions:<user-id>`. Entries expire lazily:
//! an entry older than [`CACHE_TTL`] is treated as absent on the next read.
//! Writes to a user's history must be followed by [`PredictionCache::invalidate`].
//! Histories that change outside any write path, such as a file edited between
//! runs, are reconciled with [`PredictionCache::invalidate_if_older`].
//!
//! Concurrent misses for the same user may both compute and both write. The
//! computation is pure so the duplicate write is harmless.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::PredictionResult;
use crate::storage::CacheStore;

pub const CACHE_TTL: Duration = Duration::from_secs(3600);
const KEY_NAMESPACE: &str = "predictions";

pub fn cache_key(user: Uuid) -> String {
    format!("{KEY_NAMESPACE}:{user}")
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: PredictionResult,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(key: String, payload: PredictionResult, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            payload,
            created_at,
            ttl_secs: CACHE_TTL.as_secs(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() >= self.ttl_secs as i64
    }
}

/// A value plus whether it was served from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub from_cache: bool,
}

enum Lookup {
    Hit(PredictionResult),
    Miss,
    StoreFailed,
}

pub struct PredictionCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl PredictionCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Serve `user`'s prediction from the cache, or compute and store it.
    ///
    /// Errors from `compute` propagate untouched and nothing is cached. Cache
    /// store failures never propagate: the read recomputes and skips the write.
    pub fn get_or_compute<E, F>(&self, user: Uuid, compute: F) -> Result<Cached<PredictionResult>, E>
    where
        F: FnOnce() -> Result<PredictionResult, E>,
    {
        self.get_or_compute_with(user, || compute().map(|value| (value, true)))
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but `compute` also says
    /// whether its result may be stored. A result marked `false` is returned
    /// uncached and the next read computes again.
    pub fn get_or_compute_with<E, F>(&self, user: Uuid, compute: F) -> Result<Cached<PredictionResult>, E>
    where
        F: FnOnce() -> Result<(PredictionResult, bool), E>,
    {
        if !self.store.is_available() {
            let (value, _) = compute()?;
            return Ok(Cached { value, from_cache: false });
        }

        let key = cache_key(user);
        match self.lookup(&key) {
            Lookup::Hit(value) => {
                debug!(%user, "prediction cache hit");
                Ok(Cached { value, from_cache: true })
            }
            Lookup::Miss => {
                debug!(%user, "prediction cache miss");
                let (value, cacheable) = compute()?;
                if cacheable {
                    self.store_entry(key, &value);
                } else {
                    debug!(%user, "prediction not cached");
                }
                Ok(Cached { value, from_cache: false })
            }
            Lookup::StoreFailed => {
                let (value, _) = compute()?;
                Ok(Cached { value, from_cache: false })
            }
        }
    }

    /// Cached prediction for `user`, if present and unexpired.
    pub fn get(&self, user: Uuid) -> Option<PredictionResult> {
        if !self.store.is_available() {
            return None;
        }
        match self.lookup(&cache_key(user)) {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::StoreFailed => None,
        }
    }

    pub fn put(&self, user: Uuid, result: &PredictionResult) {
        if self.store.is_available() {
            self.store_entry(cache_key(user), result);
        }
    }

    /// Drop `user`'s entry regardless of its remaining TTL.
    pub fn invalidate(&self, user: Uuid) {
        if !self.store.is_available() {
            return;
        }
        match self.store.delete(&cache_key(user)) {
            Ok(()) => debug!(%user, "prediction cache invalidated"),
            Err(e) => warn!(%user, error = %e, "failed to invalidate cached prediction"),
        }
    }

    /// Drop `user`'s entry if it was written at or before `changed_at`.
    /// Returns whether an entry was dropped. Unreadable entries are left for
    /// the next read to discard.
    pub fn invalidate_if_older(&self, user: Uuid, changed_at: DateTime<Utc>) -> bool {
        if !self.store.is_available() {
            return false;
        }
        let key = cache_key(user);
        let created_at = match self.store.get(&key) {
            Ok(Some(bytes)) => match serde_json::from_slice::<CacheEntry>(&bytes) {
                Ok(entry) => entry.created_at,
                Err(_) => return false,
            },
            Ok(None) => return false,
            Err(e) => {
                warn!(%user, error = %e, "prediction cache read failed, cannot check freshness");
                return false;
            }
        };
        if created_at > changed_at {
            return false;
        }
        debug!(%user, %created_at, %changed_at, "history changed since prediction was cached");
        self.invalidate(user);
        true
    }

    fn lookup(&self, key: &str) -> Lookup {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Lookup::Miss,
            Err(e) => {
                warn!(key, error = %e, "prediction cache read failed, bypassing cache");
                return Lookup::StoreFailed;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable cache entry");
                self.discard(key);
                return Lookup::Miss;
            }
        };

        if entry.key != key || entry.is_expired(self.clock.now()) {
            debug!(key, "cache entry expired");
            self.discard(key);
            return Lookup::Miss;
        }

        Lookup::Hit(entry.payload)
    }

    fn store_entry(&self, key: String, result: &PredictionResult) {
        let entry = CacheEntry::new(key, result.clone(), self.clock.now());
        let written = serde_json::to_vec(&entry)
            .map_err(Into::into)
            .and_then(|bytes| self.store.set(&entry.key, bytes));
        if let Err(e) = written {
            warn!(key = %entry.key, error = %e, "failed to cache prediction");
        }
    }

    fn discard(&self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            warn!(key, error = %e, "failed to drop stale cache entry");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::NaiveDate;

    use crate::config::ForecastPolicy;
    use crate::error::CacheError;
    use crate::prediction;
    use crate::storage::{MemoryStore, NoopStore};

    pub(crate) struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self::at(Utc::now())
        }

        pub(crate) fn at(now: DateTime<Utc>) -> Self {
            Self(Mutex::new(now))
        }

        pub(crate) fn advance(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Store whose backend is down: every operation errors.
    pub(crate) struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    fn sample_result() -> PredictionResult {
        let today = NaiveDate::from_ymd_opt(2026, 6, 10).unwrap();
        prediction::forecast(&[], today, &ForecastPolicy::default()).unwrap()
    }

    fn counting_compute(counter: &AtomicUsize) -> Result<PredictionResult, std::convert::Infallible> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(sample_result())
    }

    fn setup() -> (PredictionCache, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new(100));
        let cache = PredictionCache::with_clock(store.clone(), clock.clone());
        (cache, clock, store)
    }

    #[test]
    fn key_is_namespaced() {
        let user = Uuid::nil();
        assert_eq!(cache_key(user), "predictions:00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn second_read_served_from_cache() {
        let (cache, _, store) = setup();
        let user = Uuid::new_v4();
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_compute(user, || counting_compute(&calls)).unwrap();
        let raw = store.get(&cache_key(user)).unwrap().unwrap();
        let second = cache.get_or_compute(user, || counting_compute(&calls)).unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.value, second.value);
        assert_eq!(
            serde_json::to_vec(&first.value).unwrap(),
            serde_json::to_vec(&second.value).unwrap()
        );
        // a hit leaves the stored entry untouched
        assert_eq!(store.get(&cache_key(user)).unwrap().unwrap(), raw);
    }

    #[test]
    fn invalidation_forces_recompute() {
        let (cache, _, _) = setup();
        let user = Uuid::new_v4();
        let calls = AtomicUsize::new(0);

        cache.get_or_compute(user, || counting_compute(&calls)).unwrap();
        cache.invalidate(user);
        let after = cache.get_or_compute(user, || counting_compute(&calls)).unwrap();

        assert!(!after.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalidation_is_per_user() {
        let (cache, _, _) = setup();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let calls = AtomicUsize::new(0);

        cache.get_or_compute(a, || counting_compute(&calls)).unwrap();
        cache.get_or_compute(b, || counting_compute(&calls)).unwrap();
        cache.invalidate(a);

        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
    }

    #[test]
    fn entry_expires_after_ttl() {
        let (cache, clock, _) = setup();
        let user = Uuid::new_v4();
        let calls = AtomicUsize::new(0);

        cache.get_or_compute(user, || counting_compute(&calls)).unwrap();
        clock.advance(3599);
        assert!(cache.get_or_compute(user, || counting_compute(&calls)).unwrap().from_cache);

        clock.advance(1);
        let expired = cache.get_or_compute(user, || counting_compute(&calls)).unwrap();
        assert!(!expired.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn broken_store_degrades_to_miss() {
        let cache = PredictionCache::new(Arc::new(BrokenStore));
        let user = Uuid::new_v4();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let read = cache.get_or_compute(user, || counting_compute(&calls)).unwrap();
            assert!(!read.from_cache);
        }
        cache.invalidate(user);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn noop_store_always_recomputes() {
        let cache = PredictionCache::new(Arc::new(NoopStore));
        let user = Uuid::new_v4();
        let calls = AtomicUsize::new(0);

        cache.get_or_compute(user, || counting_compute(&calls)).unwrap();
        cache.get_or_compute(user, || counting_compute(&calls)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.get(user).is_none());
    }

    #[test]
    fn compute_errors_are_not_cached() {
        let (cache, _, store) = setup();
        let user = Uuid::new_v4();

        let result: Result<_, &str> = cache.get_or_compute(user, || Err("history offline"));
        assert_eq!(result.unwrap_err(), "history offline");
        assert_eq!(store.get(&cache_key(user)).unwrap(), None);
    }

    #[test]
    fn corrupt_entry_is_replaced() {
        let (cache, _, store) = setup();
        let user = Uuid::new_v4();
        store.set(&cache_key(user), b"not json".to_vec()).unwrap();

        let calls = AtomicUsize::new(0);
        let read = cache.get_or_compute(user, || counting_compute(&calls)).unwrap();
        assert!(!read.from_cache);
        assert!(cache.get(user).is_some());
    }

    #[test]
    fn put_then_get() {
        let (cache, _, _) = setup();
        let user = Uuid::new_v4();
        let result = sample_result();
        cache.put(user, &result);
        assert_eq!(cache.get(user), Some(result));
    }

    #[test]
    fn uncacheable_result_is_not_stored() {
        let (cache, _, store) = setup();
        let user = Uuid::new_v4();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let read = cache
                .get_or_compute_with(user, || counting_compute(&calls).map(|value| (value, false)))
                .unwrap();
            assert!(!read.from_cache);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.get(&cache_key(user)).unwrap(), None);
    }

    #[test]
    fn entry_older_than_change_is_dropped() {
        let (cache, clock, _) = setup();
        let user = Uuid::new_v4();
        let calls = AtomicUsize::new(0);
        let written_at = clock.now();
        cache.get_or_compute(user, || counting_compute(&calls)).unwrap();

        assert!(!cache.invalidate_if_older(user, written_at - chrono::Duration::seconds(1)));
        assert!(cache.get(user).is_some());

        clock.advance(60);
        assert!(cache.invalidate_if_older(user, written_at + chrono::Duration::seconds(30)));
        assert!(cache.get(user).is_none());
        assert!(!cache.invalidate_if_older(user, clock.now()));
    }

    #[test]
    fn freshness_check_tolerates_broken_store() {
        let cache = PredictionCache::new(Arc::new(BrokenStore));
        assert!(!cache.invalidate_if_older(Uuid::new_v4(), Utc::now()));
    }
}
