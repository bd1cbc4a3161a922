//! In-memory cache with per-key expiry
//!
//! Values live in a map behind a single read/write lock. Keys stored with a
//! TTL are also indexed by their absolute expiry (milliseconds since the cache
//! was created): a map from deadline to the keys expiring then, and an
//! ascending list of distinct deadlines kept sorted with binary search.
//!
//! One background task per cache sleeps until the earliest deadline. Any
//! mutation that changes the earliest deadline wakes it so the sleep is
//! recomputed; it never sleeps past a deadline that has since moved.

use crate::{KeywardError, KeywardResult};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, trace};

/// Cached value with an optional absolute deadline
#[derive(Debug, Clone)]
struct CacheItem<V> {
    value: V,
    /// Milliseconds since the cache epoch; `None` never expires
    expires_at: Option<u64>,
}

#[derive(Debug)]
struct CacheState<V> {
    data: HashMap<String, CacheItem<V>>,
    expiring: HashMap<u64, Vec<String>>,
    deadlines: Vec<u64>,
}

impl<V> CacheState<V> {
    fn new() -> Self {
        Self {
            data: HashMap::new(),
            expiring: HashMap::new(),
            deadlines: Vec::new(),
        }
    }

    fn earliest(&self) -> Option<u64> {
        self.deadlines.first().copied()
    }

    fn index(&mut self, key: &str, deadline: u64) {
        let keys = self.expiring.entry(deadline).or_default();
        keys.push(key.to_string());
        if keys.len() == 1 {
            if let Err(pos) = self.deadlines.binary_search(&deadline) {
                self.deadlines.insert(pos, deadline);
            }
        }
    }

    fn unindex(&mut self, key: &str, deadline: u64) {
        let Some(keys) = self.expiring.get_mut(&deadline) else {
            return;
        };
        keys.retain(|k| k != key);
        if keys.is_empty() {
            self.expiring.remove(&deadline);
            if let Ok(pos) = self.deadlines.binary_search(&deadline) {
                self.deadlines.remove(pos);
            }
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheItem<V>> {
        let item = self.data.remove(key)?;
        if let Some(deadline) = item.expires_at {
            self.unindex(key, deadline);
        }
        Some(item)
    }

    /// Drop every key sharing `deadline`; returns how many were evicted.
    fn evict(&mut self, deadline: u64) -> usize {
        let keys = self.expiring.remove(&deadline).unwrap_or_default();
        if let Ok(pos) = self.deadlines.binary_search(&deadline) {
            self.deadlines.remove(pos);
        }

        let mut evicted = 0;
        for key in keys {
            let matches = self
                .data
                .get(&key)
                .is_some_and(|item| item.expires_at == Some(deadline));
            if matches {
                self.data.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }
}

#[derive(Debug)]
struct Shared<V> {
    state: RwLock<CacheState<V>>,
    rearm: Notify,
    epoch: Instant,
}

impl<V> Shared<V> {
    fn read(&self) -> RwLockReadGuard<'_, CacheState<V>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState<V>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn instant_at(&self, millis: u64) -> Instant {
        self.epoch + Duration::from_millis(millis)
    }

    /// Run a mutation and wake the reclaimer if it moved the earliest deadline.
    fn mutate<T>(&self, f: impl FnOnce(&mut CacheState<V>) -> T) -> T {
        let mut state = self.write();
        let before = state.earliest();
        let out = f(&mut state);
        let after = state.earliest();
        drop(state);

        if before != after {
            trace!(?before, ?after, "Earliest cache deadline moved, re-arming");
            self.rearm.notify_one();
        }
        out
    }
}

/// Key-value cache whose entries may expire after a TTL.
///
/// Creating a cache spawns its reclaimer on the current Tokio runtime, so
/// [`ExpiringCache::new`] must be called from within one. The reclaimer stops
/// when the cache is dropped.
#[derive(Debug)]
pub struct ExpiringCache<V> {
    shared: Arc<Shared<V>>,
    reclaimer: JoinHandle<()>,
}

impl<V> ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: RwLock::new(CacheState::new()),
            rearm: Notify::new(),
            epoch: Instant::now(),
        });
        let reclaimer = tokio::spawn(reclaim(Arc::clone(&shared)));

        Self { shared, reclaimer }
    }

    /// Store `value` under `key`. A `ttl` of `None` or zero never expires.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let expires_at = ttl
            .filter(|ttl| !ttl.is_zero())
            .map(|ttl| self.shared.now_millis() + ttl.as_millis() as u64);

        self.shared.mutate(|state| {
            state.remove(&key);
            if let Some(deadline) = expires_at {
                state.index(&key, deadline);
            }
            state.data.insert(key, CacheItem { value, expires_at });
        });
    }

    pub fn get(&self, key: &str) -> KeywardResult<V> {
        let now = self.shared.now_millis();
        let state = self.shared.read();
        match state.data.get(key) {
            // the reclaimer may not have run yet for a deadline that just passed
            Some(item) if item.expires_at.is_some_and(|at| at <= now) => {
                Err(KeywardError::not_found(format!("cache key '{}'", key)))
            }
            Some(item) => Ok(item.value.clone()),
            None => Err(KeywardError::not_found(format!("cache key '{}'", key))),
        }
    }

    pub fn delete(&self, key: &str) -> KeywardResult<()> {
        self.shared
            .mutate(|state| state.remove(key))
            .map(|_| ())
            .ok_or_else(|| KeywardError::not_found(format!("cache key '{}'", key)))
    }

    /// Number of stored entries, including ones whose deadline passed but
    /// have not been reclaimed yet.
    pub fn len(&self) -> usize {
        self.shared.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct pending expiry deadlines
    pub fn pending_deadlines(&self) -> usize {
        self.shared.read().deadlines.len()
    }
}

impl<V> Default for ExpiringCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Drop for ExpiringCache<V> {
    fn drop(&mut self) {
        self.reclaimer.abort();
    }
}

async fn reclaim<V>(shared: Arc<Shared<V>>) {
    loop {
        let next = shared.read().earliest();
        match next {
            None => shared.rearm.notified().await,
            Some(deadline) => {
                tokio::select! {
                    _ = time::sleep_until(shared.instant_at(deadline)) => {
                        let evicted = shared.write().evict(deadline);
                        if evicted > 0 {
                            debug!(deadline, evicted, "Evicted expired cache entries");
                        }
                    }
                    _ = shared.rearm.notified() => {}
                }
            }
        }
    }
}
