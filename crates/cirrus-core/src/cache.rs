//! In-memory key/value store with per-entry time-to-live.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{AttrValues, Price, VmInfo};

/// Tagged cache payload.
///
/// The store keeps heterogeneous value shapes in one namespace; tagging the
/// entries keeps retrieval typed without downcasts.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Vms(Vec<VmInfo>),
    Price(Price),
    Zones(Vec<String>),
    Regions(BTreeMap<String, String>),
    AttrValues(AttrValues),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn expired_at(&self, now: Instant) -> bool {
        now >= self.inserted_at + self.ttl
    }
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl CacheInner {
    fn get(&self, key: &str) -> Option<&CacheEntry> {
        // expired entries are treated as absent but left in place until sweep
        self.map
            .get(key)
            .filter(|entry| !entry.expired_at(Instant::now()))
    }

    fn set(&mut self, key: String, value: CacheValue, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.map.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, entry| !entry.expired_at(now));
        before - self.map.len()
    }
}

/// Hit/miss counters of a [`CacheStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe TTL store. Cloning the handle shares the underlying map.
///
/// Single-key operations are atomic; nothing is promised across distinct
/// keys.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CacheStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                default_ttl,
            })),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the live value under `key`, counting the lookup as a hit or
    /// miss. Expired entries read as absent.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        self.get_entry(key).await.map(|(value, _)| value)
    }

    /// Like [`get`](Self::get) but also reports when the entry was written.
    /// The refresh engine uses the timestamp to coalesce concurrent flights.
    pub async fn get_entry(&self, key: &str) -> Option<(CacheValue, Instant)> {
        let store = self.inner.read().await;
        match store.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some((entry.value.clone(), entry.inserted_at))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Replaces the entry under `key`. `ttl: None` applies the default TTL.
    pub async fn set(&self, key: impl Into<String>, value: CacheValue, ttl: Option<Duration>) {
        let mut store = self.inner.write().await;
        store.set(key.into(), value, ttl);
    }

    pub async fn delete(&self, key: &str) {
        let mut store = self.inner.write().await;
        store.map.remove(key);
    }

    /// Removes expired entries and returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut store = self.inner.write().await;
        store.sweep()
    }

    /// Number of entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Spawns the background sweep loop; it stops when `token` is cancelled.
    pub fn spawn_sweeper(
        &self,
        cleanup_interval: Duration,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let dropped = store.sweep().await;
                        if dropped > 0 {
                            debug!(dropped, "cache sweep removed expired entries");
                        }
                    }
                }
            }
        })
    }
}
