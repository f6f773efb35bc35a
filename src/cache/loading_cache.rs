use std::{
    hash::Hash,
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Carga un valor cuando la caché no lo tiene o cuando ha expirado.
#[async_trait]
pub trait CacheLoader<K, V>: Send + Sync {
    type Error;

    async fn load(&self, key: &K) -> Result<V, Self::Error>;
}

/// Capacity and time-to-live for one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub capacity: usize,
    pub ttl: Duration,
}

/// Where an entry is in its refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Younger than the TTL.
    Fresh,
    /// Expired; the old value is still served and no refresh is running.
    StaleServing,
    /// Expired; the old value is served while a reload is in flight.
    Refreshing,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

type SharedLoad<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;
type DynLoader<K, V, E> = Arc<dyn CacheLoader<K, V, Error = E>>;

enum Pending<V, E> {
    Ready(V),
    Waiting(SharedLoad<V, E>),
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale_hits: AtomicU64,
    refreshes: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
}

struct Inner<K, V, E> {
    name: &'static str,
    ttl: Duration,
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    in_flight: DashMap<K, SharedLoad<V, E>>,
    loader: DynLoader<K, V, E>,
    counters: Counters,
}

impl<K, V, E> Inner<K, V, E>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn fresh_value(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock();
        entries
            .peek(key)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.value.clone())
    }

    fn store(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.push(key.clone(), CacheEntry::new(value)) {
            if evicted != key {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("🗑️ Caché {}: entrada desalojada por capacidad", self.name);
            }
        }
    }

    async fn run_load(self: Arc<Self>, key: K) -> Result<V, E> {
        let result = self.loader.load(&key).await;

        match &result {
            Ok(value) => self.store(key.clone(), value.clone()),
            Err(_) => {
                self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ Caché {}: la carga falló, no se guarda nada", self.name);
            }
        }

        self.in_flight.remove(&key);
        result
    }
}

/// Bounded LRU cache with per-key single-flight loading and
/// stale-while-revalidate expiry.
///
/// - A miss runs the loader once, however many callers are waiting.
/// - A read of an expired entry returns the old value right away and starts
///   one background reload on the tokio runtime.
/// - A failed load stores nothing; on refresh the stale value stays.
pub struct LoadingCache<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
    capacity: usize,
}

impl<K, V, E> Clone for LoadingCache<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            capacity: self.capacity,
        }
    }
}

impl<K, V, E> LoadingCache<K, V, E>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, settings: CacheSettings, loader: DynLoader<K, V, E>) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Arc::new(Inner {
                name,
                ttl: settings.ttl,
                entries: Mutex::new(LruCache::new(capacity)),
                in_flight: DashMap::new(),
                loader,
                counters: Counters::default(),
            }),
            capacity: capacity.get(),
        }
    }

    /// Returns the cached value, loading it on a miss.
    pub async fn get(&self, key: &K) -> Result<V, E> {
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }

        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        match self.pending_load(key.clone()) {
            Pending::Ready(value) => Ok(value),
            Pending::Waiting(load) => load.await,
        }
    }

    /// Cached value without loading or refreshing anything.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.inner
            .entries
            .lock()
            .peek(key)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.store(key, value);
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.entries.lock().pop(key);
    }

    pub fn invalidate_all(&self) {
        self.inner.entries.lock().clear();
    }

    pub fn state(&self, key: &K) -> Option<EntryState> {
        let expired = self
            .inner
            .entries
            .lock()
            .peek(key)
            .map(|entry| entry.is_expired(self.inner.ttl))?;

        // El lock de entries ya se soltó antes de mirar in_flight
        Some(match (expired, self.inner.in_flight.contains_key(key)) {
            (false, _) => EntryState::Fresh,
            (true, true) => EntryState::Refreshing,
            (true, false) => EntryState::StaleServing,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn metrics(&self) -> CacheMetrics {
        let c = &self.inner.counters;
        CacheMetrics {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            stale_hits: c.stale_hits.load(Ordering::Relaxed),
            refreshes: c.refreshes.load(Ordering::Relaxed),
            load_failures: c.load_failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
        }
    }

    /// Serves fresh or stale entries; stale ones trigger a background reload.
    fn lookup(&self, key: &K) -> Option<V> {
        let (value, expired) = {
            let mut entries = self.inner.entries.lock();
            let entry = entries.get(key)?;
            (entry.value.clone(), entry.is_expired(self.inner.ttl))
        };

        if !expired {
            self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        self.inner.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
        self.spawn_refresh(key.clone());
        Some(value)
    }

    fn spawn_refresh(&self, key: K) {
        if self.inner.in_flight.contains_key(&key) {
            return;
        }

        if let Pending::Waiting(load) = self.pending_load(key) {
            debug!("🔄 Caché {}: recargando entrada expirada en segundo plano", self.inner.name);
            tokio::spawn(async move {
                let _ = load.await;
            });
        }
    }

    /// Joins the in-flight load for `key` or starts a new one.
    fn pending_load(&self, key: K) -> Pending<V, E> {
        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => Pending::Waiting(existing.get().clone()),
            Entry::Vacant(slot) => {
                // Otra carga pudo terminar entre la consulta y este punto
                if let Some(value) = self.inner.fresh_value(&key) {
                    return Pending::Ready(value);
                }

                if self.inner.entries.lock().contains(&key) {
                    self.inner.counters.refreshes.fetch_add(1, Ordering::Relaxed);
                }

                let load = Arc::clone(&self.inner).run_load(key).boxed().shared();
                slot.insert(load.clone());
                Pending::Waiting(load)
            }
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub refreshes: u64,
    pub load_failures: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.stale_hits;
        if served + self.misses == 0 {
            0.0
        } else {
            served as f64 / (served + self.misses) as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }
}
