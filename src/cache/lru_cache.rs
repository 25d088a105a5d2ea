use dashmap::DashMap;
use std::{
    hash::Hash,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::debug;

/// Cache entry con TTL
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    last_access: u64,
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Option<Duration>, tick: u64) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            last_access: tick,
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.ttl
            .map(|ttl| self.created_at.elapsed() > ttl)
            .unwrap_or(false)
    }
}

/// Cache LRU acotado por capacidad, con TTL opcional por entrada.
#[derive(Debug)]
pub struct LRUCache<K: Clone + Eq + Hash, V> {
    data: Arc<DashMap<K, CacheEntry<V>>>,
    capacity: usize,
    clock: Arc<AtomicU64>,
    metrics: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_removals: AtomicU64,
}

impl<K, V> LRUCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            clock: Arc::new(AtomicU64::new(0)),
            metrics: Arc::new(Counters::default()),
        }
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Option<Duration>) -> Option<V> {
        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.evict_least_recent();
        }

        let entry = CacheEntry::new(value, ttl, self.tick());
        self.data.insert(key, entry).map(|old| old.value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let tick = self.tick();

        // El guard de DashMap debe soltarse antes de remover
        let hit = match self.data.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.last_access = tick;
                Some(entry.value.clone())
            }
            Some(_) => None,
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        match hit {
            Some(value) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                if self.remove_expired(key) {
                    self.metrics.expired_removals.fetch_add(1, Ordering::Relaxed);
                }
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            self.metrics
                .expired_removals
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            expired_removals: self.metrics.expired_removals.load(Ordering::Relaxed),
        }
    }

    /// Quita la entrada sólo si sigue expirada: otra tarea pudo
    /// reinsertarla entre la lectura y este borrado.
    fn remove_expired(&self, key: &K) -> bool {
        self.data.remove_if(key, |_, entry| entry.is_expired()).is_some()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_least_recent(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().last_access)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
            self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<K, V> Clone for LRUCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            capacity: self.capacity,
            clock: self.clock.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// Métricas básicas del cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removals: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
