//! # Cache Module
//!
//! Caching of resolved songs, so repeated `play` requests for the same query
//! skip the metadata round-trip to yt-dlp.
//!
//! ## Features
//!
//! - **LRU Eviction**: removes the least recently used entry once full
//! - **TTL Support**: entries expire after the configured time-to-live
//! - **Thread Safety**: concurrent access from multiple guild tasks
//!
//! Only successful resolutions are cached; a query that found nothing is
//! asked again next time.
//!
//! ## Configuration
//!
//! ```env
//! RESOLVE_CACHE_SIZE=256      # Maximum number of cached queries
//! RESOLVE_CACHE_TTL=3600      # Time-to-live in seconds (1 hour)
//! ```

pub mod lru_cache;

use lru_cache::LRUCache;
use std::time::Duration;
use tracing::{debug, info};

use crate::sources::{youtube::extract_video_id, Song};

/// Cache of resolved songs. Direct links are keyed by their exact video id,
/// free text by its normalised form.
#[derive(Debug, Clone)]
pub struct SongCache {
    inner: LRUCache<String, Song>,
    ttl: Duration,
}

impl SongCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: LRUCache::new(capacity),
            ttl,
        }
    }

    pub fn get(&self, query: &str) -> Option<Song> {
        let song = self.inner.get(&cache_key(query));
        if let Some(song) = &song {
            debug!("💾 Cache hit para '{}': {}", query, song.title());
        }
        song
    }

    pub fn put(&self, query: &str, song: Song) {
        self.inner.insert_with_ttl(cache_key(query), song, Some(self.ttl));
    }

    /// Performs cache maintenance by removing expired entries.
    pub fn cleanup_old_entries(&self) {
        let removed = self.inner.cleanup_expired();
        if removed > 0 {
            let metrics = self.inner.metrics();
            info!(
                "🧹 Cache cleanup: removed {} expired entries ({}/{} left, {:.0}% hit rate)",
                removed,
                self.inner.len(),
                self.inner.capacity(),
                metrics.hit_rate() * 100.0
            );
        }
    }
}

/// Los ids de YouTube distinguen mayúsculas: sólo el texto libre se pliega.
fn cache_key(query: &str) -> String {
    match extract_video_id(query) {
        Some(id) => format!("id:{}", id),
        None => format!("q:{}", normalize(query)),
    }
}

/// Búsquedas que sólo difieren en mayúsculas o espacios comparten entrada.
fn normalize(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
