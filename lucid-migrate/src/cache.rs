//! Dry-run and schema caches.
//!
//! A [`MigrationCache`] holds the last dry-run [`MigrationResult`] and the
//! per-collection schema views derived from it. Entries belong to a
//! *generation*; [`MigrationCache::invalidate`] starts a new one, after which
//! older entries are never served again.
//!
//! Concurrent callers hitting a cold cache wait on a single computation
//! rather than each running their own dry run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::diff::MigrationResult;
use crate::error::MigrateResult;
use crate::schema::CollectionSchema;

/// Statistics about cache usage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Dry-run results served from the cache.
    pub hits: u64,
    /// Dry runs computed.
    pub misses: u64,
    /// Schema views served from the cache.
    pub schema_hits: u64,
    /// Times the cache was invalidated.
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of dry-run requests served from the cache.
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Stamped<T> {
    generation: u64,
    value: Arc<T>,
}

/// Generation-stamped cache of dry-run results and schema views.
#[derive(Debug, Default)]
pub struct MigrationCache {
    generation: AtomicU64,
    result: tokio::sync::Mutex<Option<Stamped<MigrationResult>>>,
    schemas: RwLock<HashMap<String, Stamped<CollectionSchema>>>,
    stats: Mutex<CacheStats>,
}

impl MigrationCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Return the cached dry-run result, computing it with `compute` on a miss.
    ///
    /// Errors are returned to the caller and never cached.
    pub async fn get_or_compute<F, Fut>(&self, compute: F) -> MigrateResult<Arc<MigrationResult>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MigrateResult<MigrationResult>>,
    {
        let mut slot = self.result.lock().await;
        let generation = self.generation();

        if let Some(cached) = slot.as_ref().filter(|c| c.generation == generation) {
            self.stats.lock().hits += 1;
            debug!(generation, "Dry-run cache hit");
            return Ok(Arc::clone(&cached.value));
        }

        self.stats.lock().misses += 1;
        debug!(generation, "Dry-run cache miss");

        let value = Arc::new(compute().await?);
        *slot = Some(Stamped {
            generation,
            value: Arc::clone(&value),
        });
        Ok(value)
    }

    /// The cached dry-run result, if one is current and not being computed.
    pub fn result(&self) -> Option<Arc<MigrationResult>> {
        let generation = self.generation();
        let slot = self.result.try_lock().ok()?;
        slot.as_ref()
            .filter(|c| c.generation == generation)
            .map(|c| Arc::clone(&c.value))
    }

    /// A cached schema view.
    pub fn schema(&self, collection_key: &str) -> Option<Arc<CollectionSchema>> {
        let generation = self.generation();
        let schemas = self.schemas.read();
        let cached = schemas
            .get(collection_key)
            .filter(|c| c.generation == generation)?;

        self.stats.lock().schema_hits += 1;
        Some(Arc::clone(&cached.value))
    }

    /// Store a schema view computed during `generation`.
    ///
    /// Views from an older generation are discarded.
    pub fn insert_schema(&self, generation: u64, schema: Arc<CollectionSchema>) {
        if generation != self.generation() {
            debug!(collection = %schema.key, "Discarding stale schema view");
            return;
        }
        self.schemas.write().insert(
            schema.key.clone(),
            Stamped {
                generation,
                value: schema,
            },
        );
    }

    /// Start a new generation and forget every cached entry.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.schemas.write().clear();
        if let Ok(mut slot) = self.result.try_lock() {
            *slot = None;
        }
        self.stats.lock().invalidations += 1;
        debug!(generation, "Migration cache invalidated");
    }

    /// Usage statistics.
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }
}
