//! Schema snapshot caching.
//!
//! Holds at most one snapshot together with the server/database identity it
//! was discovered from. Changing the identity clears the snapshot so a schema
//! is never served for a different database.

use crate::config::DatabaseTarget;
use crate::error::ServerError;
use crate::schema::{SchemaSnapshot, SnapshotSource};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Cache state: the configured identity and its snapshot, if discovered.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    /// Configured server/database identity.
    pub target: Option<DatabaseTarget>,

    /// Snapshot discovered for `target`.
    pub snapshot: Option<Arc<SchemaSnapshot>>,
}

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Reads served from the cached snapshot.
    pub hits: u64,

    /// Successful discoveries.
    pub discoveries: u64,

    /// Failed discoveries.
    pub failed_discoveries: u64,

    /// Snapshots dropped because the identity changed.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.discoveries + self.failed_discoveries;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Cache of the last discovered schema.
#[derive(Debug, Default)]
pub struct SchemaCache {
    state: RwLock<CacheState>,
    stats: RwLock<CacheStats>,
}

impl SchemaCache {
    /// Create a cache, optionally with an initial identity.
    pub fn new(target: Option<DatabaseTarget>) -> Self {
        Self {
            state: RwLock::new(CacheState {
                target,
                snapshot: None,
            }),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Set the server/database identity.
    ///
    /// Returns `true` when the identity changed, in which case any cached
    /// snapshot has been dropped.
    pub async fn configure(&self, target: DatabaseTarget) -> bool {
        let mut state = self.state.write().await;

        if state.target.as_ref() == Some(&target) {
            debug!("Target unchanged: {}", target);
            return false;
        }

        info!("Target set to {}", target);
        state.target = Some(target);
        if state.snapshot.take().is_some() {
            self.stats.write().await.invalidations += 1;
        }
        true
    }

    /// Currently configured identity.
    pub async fn target(&self) -> Option<DatabaseTarget> {
        self.state.read().await.target.clone()
    }

    /// Cached snapshot, without triggering discovery.
    pub async fn peek(&self) -> Option<Arc<SchemaSnapshot>> {
        self.state.read().await.snapshot.clone()
    }

    /// Return the snapshot for the configured identity, discovering it when
    /// absent or when `force_refresh` is set.
    ///
    /// Discovery runs without holding the lock. Its result is only installed
    /// if the identity is still the one it ran for. On failure the cache is
    /// left unchanged.
    pub async fn get(
        &self,
        source: &dyn SnapshotSource,
        force_refresh: bool,
    ) -> Result<Arc<SchemaSnapshot>, ServerError> {
        let target = {
            let state = self.state.read().await;
            let target = state.target.clone().ok_or_else(|| {
                ServerError::config(
                    "No database configured. Use `configure_database` to set up the connection.",
                )
            })?;

            if !force_refresh {
                if let Some(snapshot) = &state.snapshot {
                    self.stats.write().await.hits += 1;
                    return Ok(Arc::clone(snapshot));
                }
            }
            target
        };

        let snapshot = match source.discover(&target).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                self.stats.write().await.failed_discoveries += 1;
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        if state.target.as_ref() == Some(&target) {
            state.snapshot = Some(Arc::clone(&snapshot));
        } else {
            debug!("Target changed during discovery of {}; result not cached", target);
        }
        self.stats.write().await.discoveries += 1;

        Ok(snapshot)
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}
