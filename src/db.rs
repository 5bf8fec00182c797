//! The database facade: owns the HNSW index and the per-vector metadata map,
//! serializes concurrent access, tracks statistics, and drives snapshot
//! save/load.
//!
//! # Locking
//!
//! The facade holds one reader/writer lock over the metadata map and active
//! configuration; the index holds its own. Mutating operations (insert,
//! delete, load, update_config) take the facade lock exclusively and the
//! index lock exclusively inside it; reading operations (search, get, list,
//! stats, config, save) take both shared. Searches therefore observe every
//! insert or delete either fully or not at all.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};

use crate::config::{DatabaseConfig, DistanceMetric};
use crate::error::{Result, VectorDbError};
use crate::persistence::{self, PersistedVector};
use crate::schema::{
    DatabaseStats, InsertRequest, SearchRequest, SearchResult, Vector, VectorMetadata,
};
use crate::stats::StatsTracker;
use crate::vector::{distance::optimal_ef, HnswIndex};

struct DbInner {
    vectors: AHashMap<String, VectorMetadata>,
    config: DatabaseConfig,
}

struct AutoSaveWorker {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// The vector database.
///
/// Construct with [`VectorDatabase::new`]; the returned `Arc` can be shared
/// freely across threads. Call [`close`](Self::close) for a final save and an
/// orderly shutdown of the auto-save worker.
pub struct VectorDatabase {
    inner: RwLock<DbInner>,
    index: HnswIndex,
    stats: StatsTracker,
    dimensions: usize,
    metric: DistanceMetric,
    autosave: Mutex<Option<AutoSaveWorker>>,
}

impl VectorDatabase {
    /// Create a database from a validated configuration. Spawns the auto-save
    /// worker when `auto_save` is enabled.
    pub fn new(config: DatabaseConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let index = HnswIndex::new(
            config.hnsw_config.clone(),
            config.dimensions,
            config.distance_metric,
        );

        let db = Arc::new(Self {
            dimensions: config.dimensions,
            metric: config.distance_metric,
            stats: StatsTracker::new(config.dimensions),
            index,
            autosave: Mutex::new(None),
            inner: RwLock::new(DbInner {
                vectors: AHashMap::new(),
                config,
            }),
        });

        if db.inner.read().config.auto_save {
            let worker = Self::spawn_auto_save(&db);
            *db.autosave.lock() = Some(worker);
        }

        Ok(db)
    }

    /// Insert a vector with optional tags.
    pub fn insert(&self, request: InsertRequest) -> Result<()> {
        let started = Instant::now();

        if request.vector.data.len() != self.dimensions {
            return Err(VectorDbError::dimension_mismatch(
                self.dimensions,
                request.vector.data.len(),
            ));
        }

        let mut inner = self.inner.write();
        if inner.vectors.contains_key(&request.vector.id) {
            return Err(VectorDbError::duplicate(&request.vector.id));
        }

        // Both user errors were checked above, so an index failure here is an
        // internal condition.
        self.index
            .insert(
                &request.vector.id,
                &request.vector.data,
                request.metadata.clone(),
            )
            .map_err(|err| VectorDbError::database("insert", err))?;

        inner
            .vectors
            .insert(request.vector.id, VectorMetadata::new(request.metadata));
        let count = inner.vectors.len() as u64;
        drop(inner);

        self.stats.record_insert();
        self.stats.set_vector_count(count);
        self.stats.record_latency(started.elapsed());
        Ok(())
    }

    /// Similarity search.
    ///
    /// `k == 0` yields an empty result. A `distance_metric` in the request
    /// that differs from the configured metric is rejected with
    /// `InvalidConfig`; the metric is fixed at database creation.
    pub fn search(&self, request: SearchRequest) -> Result<Vec<SearchResult>> {
        let started = Instant::now();

        if request.vector.len() != self.dimensions {
            return Err(VectorDbError::dimension_mismatch(
                self.dimensions,
                request.vector.len(),
            ));
        }

        if let Some(metric) = request.distance_metric {
            if metric != self.metric {
                return Err(VectorDbError::invalid_config(
                    "distance_metric",
                    metric,
                    format!("database is configured for {}; per-query overrides are unsupported", self.metric),
                ));
            }
        }

        if request.k == 0 {
            return Ok(Vec::new());
        }

        let results = {
            let inner = self.inner.read();
            let ef = optimal_ef(request.k, inner.config.hnsw_config.ef_search);
            self.index.search(&request.vector, request.k, ef)?
        };

        self.stats.record_search();
        self.stats.record_latency(started.elapsed());
        Ok(results)
    }

    /// Delete a vector by id.
    pub fn delete(&self, id: &str) -> Result<()> {
        let started = Instant::now();

        let mut inner = self.inner.write();
        if !inner.vectors.contains_key(id) {
            return Err(VectorDbError::not_found(id));
        }

        self.index
            .delete(id)
            .map_err(|err| VectorDbError::database("delete", err))?;
        inner.vectors.remove(id);
        let count = inner.vectors.len() as u64;
        drop(inner);

        self.stats.record_delete();
        self.stats.set_vector_count(count);
        self.stats.record_latency(started.elapsed());
        Ok(())
    }

    /// Fetch a vector and its metadata. The vector is a defensive copy,
    /// independent of the index lock.
    pub fn get(&self, id: &str) -> Result<(Vector, VectorMetadata)> {
        let inner = self.inner.read();

        let Some(metadata) = inner.vectors.get(id) else {
            return Err(VectorDbError::not_found(id));
        };

        let Some(data) = self.index.get_vector(id) else {
            return Err(VectorDbError::database(
                "get",
                format!("vector {id} present in metadata but missing from index"),
            ));
        };

        Ok((
            Vector {
                id: id.to_owned(),
                data,
            },
            metadata.clone(),
        ))
    }

    /// Page through stored ids. Ids are returned in ascending order, which is
    /// stable within a snapshot of the database.
    pub fn list(&self, offset: usize, limit: usize) -> Vec<String> {
        let inner = self.inner.read();
        let mut ids: Vec<String> = inner.vectors.keys().cloned().collect();
        drop(inner);
        ids.sort();

        ids.into_iter().skip(offset).take(limit).collect()
    }

    /// Statistics snapshot including the estimated in-memory footprint.
    pub fn get_stats(&self) -> DatabaseStats {
        let count = self.inner.read().vectors.len() as u64;
        let mut stats = self.stats.snapshot();
        stats.memory_usage_bytes = estimate_memory_usage(count, self.dimensions as u64);
        stats
    }

    /// The active configuration.
    pub fn get_config(&self) -> DatabaseConfig {
        self.inner.read().config.clone()
    }

    /// Update the runtime-tunable configuration fields: `save_interval` (when
    /// positive), `persist_path` (when non-empty), and `auto_save`. The
    /// auto-save worker reads the interval on every tick, so a new interval
    /// applies from the next wait.
    pub fn update_config(&self, new_config: DatabaseConfig) -> Result<()> {
        let mut inner = self.inner.write();

        if !new_config.save_interval.is_zero() {
            inner.config.save_interval = new_config.save_interval;
        }
        if !new_config.persist_path.as_os_str().is_empty() {
            inner.config.persist_path = new_config.persist_path;
        }
        inner.config.auto_save = new_config.auto_save;

        Ok(())
    }

    /// Write a snapshot of the current state to the persist directory.
    ///
    /// Runs under the shared facade lock, so concurrent searches proceed
    /// while writers wait. A failure leaves in-memory state untouched.
    pub fn save(&self) -> Result<()> {
        let inner = self.inner.read();

        let nodes = self.index.snapshot_nodes();
        let mut vectors = BTreeMap::new();
        for node in &nodes {
            if let Some(metadata) = inner.vectors.get(&node.id) {
                vectors.insert(
                    node.id.clone(),
                    PersistedVector {
                        vector: node.vector.clone(),
                        metadata: metadata.clone(),
                    },
                );
            }
        }

        persistence::save_snapshot(&inner.config.persist_path, &inner.config, &vectors, &nodes)
    }

    /// Restore state from the persist directory by replaying `vectors.json`
    /// into the index. Succeeds as a no-op when no snapshot exists; fails
    /// when the database already contains vectors.
    pub fn load(&self) -> Result<()> {
        let mut inner = self.inner.write();

        if !inner.vectors.is_empty() {
            return Err(VectorDbError::database(
                "load",
                "cannot load a snapshot into a non-empty database",
            ));
        }

        let Some(persisted) = persistence::load_vectors(&inner.config.persist_path)? else {
            return Ok(());
        };

        for (id, entry) in persisted {
            self.index
                .insert(&id, &entry.vector, entry.metadata.tags.clone())
                .map_err(|err| VectorDbError::database("rebuild_index", err))?;
            inner.vectors.insert(id, entry.metadata);
        }

        let count = inner.vectors.len() as u64;
        drop(inner);

        self.stats.set_vector_count(count);
        tracing::debug!(vectors = count, "snapshot loaded");
        Ok(())
    }

    /// Shut down the auto-save worker and, when auto-save is enabled, write a
    /// final snapshot. Safe to call more than once.
    pub fn close(&self) -> Result<()> {
        let worker = self.autosave.lock().take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(());
            let _ = worker.handle.join();
        }

        if self.inner.read().config.auto_save {
            self.save()?;
        }
        Ok(())
    }

    fn spawn_auto_save(db: &Arc<Self>) -> AutoSaveWorker {
        let (stop, ticker) = mpsc::channel::<()>();
        let weak: Weak<Self> = Arc::downgrade(db);

        let handle = std::thread::spawn(move || loop {
            let Some(db) = weak.upgrade() else { break };
            let interval = db.inner.read().config.save_interval;
            drop(db);

            match ticker.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let Some(db) = weak.upgrade() else { break };
                    if let Err(err) = db.save() {
                        tracing::warn!(error = %err, "auto-save failed");
                    }
                }
                // Stop signal, or every database handle is gone.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        AutoSaveWorker { stop, handle }
    }
}

/// Rough footprint estimate: vector payloads, ~100 bytes of metadata per
/// entry, and ~50% graph overhead on the payloads.
fn estimate_memory_usage(count: u64, dimensions: u64) -> u64 {
    let vector_bytes = count * dimensions * 4;
    let metadata_bytes = count * 100;
    let index_overhead = vector_bytes / 2;
    vector_bytes + metadata_bytes + index_overhead
}
