//! VectorDB - an in-memory vector database with a native HNSW index.
//!
//! The crate is organized in three layers: a pure distance kernel, the HNSW
//! proximity graph built on top of it, and a thread-safe database facade that
//! owns the index plus per-vector metadata and snapshots both to disk as
//! JSON.
//!
//! ```no_run
//! use vectordb::{DatabaseConfig, InsertRequest, SearchRequest, Vector, VectorDatabase};
//!
//! let db = VectorDatabase::new(DatabaseConfig {
//!     dimensions: 3,
//!     ..DatabaseConfig::default()
//! })?;
//!
//! db.insert(InsertRequest {
//!     vector: Vector { id: "a".into(), data: vec![1.0, 0.0, 0.0] },
//!     metadata: None,
//! })?;
//!
//! let hits = db.search(SearchRequest {
//!     vector: vec![1.0, 0.0, 0.0],
//!     k: 10,
//!     distance_metric: None,
//! })?;
//! assert_eq!(hits[0].id, "a");
//! # db.close()?;
//! # Ok::<(), vectordb::VectorDbError>(())
//! ```

// Configuration management: defaults, validation, on-disk JSON encoding
pub mod config;

// The database facade: locking, statistics, snapshot lifecycle
pub mod db;

// Error taxonomy surfaced to adapters
pub mod error;

// JSON snapshot save/load
mod persistence;

// Shared data model: vectors, metadata, requests, stats
pub mod schema;

// Thread-safe statistics tracker
pub mod stats;

// Vector search: distance kernel + HNSW index
pub mod vector;

pub use config::{DatabaseConfig, DistanceMetric, HnswConfig, IndexConfig};
pub use db::VectorDatabase;
pub use error::{Result, VectorDbError};
pub use schema::{
    DatabaseStats, InsertRequest, SearchRequest, SearchResult, Tags, Vector, VectorMetadata,
};
pub use vector::{HnswIndex, IndexStats, LayerStats};
