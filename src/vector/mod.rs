//! Vector search: distance kernel and the HNSW index.

pub mod distance;
pub mod hnsw;

pub use distance::{distance_function, magnitude, normalize, optimal_ef, DistanceFunction};
pub use hnsw::HnswIndex;

use serde::Serialize;

/// Index statistics snapshot, computed on demand under the index read lock.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// Number of live nodes in the graph.
    pub node_count: usize,
    /// Highest level any live node occupies.
    pub max_level: usize,
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Id of the current entry point, if the index is non-empty.
    pub entry_point: Option<String>,
    /// Per-level connectivity, from the base layer up to `max_level`.
    pub levels: Vec<LayerStats>,
}

/// Connectivity statistics for one graph layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerStats {
    pub level: usize,
    /// Nodes whose own level reaches this layer.
    pub node_count: usize,
    pub total_connections: usize,
    pub avg_connections: f64,
}
