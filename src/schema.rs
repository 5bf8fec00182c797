//! Data model shared between the facade, the index, and the adapters.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{duration_nanos, DistanceMetric};

/// Free-form per-vector tags. Values are opaque to the core and stored and
/// returned verbatim.
pub type Tags = serde_json::Map<String, serde_json::Value>;

/// A vector with an id and its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub id: String,
    pub data: Vec<f32>,
}

/// A search hit. `score` is the distance-kernel value, so smaller means
/// closer regardless of metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
}

/// Per-vector metadata kept alongside the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
}

impl VectorMetadata {
    /// Metadata stamped with the current time.
    pub fn new(tags: Option<Tags>) -> Self {
        Self {
            created_at: Utc::now(),
            tags,
        }
    }
}

/// A vector insertion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    pub vector: Vector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Tags>,
}

/// A similarity search request.
///
/// The distance metric is fixed at database creation; `distance_metric` is
/// accepted for wire compatibility but rejected when it differs from the
/// configured metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    #[serde(default)]
    pub k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_metric: Option<DistanceMetric>,
}

/// Database statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub vector_count: u64,
    pub dimensions: usize,
    pub index_type: String,
    pub search_requests: u64,
    pub insert_requests: u64,
    pub delete_requests: u64,
    #[serde(with = "duration_nanos")]
    pub average_latency: Duration,
    pub last_updated: DateTime<Utc>,
    pub memory_usage_bytes: u64,
}
