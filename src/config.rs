//! Configuration for the database and its HNSW index.
//!
//! Defaults work out of the box; `validate()` runs at construction and
//! reports the first offending field as an `InvalidConfig` error. The serde
//! representation matches the on-disk `config.json`: the distance metric is
//! an integer code and `save_interval` is integer nanoseconds.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VectorDbError};

/// Distance metrics supported for vector similarity computation.
///
/// Persisted as integer codes: 0 cosine, 1 euclidean, 2 dot product,
/// 3 manhattan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DistanceMetric {
    /// Cosine distance (1 - cosine similarity).
    #[default]
    Cosine,
    /// Euclidean (L2) distance.
    Euclidean,
    /// Negated dot product (smaller = more similar).
    DotProduct,
    /// Manhattan (L1) distance.
    Manhattan,
}

impl From<DistanceMetric> for u8 {
    fn from(metric: DistanceMetric) -> u8 {
        match metric {
            DistanceMetric::Cosine => 0,
            DistanceMetric::Euclidean => 1,
            DistanceMetric::DotProduct => 2,
            DistanceMetric::Manhattan => 3,
        }
    }
}

impl TryFrom<u8> for DistanceMetric {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(DistanceMetric::Cosine),
            1 => Ok(DistanceMetric::Euclidean),
            2 => Ok(DistanceMetric::DotProduct),
            3 => Ok(DistanceMetric::Manhattan),
            other => Err(format!("unknown distance metric code: {other}")),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dot_product",
            DistanceMetric::Manhattan => "manhattan",
        };
        f.write_str(name)
    }
}

/// Generic index descriptor persisted alongside the HNSW parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: "hnsw".to_string(),
            parameters: serde_json::Map::new(),
        }
    }
}

/// HNSW tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Target number of connections per node on layers >= 1.
    pub m: usize,
    /// Size of the dynamic candidate list during construction.
    pub ef_construction: usize,
    /// Size of the dynamic candidate list during search.
    pub ef_search: usize,
    /// Degree cap on layers >= 1; kept in the on-disk format, mirrors `m`.
    pub max_m: usize,
    /// Degree cap on the dense base layer.
    pub max_m0: usize,
    /// Level-assignment decay factor; the probability of promoting a new
    /// node one layer up, so it must lie in (0, 1).
    pub ml: f64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_m: 16,
            max_m0: 32,
            ml: 1.0 / 2.303,
        }
    }
}

impl HnswConfig {
    /// The degree cap for a given layer: `max_m0` on the base layer, `m`
    /// above it.
    pub fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.max_m0
        } else {
            self.m
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.m == 0 {
            return Err(VectorDbError::invalid_config("m", self.m, "must be positive"));
        }
        if self.max_m == 0 {
            return Err(VectorDbError::invalid_config(
                "max_m",
                self.max_m,
                "must be positive",
            ));
        }
        if self.max_m0 == 0 {
            return Err(VectorDbError::invalid_config(
                "max_m0",
                self.max_m0,
                "must be positive",
            ));
        }
        if self.ef_construction == 0 {
            return Err(VectorDbError::invalid_config(
                "ef_construction",
                self.ef_construction,
                "must be positive",
            ));
        }
        if self.ef_search == 0 {
            return Err(VectorDbError::invalid_config(
                "ef_search",
                self.ef_search,
                "must be positive",
            ));
        }
        if !(self.ml > 0.0 && self.ml < 1.0) {
            return Err(VectorDbError::invalid_config(
                "ml",
                self.ml,
                "must be a probability in (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Complete database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Vector dimensionality, fixed for the database's lifetime.
    pub dimensions: usize,
    pub distance_metric: DistanceMetric,
    pub index_config: IndexConfig,
    pub hnsw_config: HnswConfig,
    /// Directory the snapshot files are written to.
    pub persist_path: PathBuf,
    pub auto_save: bool,
    /// Auto-save wake interval; serialized as integer nanoseconds.
    #[serde(with = "duration_nanos")]
    pub save_interval: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dimensions: 32,
            distance_metric: DistanceMetric::Cosine,
            index_config: IndexConfig::default(),
            hnsw_config: HnswConfig::default(),
            persist_path: PathBuf::from("vectordb_data"),
            auto_save: true,
            save_interval: Duration::from_secs(300),
        }
    }
}

impl DatabaseConfig {
    /// Validate configuration parameters. Called by the database constructor;
    /// a failure is fatal to that constructor call only.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(VectorDbError::invalid_config(
                "dimensions",
                self.dimensions,
                "must be positive",
            ));
        }
        if self.auto_save && self.save_interval.is_zero() {
            return Err(VectorDbError::invalid_config(
                "save_interval",
                "0ns",
                "must be positive when auto_save is enabled",
            ));
        }
        self.hnsw_config.validate()
    }
}

/// Serde adapter storing a `Duration` as integer nanoseconds, the format the
/// original snapshot files use.
pub(crate) mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}
