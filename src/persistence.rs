//! JSON snapshot persistence.
//!
//! A snapshot is three files under the persist directory: `config.json` (the
//! full database configuration), `vectors.json` (id -> vector + metadata, the
//! authoritative restore source), and `index.json` (the serialized graph,
//! written for inspection but not required on load — the graph is rebuilt by
//! replaying `vectors.json`).
//!
//! There is no cross-file atomicity, but each file is written to a temporary
//! path and renamed into place, so a partially written file is never
//! observed.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::DatabaseConfig;
use crate::error::{Result, VectorDbError};
use crate::schema::{Tags, VectorMetadata};
use crate::vector::hnsw::NodeSnapshot;

pub(crate) const CONFIG_FILE: &str = "config.json";
pub(crate) const VECTORS_FILE: &str = "vectors.json";
pub(crate) const INDEX_FILE: &str = "index.json";

/// One entry of `vectors.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedVector {
    pub vector: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// One entry of `index.json`: per-layer neighbor sets are encoded as JSON
/// objects mapping neighbor id to `true`, the original wire shape.
#[derive(Serialize)]
struct PersistedNode<'a> {
    id: &'a str,
    vector: &'a [f32],
    connections: Vec<BTreeMap<&'a str, bool>>,
    level: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Tags>,
}

/// Write the full snapshot. The caller holds the facade read lock, so the
/// three files describe one consistent state.
pub(crate) fn save_snapshot(
    dir: &Path,
    config: &DatabaseConfig,
    vectors: &BTreeMap<String, PersistedVector>,
    nodes: &[NodeSnapshot],
) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|err| VectorDbError::persistence("create_directory", dir, err))?;

    write_json_atomic(&dir.join(CONFIG_FILE), config, "marshal_config", "write_config")?;
    write_json_atomic(&dir.join(VECTORS_FILE), vectors, "marshal_vectors", "write_vectors")?;

    let index: BTreeMap<&str, PersistedNode> = nodes
        .iter()
        .map(|node| {
            let connections = node
                .connections
                .iter()
                .map(|layer| layer.iter().map(|id| (id.as_str(), true)).collect())
                .collect();
            (
                node.id.as_str(),
                PersistedNode {
                    id: &node.id,
                    vector: &node.vector,
                    connections,
                    level: node.level,
                    metadata: node.tags.as_ref(),
                },
            )
        })
        .collect();
    write_json_atomic(&dir.join(INDEX_FILE), &index, "marshal_index", "write_index")?;

    tracing::debug!(path = %dir.display(), vectors = vectors.len(), "snapshot written");
    Ok(())
}

/// Read `vectors.json`. Returns `None` when the file does not exist (a fresh
/// database).
pub(crate) fn load_vectors(dir: &Path) -> Result<Option<BTreeMap<String, PersistedVector>>> {
    let path = dir.join(VECTORS_FILE);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(VectorDbError::persistence("read_vectors", path, err)),
    };

    let vectors = serde_json::from_slice(&data)
        .map_err(|err| VectorDbError::persistence("unmarshal_vectors", path, err))?;
    Ok(Some(vectors))
}

/// Serialize `value` to `<path minus extension>.tmp`, then rename over
/// `path`.
fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    marshal_op: &'static str,
    write_op: &'static str,
) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)
        .map_err(|err| VectorDbError::persistence(marshal_op, path, err))?;

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)
        .map_err(|err| VectorDbError::persistence(write_op, &temp_path, err))?;
    fs::rename(&temp_path, path).map_err(|err| VectorDbError::persistence(write_op, path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DistanceMetric, HnswConfig};
    use crate::vector::HnswIndex;

    fn sample_nodes() -> Vec<NodeSnapshot> {
        let index = HnswIndex::new(HnswConfig::default(), 2, DistanceMetric::Cosine);
        index.insert("a", &[1.0, 0.0], None).unwrap();
        index.insert("b", &[0.0, 1.0], None).unwrap();
        index.snapshot_nodes()
    }

    #[test]
    fn test_load_vectors_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_vectors(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            dimensions: 2,
            ..DatabaseConfig::default()
        };

        let mut vectors = BTreeMap::new();
        vectors.insert(
            "a".to_string(),
            PersistedVector {
                vector: vec![1.0, 0.0],
                metadata: VectorMetadata::new(None),
            },
        );
        vectors.insert(
            "b".to_string(),
            PersistedVector {
                vector: vec![0.0, 1.0],
                metadata: VectorMetadata::new(None),
            },
        );

        save_snapshot(dir.path(), &config, &vectors, &sample_nodes()).unwrap();

        for file in [CONFIG_FILE, VECTORS_FILE, INDEX_FILE] {
            assert!(dir.path().join(file).exists(), "{file} missing");
        }
        // No leftover temp files.
        assert!(!dir.path().join("config.tmp").exists());

        let loaded = load_vectors(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["a"].vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_index_file_wire_shape() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            dimensions: 2,
            ..DatabaseConfig::default()
        };

        save_snapshot(dir.path(), &config, &BTreeMap::new(), &sample_nodes()).unwrap();

        let raw = fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();

        let node = &json["a"];
        assert_eq!(node["id"], "a");
        assert_eq!(node["level"], node["connections"].as_array().unwrap().len() as u64 - 1);
        // Layer sets are {neighbor: true} objects.
        assert_eq!(node["connections"][0]["b"], true);
    }
}
