//! Native HNSW (Hierarchical Navigable Small World) index.
//!
//! A multi-layer proximity graph over string-keyed nodes. Upper layers hold
//! sparse long-range links, the base layer dense local links; searches descend
//! greedily layer by layer. Nodes reference each other by id through the
//! central node map, so the graph has no owning cycles and serializes
//! directly.
//!
//! All mutable state (node map, entry point, max level, rng) sits behind a
//! single `RwLock`: insert and delete take the write lock, search the read
//! lock, and every operation completes under one acquisition.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::distance::{distance_function, DistanceFunction};
use super::{IndexStats, LayerStats};
use crate::config::{DistanceMetric, HnswConfig};
use crate::error::{Result, VectorDbError};
use crate::schema::{SearchResult, Tags};

/// Hard cap on generated node levels.
pub const LEVEL_CAP: usize = 16;

/// A node in the HNSW graph. Owns its vector; neighbors are referenced by id.
#[derive(Debug, Clone)]
struct HnswNode {
    vector: Vec<f32>,
    /// Neighbor id sets per layer, index 0 = base layer, length `level + 1`.
    connections: Vec<AHashSet<String>>,
    level: usize,
    tags: Option<Tags>,
}

/// A node id paired with its distance to the current query.
///
/// Ordered by distance, so a `BinaryHeap<Candidate>` pops the furthest entry
/// first and `Reverse` turns it into a closest-first frontier.
#[derive(Debug, Clone)]
struct Candidate {
    id: String,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.distance.partial_cmp(&other.distance)
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

/// Owned copy of a node, used for snapshots and introspection.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub id: String,
    pub vector: Vec<f32>,
    /// Neighbor ids per layer, sorted for deterministic output.
    pub connections: Vec<Vec<String>>,
    pub level: usize,
    pub tags: Option<Tags>,
}

struct IndexInner {
    nodes: AHashMap<String, HnswNode>,
    /// Id of a current top-layer node; `None` iff the index is empty.
    entry_point: Option<String>,
    /// Highest level any live node occupies; 0 when empty.
    max_level: usize,
    /// Used only for level assignment, always under the write lock.
    rng: StdRng,
}

/// The HNSW index: owns the graph and provides insert, delete, and layered
/// k-NN search over a fixed distance metric.
pub struct HnswIndex {
    inner: RwLock<IndexInner>,
    config: HnswConfig,
    dimensions: usize,
    distance_fn: Box<dyn DistanceFunction>,
}

impl HnswIndex {
    /// Create an empty index for vectors of the given dimensionality.
    pub fn new(config: HnswConfig, dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            inner: RwLock::new(IndexInner {
                nodes: AHashMap::new(),
                entry_point: None,
                max_level: 0,
                rng: StdRng::from_entropy(),
            }),
            config,
            dimensions,
            distance_fn: distance_function(metric),
        }
    }

    /// Insert a vector under a new id.
    ///
    /// Fails with `DimensionMismatch` on a wrong-length vector and
    /// `Duplicate` if the id is already present; neither mutates the graph.
    pub fn insert(&self, id: &str, vector: &[f32], tags: Option<Tags>) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(VectorDbError::dimension_mismatch(
                self.dimensions,
                vector.len(),
            ));
        }

        let mut inner = self.inner.write();
        if inner.nodes.contains_key(id) {
            return Err(VectorDbError::duplicate(id));
        }

        let level = random_level(&mut inner.rng, self.config.ml);
        let node = HnswNode {
            vector: vector.to_vec(),
            connections: vec![AHashSet::new(); level + 1],
            level,
            tags,
        };

        // First node becomes the entry point.
        if inner.entry_point.is_none() {
            inner.max_level = level;
            inner.entry_point = Some(id.to_owned());
            inner.nodes.insert(id.to_owned(), node);
            return Ok(());
        }

        let top_level = inner.max_level;
        let mut entries = self.entry_candidates(&inner, vector);

        // Greedy descent: carry the single best match down to level + 1.
        for layer in ((level + 1)..=top_level).rev() {
            entries = self.search_layer(&inner, vector, &entries, 1, layer);
        }

        // Register the node before wiring so symmetric edges can be stored on
        // both endpoints. It has no in-edges yet, so searches cannot reach it.
        inner.nodes.insert(id.to_owned(), node);

        for layer in (0..=level.min(top_level)).rev() {
            let mut candidates =
                self.search_layer(&inner, vector, &entries, self.config.ef_construction, layer);
            // Closest-m selection; search_layer returns ascending distances.
            candidates.truncate(self.config.max_connections(layer));

            for neighbor in &candidates {
                add_connection(&mut inner, id, &neighbor.id, layer);
                add_connection(&mut inner, &neighbor.id, id, layer);
                self.prune_connections(&mut inner, &neighbor.id, layer);
            }

            entries = candidates;
        }

        if level > inner.max_level {
            inner.max_level = level;
            inner.entry_point = Some(id.to_owned());
        }

        Ok(())
    }

    /// k-nearest-neighbor search. `ef` is raised to at least `k`.
    ///
    /// Returns up to `k` results ordered by ascending distance; empty if the
    /// index is empty.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimensions {
            return Err(VectorDbError::dimension_mismatch(
                self.dimensions,
                query.len(),
            ));
        }

        let inner = self.inner.read();
        if inner.entry_point.is_none() {
            return Ok(Vec::new());
        }

        let ef = ef.max(k);
        let mut entries = self.entry_candidates(&inner, query);

        for layer in (1..=inner.max_level).rev() {
            entries = self.search_layer(&inner, query, &entries, 1, layer);
        }

        let candidates = self.search_layer(&inner, query, &entries, ef, 0);

        Ok(candidates
            .into_iter()
            .take(k)
            .map(|c| SearchResult {
                id: c.id,
                score: c.distance,
            })
            .collect())
    }

    /// Remove a vector. All edges into the node are dropped; if it was the
    /// entry point, any surviving node of maximal level takes over.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();

        let Some(node) = inner.nodes.remove(id) else {
            return Err(VectorDbError::not_found(id));
        };

        for (layer, neighbors) in node.connections.iter().enumerate() {
            for neighbor_id in neighbors {
                if let Some(neighbor) = inner.nodes.get_mut(neighbor_id) {
                    if let Some(links) = neighbor.connections.get_mut(layer) {
                        links.remove(id);
                    }
                }
            }
        }

        if inner.entry_point.as_deref() == Some(id) {
            let new_entry = inner
                .nodes
                .iter()
                .max_by_key(|(_, node)| node.level)
                .map(|(id, node)| (id.clone(), node.level));
            match new_entry {
                Some((entry_id, level)) => {
                    inner.entry_point = Some(entry_id);
                    inner.max_level = level;
                }
                None => {
                    inner.entry_point = None;
                    inner.max_level = 0;
                }
            }
        }

        Ok(())
    }

    /// A defensive copy of the stored vector, if present.
    pub fn get_vector(&self, id: &str) -> Option<Vec<f32>> {
        self.inner.read().nodes.get(id).map(|n| n.vector.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }

    /// Highest level any live node occupies; 0 when empty.
    pub fn max_level(&self) -> usize {
        self.inner.read().max_level
    }

    /// Id of the current entry point, if any.
    pub fn entry_point(&self) -> Option<String> {
        self.inner.read().entry_point.clone()
    }

    /// The level assigned to a node at insertion.
    pub fn node_level(&self, id: &str) -> Option<usize> {
        self.inner.read().nodes.get(id).map(|n| n.level)
    }

    /// The node's neighbor ids at the given layer, sorted.
    pub fn layer_neighbors(&self, id: &str, layer: usize) -> Option<Vec<String>> {
        let inner = self.inner.read();
        let node = inner.nodes.get(id)?;
        let links = node.connections.get(layer)?;
        let mut neighbors: Vec<String> = links.iter().cloned().collect();
        neighbors.sort();
        Some(neighbors)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.distance_fn.metric()
    }

    /// Owned copies of every node, sorted by id.
    pub fn snapshot_nodes(&self) -> Vec<NodeSnapshot> {
        let inner = self.inner.read();
        let mut nodes: Vec<NodeSnapshot> = inner
            .nodes
            .iter()
            .map(|(id, node)| {
                let connections = node
                    .connections
                    .iter()
                    .map(|links| {
                        let mut ids: Vec<String> = links.iter().cloned().collect();
                        ids.sort();
                        ids
                    })
                    .collect();
                NodeSnapshot {
                    id: id.clone(),
                    vector: node.vector.clone(),
                    connections,
                    level: node.level,
                    tags: node.tags.clone(),
                }
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Index statistics, including per-level connectivity.
    pub fn stats(&self) -> IndexStats {
        let inner = self.inner.read();

        let mut levels = Vec::with_capacity(inner.max_level + 1);
        for level in 0..=inner.max_level {
            let mut node_count = 0;
            let mut total_connections = 0;
            for node in inner.nodes.values() {
                if node.level >= level {
                    node_count += 1;
                    if let Some(links) = node.connections.get(level) {
                        total_connections += links.len();
                    }
                }
            }
            let avg_connections = if node_count > 0 {
                total_connections as f64 / node_count as f64
            } else {
                0.0
            };
            levels.push(LayerStats {
                level,
                node_count,
                total_connections,
                avg_connections,
            });
        }

        IndexStats {
            node_count: inner.nodes.len(),
            max_level: inner.max_level,
            dimensions: self.dimensions,
            entry_point: inner.entry_point.clone(),
            levels,
        }
    }

    /// The entry-point candidate list that seeds a descent.
    fn entry_candidates(&self, inner: &IndexInner, query: &[f32]) -> Vec<Candidate> {
        let Some(entry_id) = inner.entry_point.as_ref() else {
            return Vec::new();
        };
        let distance = inner
            .nodes
            .get(entry_id)
            .map_or(f32::INFINITY, |n| self.distance_fn.distance(query, &n.vector));
        vec![Candidate {
            id: entry_id.clone(),
            distance,
        }]
    }

    /// Best-first search within a single layer.
    ///
    /// Maintains a closest-first frontier and a bounded set of the best `ef`
    /// results; stops when the closest frontier entry is further than the
    /// worst retained result. Returns the results ascending by distance.
    fn search_layer(
        &self,
        inner: &IndexInner,
        query: &[f32],
        entries: &[Candidate],
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: AHashSet<String> = AHashSet::new();
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();

        for entry in entries {
            if visited.insert(entry.id.clone()) {
                frontier.push(Reverse(entry.clone()));
                best.push(entry.clone());
            }
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if best.len() >= ef {
                if let Some(furthest) = best.peek() {
                    if current.distance > furthest.distance {
                        break;
                    }
                }
            }

            let Some(node) = inner.nodes.get(&current.id) else {
                continue;
            };
            let Some(neighbors) = node.connections.get(layer) else {
                continue;
            };

            for neighbor_id in neighbors {
                if !visited.insert(neighbor_id.clone()) {
                    continue;
                }
                let Some(neighbor) = inner.nodes.get(neighbor_id) else {
                    continue;
                };
                let distance = self.distance_fn.distance(query, &neighbor.vector);

                let accept = best.len() < ef
                    || best.peek().map_or(true, |furthest| distance < furthest.distance);
                if accept {
                    let candidate = Candidate {
                        id: neighbor_id.clone(),
                        distance,
                    };
                    frontier.push(Reverse(candidate.clone()));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }

    /// Reduce a node's degree at `layer` back to the cap by dropping its
    /// furthest edges. Each dropped edge is removed from both endpoints.
    fn prune_connections(&self, inner: &mut IndexInner, id: &str, layer: usize) {
        let cap = self.config.max_connections(layer);

        let (base_vector, over) = match inner.nodes.get(id) {
            Some(node) => match node.connections.get(layer) {
                Some(links) if links.len() > cap => (node.vector.clone(), true),
                _ => (Vec::new(), false),
            },
            None => (Vec::new(), false),
        };
        if !over {
            return;
        }

        let mut ranked: Vec<(String, f32)> = match inner.nodes.get(id) {
            Some(node) => node.connections[layer]
                .iter()
                .map(|neighbor_id| {
                    let distance = inner
                        .nodes
                        .get(neighbor_id)
                        .map_or(f32::INFINITY, |n| {
                            self.distance_fn.distance(&base_vector, &n.vector)
                        });
                    (neighbor_id.clone(), distance)
                })
                .collect(),
            None => return,
        };
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        for (dropped_id, _) in ranked.drain(cap..) {
            if let Some(node) = inner.nodes.get_mut(id) {
                node.connections[layer].remove(&dropped_id);
            }
            if let Some(neighbor) = inner.nodes.get_mut(&dropped_id) {
                if let Some(links) = neighbor.connections.get_mut(layer) {
                    links.remove(id);
                }
            }
        }
    }
}

/// Add the directed edge `from -> to` at `layer`, ignoring layers the node
/// does not reach.
fn add_connection(inner: &mut IndexInner, from: &str, to: &str, layer: usize) {
    if let Some(node) = inner.nodes.get_mut(from) {
        if let Some(links) = node.connections.get_mut(layer) {
            links.insert(to.to_owned());
        }
    }
}

/// Draw a level from the geometric distribution: keep flipping a coin biased
/// by `ml` until it fails or the cap is reached.
fn random_level(rng: &mut StdRng, ml: f64) -> usize {
    let mut level = 0;
    while level < LEVEL_CAP && rng.gen::<f64>() < ml {
        level += 1;
    }
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_index(dimensions: usize) -> HnswIndex {
        HnswIndex::new(HnswConfig::default(), dimensions, DistanceMetric::Cosine)
    }

    #[test]
    fn test_empty_index() {
        let index = test_index(3);
        assert!(index.is_empty());
        assert_eq!(index.max_level(), 0);
        assert_eq!(index.entry_point(), None);

        let results = index.search(&[1.0, 0.0, 0.0], 5, 50).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = test_index(3);
        index.insert("a", &[1.0, 0.0, 0.0], None).unwrap();
        index.insert("b", &[0.0, 1.0, 0.0], None).unwrap();
        index.insert("c", &[1.0, 1.0, 0.0], None).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 3, 50).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
        assert_eq!(results[2].id, "b");
        assert!(results[0].score < 1e-6);
    }

    #[test]
    fn test_search_results_sorted() {
        let index = test_index(2);
        for i in 0..50 {
            let angle = i as f32 * 0.1;
            index
                .insert(&format!("v{i}"), &[angle.cos(), angle.sin()], None)
                .unwrap();
        }

        let results = index.search(&[1.0, 0.0], 10, 50).unwrap();
        assert_eq!(results.len(), 10);
        for pair in results.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let index = test_index(2);
        index.insert("a", &[1.0, 0.0], None).unwrap();

        let err = index.insert("a", &[0.0, 1.0], None).unwrap_err();
        assert!(err.is_duplicate());
        // The original vector is untouched.
        assert_eq!(index.get_vector("a").unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let index = test_index(3);
        assert!(index.insert("a", &[1.0, 0.0], None).unwrap_err().is_dimension_mismatch());
        assert!(index.search(&[1.0, 0.0], 5, 50).unwrap_err().is_dimension_mismatch());
        assert!(index.is_empty());
    }

    #[test]
    fn test_delete_not_found() {
        let index = test_index(2);
        assert!(index.delete("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_removes_in_edges() {
        let index = test_index(2);
        for i in 0..20 {
            let angle = i as f32 * 0.3;
            index
                .insert(&format!("v{i}"), &[angle.cos(), angle.sin()], None)
                .unwrap();
        }

        index.delete("v7").unwrap();
        assert!(!index.contains("v7"));
        assert_eq!(index.len(), 19);

        // No surviving node may still reference the deleted id.
        for i in 0..20 {
            let id = format!("v{i}");
            let Some(level) = index.node_level(&id) else { continue };
            for layer in 0..=level {
                let neighbors = index.layer_neighbors(&id, layer).unwrap();
                assert!(!neighbors.contains(&"v7".to_string()));
            }
        }
    }

    #[test]
    fn test_entry_point_reelected_after_delete() {
        let index = test_index(2);
        index.insert("a", &[1.0, 0.0], None).unwrap();
        let first_entry = index.entry_point().unwrap();
        index.delete(&first_entry).unwrap();

        assert_eq!(index.entry_point(), None);
        assert_eq!(index.max_level(), 0);

        index.insert("b", &[0.0, 1.0], None).unwrap();
        assert_eq!(index.entry_point().unwrap(), "b");
        assert_eq!(index.max_level(), index.node_level("b").unwrap());
    }

    #[test]
    fn test_connections_are_symmetric() {
        let index = test_index(4);
        for i in 0..60 {
            let v = [
                (i as f32 * 0.7).sin(),
                (i as f32 * 1.3).cos(),
                (i as f32 * 0.2).sin(),
                1.0,
            ];
            index.insert(&format!("v{i}"), &v, None).unwrap();
        }

        for node in index.snapshot_nodes() {
            for (layer, neighbors) in node.connections.iter().enumerate() {
                for neighbor in neighbors {
                    let back = index.layer_neighbors(neighbor, layer).unwrap();
                    assert!(
                        back.contains(&node.id),
                        "edge {} -> {} at layer {} is not symmetric",
                        node.id,
                        neighbor,
                        layer
                    );
                }
            }
        }
    }

    #[test]
    fn test_degree_caps_hold() {
        let config = HnswConfig::default();
        let index = test_index(3);
        for i in 0..200 {
            let v = [
                (i as f32 * 0.17).sin(),
                (i as f32 * 0.31).cos(),
                (i as f32 * 0.05).sin() + 1.5,
            ];
            index.insert(&format!("v{i}"), &v, None).unwrap();
        }

        for node in index.snapshot_nodes() {
            for (layer, neighbors) in node.connections.iter().enumerate() {
                let cap = config.max_connections(layer);
                assert!(
                    neighbors.len() <= cap,
                    "node {} exceeds cap at layer {}: {} > {}",
                    node.id,
                    layer,
                    neighbors.len(),
                    cap
                );
            }
        }
    }

    #[test]
    fn test_random_level_distribution() {
        let mut rng = StdRng::from_entropy();
        let ml = HnswConfig::default().ml;

        let mut ground = 0usize;
        for _ in 0..2000 {
            let level = random_level(&mut rng, ml);
            assert!(level <= LEVEL_CAP);
            if level == 0 {
                ground += 1;
            }
        }
        // With ml ~ 0.434 roughly 57% of nodes stay on the base layer.
        assert!(ground > 800, "suspicious level distribution: {ground}/2000 at level 0");
    }

    #[test]
    fn test_entry_point_level_matches_max_level() {
        let index = test_index(2);
        for i in 0..100 {
            index
                .insert(&format!("v{i}"), &[i as f32, 1.0], None)
                .unwrap();
        }
        let entry = index.entry_point().unwrap();
        assert_eq!(index.node_level(&entry).unwrap(), index.max_level());
    }
}
