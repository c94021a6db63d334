use super::{heap_score, original_score, search_layer, select_neighbors, Neighbor};
use crate::config::AnnConfig;
use crate::distance::{calculate_distance, DistanceMetric};
use crate::error::{WitnessError, WitnessResult};
use crate::utils::{create_rng, generate_random_level};
use crate::vector::Embedding;

use ndarray::ArrayView1;
use rand::rngs::StdRng;
use std::collections::BinaryHeap;
use tracing::trace;

// Upper bound on a node's level.
const MAX_LEVEL: usize = 16;

/// Layered proximity graph over fixed-dimension vectors.
///
/// Nodes are addressed by dense internal ids in insertion order. Deletion
/// only tombstones a node.
#[derive(Debug)]
pub struct HnswGraph {
    config: AnnConfig,
    metric: DistanceMetric,
    dimensions: usize,
    vectors: Vec<Embedding>,
    deleted: Vec<bool>,
    // node -> layer -> neighbor ids
    links: Vec<Vec<Vec<usize>>>,
    entry_point: Option<usize>,
    max_layer: usize,
    live: usize,
    rng: StdRng,
}

impl HnswGraph {
    pub fn new(dimensions: usize, metric: DistanceMetric, config: AnnConfig) -> WitnessResult<Self> {
        config.validate()?;
        if dimensions == 0 {
            return Err(WitnessError::Configuration("Dimensions must be greater than 0".to_string()));
        }
        Ok(HnswGraph {
            config,
            metric,
            dimensions,
            vectors: Vec::new(),
            deleted: Vec::new(),
            links: Vec::new(),
            entry_point: None,
            max_layer: 0,
            live: 0,
            rng: create_rng(config.seed),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Number of live (non-tombstoned) nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Deleted nodes still held in the graph.
    pub fn tombstones(&self) -> usize {
        self.vectors.len() - self.live
    }

    pub(crate) fn is_deleted(&self, id: usize) -> bool {
        self.deleted.get(id).copied().unwrap_or(true)
    }

    pub(crate) fn connections(&self, id: usize, layer: usize) -> &[usize] {
        self.links
            .get(id)
            .and_then(|layers| layers.get(layer))
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn score_node(&self, query: ArrayView1<f32>, id: usize) -> WitnessResult<Neighbor> {
        let vector = self.vectors.get(id).ok_or_else(|| {
            WitnessError::Internal(format!("HNSW node {} has no stored vector", id))
        })?;
        let dist = calculate_distance(self.metric, query, vector.view())?;
        Ok(Neighbor { score: heap_score(self.metric, dist), internal_id: id })
    }

    /// Adds a vector and returns its internal id.
    pub fn insert(&mut self, vector: Embedding) -> WitnessResult<usize> {
        if vector.len() != self.dimensions {
            return Err(WitnessError::DimensionMismatch { expected: self.dimensions, actual: vector.len() });
        }

        let id = self.vectors.len();
        let level = generate_random_level(self.config.ml, &mut self.rng).min(MAX_LEVEL);
        let query = vector.clone();
        self.vectors.push(vector);
        self.deleted.push(false);
        self.links.push(vec![Vec::new(); level + 1]);
        self.live += 1;
        trace!(id, level, "Inserting HNSW node");

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_layer = level;
            return Ok(id);
        };

        if level < self.max_layer {
            for layer in ((level + 1)..=self.max_layer).rev() {
                let candidates = search_layer(self, query.view(), entry, 1, layer)?;
                if let Some(best) = candidates.peek() {
                    entry = best.internal_id;
                }
            }
        }

        for layer in (0..=level.min(self.max_layer)).rev() {
            let max_conns = if layer == 0 { self.config.m_max0 } else { self.config.m };
            let candidates = search_layer(self, query.view(), entry, self.config.ef_construction, layer)?;
            let selected = select_neighbors(&candidates, max_conns);

            for &neighbor in &selected {
                self.link_back(neighbor, id, layer, max_conns)?;
            }
            self.links[id][layer] = selected;

            if let Some(best) = candidates.peek() {
                entry = best.internal_id;
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(id);
        }
        Ok(id)
    }

    // Adds `new_id` to `node`'s connections on `layer`, pruning to the best `max_conns`.
    fn link_back(&mut self, node: usize, new_id: usize, layer: usize, max_conns: usize) -> WitnessResult<()> {
        let mut conns = self.connections(node, layer).to_vec();
        if !conns.contains(&new_id) {
            conns.push(new_id);
        }

        if conns.len() > max_conns {
            let mut heap = BinaryHeap::new();
            for &candidate in &conns {
                if self.is_deleted(candidate) {
                    continue;
                }
                let dist = calculate_distance(
                    self.metric,
                    self.vectors[node].view(),
                    self.vectors[candidate].view(),
                )?;
                heap.push(Neighbor { score: heap_score(self.metric, dist), internal_id: candidate });
            }
            conns = select_neighbors(&heap, max_conns);
        }

        match self.links.get_mut(node).and_then(|layers| layers.get_mut(layer)) {
            Some(slot) => {
                *slot = conns;
                Ok(())
            }
            None => Err(WitnessError::Internal(format!("HNSW node {} has no layer {}", node, layer))),
        }
    }

    /// Tombstones a node. Returns false if it was unknown or already deleted.
    pub fn mark_deleted(&mut self, id: usize) -> bool {
        match self.deleted.get_mut(id) {
            Some(flag) if !*flag => {
                *flag = true;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// The `k` nearest live nodes as `(internal_id, metric score)`, best first.
    /// `ef` is the search breadth and is raised to `k` when smaller.
    pub fn search(&self, query: &Embedding, k: usize, ef: usize) -> WitnessResult<Vec<(usize, f32)>> {
        if query.len() != self.dimensions {
            return Err(WitnessError::DimensionMismatch { expected: self.dimensions, actual: query.len() });
        }
        if k == 0 || self.live == 0 {
            return Ok(Vec::new());
        }
        let Some(mut entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        for layer in (1..=self.max_layer).rev() {
            let candidates = search_layer(self, query.view(), entry, 1, layer)?;
            if let Some(best) = candidates.peek() {
                entry = best.internal_id;
            }
        }

        let candidates = search_layer(self, query.view(), entry, ef.max(k), 0)?;
        Ok(candidates
            .into_sorted_vec()
            .into_iter()
            .rev()
            .take(k)
            .map(|n| (n.internal_id, original_score(self.metric, n.score)))
            .collect())
    }
}
