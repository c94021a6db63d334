//! In-memory HNSW graph backing the store's native vector index.

mod graph;

pub use graph::HnswGraph;

use crate::distance::DistanceMetric;
use crate::error::WitnessResult;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use ndarray::ArrayView1;

/// A node paired with its heap score. Higher score is always better.
#[derive(PartialEq, Debug, Clone, Copy)]
pub(crate) struct Neighbor {
    pub score: f32,
    pub internal_id: usize,
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.partial_cmp(&other.score).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Min-heap view of Neighbor: the worst of the kept results sits on top.
#[derive(PartialEq, Debug, Clone, Copy)]
struct MinHeapNeighbor(Neighbor);

impl Eq for MinHeapNeighbor {}

impl Ord for MinHeapNeighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.score.partial_cmp(&self.0.score).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for MinHeapNeighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
pub(crate) fn heap_score(metric: DistanceMetric, score: f32) -> f32 {
    match metric {
        DistanceMetric::Euclidean => -score,
        DistanceMetric::Cosine => score,
    }
}

#[inline]
pub(crate) fn original_score(metric: DistanceMetric, heap_score: f32) -> f32 {
    match metric {
        DistanceMetric::Euclidean => -heap_score,
        DistanceMetric::Cosine => heap_score,
    }
}

/// Best-first search of one layer, keeping the `ef` best live nodes.
///
/// Tombstoned nodes are still traversed so that deletions do not cut the
/// graph, but they never appear in the returned heap.
pub(crate) fn search_layer(
    graph: &HnswGraph,
    query: ArrayView1<f32>,
    entry_point: usize,
    ef: usize,
    layer: usize,
) -> WitnessResult<BinaryHeap<Neighbor>> {
    let mut visited: HashSet<usize> = HashSet::new();
    let mut results: BinaryHeap<MinHeapNeighbor> = BinaryHeap::new();
    let mut explore_queue: BinaryHeap<Neighbor> = BinaryHeap::new();

    let entry = graph.score_node(query, entry_point)?;
    visited.insert(entry_point);
    explore_queue.push(entry);
    if !graph.is_deleted(entry_point) {
        results.push(MinHeapNeighbor(entry));
    }

    while let Some(current) = explore_queue.pop() {
        if results.len() >= ef {
            if let Some(worst) = results.peek() {
                if current.score < worst.0.score {
                    break;
                }
            }
        }

        for &neighbor_id in graph.connections(current.internal_id, layer) {
            if !visited.insert(neighbor_id) {
                continue;
            }
            let candidate = graph.score_node(query, neighbor_id)?;
            let improves = results.len() < ef
                || results.peek().map_or(true, |worst| candidate.score > worst.0.score);
            if !improves {
                continue;
            }
            explore_queue.push(candidate);
            if !graph.is_deleted(neighbor_id) {
                results.push(MinHeapNeighbor(candidate));
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    Ok(results.into_iter().map(|n| n.0).collect())
}

/// Takes the `m` best candidates.
pub(crate) fn select_neighbors(candidates: &BinaryHeap<Neighbor>, m: usize) -> Vec<usize> {
    let mut best_first: Vec<_> = candidates.iter().cloned().collect();
    best_first.sort_by(|a, b| b.cmp(a));
    best_first.iter().map(|n| n.internal_id).take(m).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_neighbors() {
        let mut candidates = BinaryHeap::new();
        candidates.push(Neighbor { score: 0.9, internal_id: 0 });
        candidates.push(Neighbor { score: 0.8, internal_id: 1 });
        candidates.push(Neighbor { score: 0.95, internal_id: 2 });
        candidates.push(Neighbor { score: 0.7, internal_id: 3 });
        candidates.push(Neighbor { score: 0.85, internal_id: 4 });

        assert_eq!(select_neighbors(&candidates, 3), vec![2, 0, 4]);
        assert_eq!(select_neighbors(&candidates, 10), vec![2, 0, 4, 1, 3]);
    }

    #[test]
    fn test_heap_score_round_trip() {
        assert_eq!(heap_score(DistanceMetric::Euclidean, 1.5), -1.5);
        assert_eq!(original_score(DistanceMetric::Euclidean, -1.5), 1.5);
        assert_eq!(heap_score(DistanceMetric::Cosine, 0.5), 0.5);
    }
}
