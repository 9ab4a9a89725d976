// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approximate navigable-small-world vector index.
//!
//! Single-layer NSW graph: every vector links to its nearest neighbors at
//! insertion time and queries walk the graph greedily with a beam of
//! candidates. Collections no larger than the beam width are scanned
//! exactly, so small scopes get ground-truth results from both strategies.

use std::collections::{BinaryHeap, HashMap, HashSet};

use mnema_core::MnemaError;
use tokio_util::sync::CancellationToken;

use crate::index::{VectorIndex, check_dimensions, rank_hits};
use crate::similarity::SimilarityMetric;

/// Neighbor links kept per node.
const MAX_NEIGHBORS: usize = 8;

/// Beam width during graph traversal.
const EF_SEARCH: usize = 32;

pub struct NswIndex {
    dimensions: usize,
    metric: SimilarityMetric,
    vectors: HashMap<String, Vec<f32>>,
    links: HashMap<String, Vec<String>>,
    entry: Option<String>,
}

/// Candidate ordered by score for the traversal heaps.
struct Candidate {
    score: f32,
    id: String,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.id == other.id
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl NswIndex {
    pub fn new(dimensions: usize, metric: SimilarityMetric) -> Self {
        Self {
            dimensions,
            metric,
            vectors: HashMap::new(),
            links: HashMap::new(),
            entry: None,
        }
    }

    /// Connect `id` to its nearest existing nodes and back-link them,
    /// trimming neighbor lists that exceed the cap.
    fn link_node(&mut self, id: &str) {
        let Some(vector) = self.vectors.get(id).cloned() else {
            return;
        };
        let neighbors = beam_search(
            &self.vectors,
            &self.links,
            self.metric,
            self.entry.as_deref(),
            &vector,
            MAX_NEIGHBORS + 1,
        );
        let neighbors: Vec<String> = neighbors
            .into_iter()
            .map(|(nid, _)| nid)
            .filter(|nid| nid != id)
            .take(MAX_NEIGHBORS)
            .collect();

        for nid in &neighbors {
            let back = self.links.entry(nid.clone()).or_default();
            if !back.contains(&id.to_string()) {
                back.push(id.to_string());
                if back.len() > MAX_NEIGHBORS * 2 {
                    self.trim_neighbors(nid);
                }
            }
        }
        self.links.insert(id.to_string(), neighbors);
    }

    /// Shrink an oversized neighbor list back to the closest entries.
    fn trim_neighbors(&mut self, id: &str) {
        let Some(vector) = self.vectors.get(id).cloned() else {
            return;
        };
        let Some(neighbors) = self.links.get(id).cloned() else {
            return;
        };
        let scored: Vec<(String, f32)> = neighbors
            .into_iter()
            .filter_map(|nid| {
                self.vectors
                    .get(&nid)
                    .map(|nv| (nid.clone(), self.metric.score(&vector, nv)))
            })
            .collect();
        let kept: Vec<String> = rank_hits(scored, MAX_NEIGHBORS)
            .into_iter()
            .map(|(nid, _)| nid)
            .collect();
        self.links.insert(id.to_string(), kept);
    }

    fn exact_scan(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)> {
        let hits: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(id, vector)| (id.clone(), self.metric.score(query, vector)))
            .collect();
        rank_hits(hits, top_k)
    }
}

/// Greedy best-first traversal with a bounded result beam.
///
/// Returns up to `ef` scored nodes reachable from `entry`; unreachable
/// islands are missed, which rebuilds repair.
fn beam_search(
    vectors: &HashMap<String, Vec<f32>>,
    links: &HashMap<String, Vec<String>>,
    metric: SimilarityMetric,
    entry: Option<&str>,
    query: &[f32],
    ef: usize,
) -> Vec<(String, f32)> {
    let Some(entry) = entry else {
        return Vec::new();
    };
    let Some(entry_vec) = vectors.get(entry) else {
        return Vec::new();
    };

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(entry.to_string());

    // Max-heap of frontier candidates, best first.
    let mut frontier = BinaryHeap::new();
    let entry_score = metric.score(query, entry_vec);
    frontier.push(Candidate {
        score: entry_score,
        id: entry.to_string(),
    });

    // Min-heap (via Reverse) of the best `ef` results seen so far.
    let mut results: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::new();
    results.push(std::cmp::Reverse(Candidate {
        score: entry_score,
        id: entry.to_string(),
    }));

    while let Some(current) = frontier.pop() {
        let worst = results
            .peek()
            .map(|r| r.0.score)
            .unwrap_or(f32::NEG_INFINITY);
        if results.len() >= ef && current.score < worst {
            break;
        }

        let Some(neighbors) = links.get(&current.id) else {
            continue;
        };
        for nid in neighbors {
            if !visited.insert(nid.clone()) {
                continue;
            }
            let Some(nv) = vectors.get(nid) else {
                continue;
            };
            let score = metric.score(query, nv);
            let worst = results
                .peek()
                .map(|r| r.0.score)
                .unwrap_or(f32::NEG_INFINITY);
            if results.len() < ef || score > worst {
                frontier.push(Candidate {
                    score,
                    id: nid.clone(),
                });
                results.push(std::cmp::Reverse(Candidate {
                    score,
                    id: nid.clone(),
                }));
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    let hits: Vec<(String, f32)> = results
        .into_iter()
        .map(|r| (r.0.id, r.0.score))
        .collect();
    rank_hits(hits, ef)
}

impl VectorIndex for NswIndex {
    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    fn insert(&mut self, id: String, vector: Vec<f32>) -> Result<(), MnemaError> {
        check_dimensions(self.dimensions, &vector)?;
        let replacing = self.vectors.insert(id.clone(), vector).is_some();
        if replacing {
            // Stale links point at the old position; relink from scratch.
            self.links.remove(&id);
        }
        self.link_node(&id);
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        if self.vectors.remove(id).is_none() {
            return false;
        }
        self.links.remove(id);
        for neighbors in self.links.values_mut() {
            neighbors.retain(|nid| nid != id);
        }
        if self.entry.as_deref() == Some(id) {
            self.entry = self.vectors.keys().min().cloned();
        }
        true
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, MnemaError> {
        check_dimensions(self.dimensions, query)?;
        // Small collections get ground-truth results directly.
        if self.vectors.len() <= EF_SEARCH {
            return Ok(self.exact_scan(query, top_k));
        }
        let hits = beam_search(
            &self.vectors,
            &self.links,
            self.metric,
            self.entry.as_deref(),
            query,
            EF_SEARCH.max(top_k),
        );
        Ok(rank_hits(hits, top_k))
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn rebuild(&mut self, cancel: &CancellationToken) {
        let mut order: Vec<String> = self.vectors.keys().cloned().collect();
        order.sort();

        let mut fresh = NswIndex::new(self.dimensions, self.metric);
        for id in order {
            if cancel.is_cancelled() {
                // Abandon the partial graph; the old one stays searchable.
                return;
            }
            let vector = self.vectors[&id].clone();
            fresh.vectors.insert(id.clone(), vector);
            fresh.link_node(&id);
            if fresh.entry.is_none() {
                fresh.entry = Some(id);
            }
        }
        self.links = fresh.links;
        self.entry = fresh.entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_vector(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[hot % dims] = 1.0;
        v
    }

    #[test]
    fn small_collections_match_exact_search() {
        let mut graph = NswIndex::new(3, SimilarityMetric::Cosine);
        let mut linear = LinearBaseline::new(3);
        for (id, vector) in [
            ("a", vec![1.0, 0.0, 0.0]),
            ("b", vec![0.9, 0.1, 0.0]),
            ("c", vec![0.0, 1.0, 0.0]),
            ("d", vec![0.0, 0.0, 1.0]),
        ] {
            graph.insert(id.to_string(), vector.clone()).unwrap();
            linear.insert(id, vector);
        }
        let query = vec![1.0, 0.05, 0.0];
        let got = graph.search(&query, 3).unwrap();
        let want = linear.search(&query, 3);
        let got_ids: Vec<&str> = got.iter().map(|(id, _)| id.as_str()).collect();
        let want_ids: Vec<&str> = want.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(got_ids, want_ids);
    }

    #[test]
    fn large_collections_recall_the_exact_match() {
        let dims = 16;
        let mut graph = NswIndex::new(dims, SimilarityMetric::Cosine);
        for i in 0..200 {
            let mut v = unit_vector(dims, i);
            v[(i + 1) % dims] = 0.3;
            graph.insert(format!("m{i:03}"), v).unwrap();
        }
        let target = unit_vector(dims, 5);
        graph.insert("target".to_string(), target.clone()).unwrap();

        let hits = graph.search(&target, 5).unwrap();
        assert!(
            hits.iter().any(|(id, _)| id == "target"),
            "target not in {hits:?}"
        );
    }

    #[test]
    fn scores_are_non_increasing() {
        let dims = 8;
        let mut graph = NswIndex::new(dims, SimilarityMetric::Cosine);
        for i in 0..100 {
            graph.insert(format!("m{i:03}"), unit_vector(dims, i)).unwrap();
        }
        let hits = graph.search(&unit_vector(dims, 0), 10).unwrap();
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn remove_keeps_graph_searchable() {
        let mut graph = NswIndex::new(2, SimilarityMetric::Cosine);
        graph.insert("a".to_string(), vec![1.0, 0.0]).unwrap();
        graph.insert("b".to_string(), vec![0.0, 1.0]).unwrap();
        assert!(graph.remove("a"));
        assert!(!graph.remove("a"));
        let hits = graph.search(&[0.0, 1.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "b");
    }

    #[test]
    fn rebuild_preserves_results() {
        let dims = 8;
        let mut graph = NswIndex::new(dims, SimilarityMetric::Cosine);
        for i in 0..60 {
            graph.insert(format!("m{i:03}"), unit_vector(dims, i)).unwrap();
        }
        let query = unit_vector(dims, 3);
        let before = graph.search(&query, 5).unwrap();
        graph.rebuild(&CancellationToken::new());
        let after = graph.search(&query, 5).unwrap();
        assert_eq!(before[0].0, after[0].0);
        assert_eq!(graph.len(), 60);
    }

    #[test]
    fn cancelled_rebuild_leaves_index_usable() {
        let dims = 4;
        let mut graph = NswIndex::new(dims, SimilarityMetric::Cosine);
        for i in 0..40 {
            graph.insert(format!("m{i:02}"), unit_vector(dims, i)).unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        graph.rebuild(&cancel);
        assert_eq!(graph.len(), 40);
        let hits = graph.search(&unit_vector(dims, 1), 3).unwrap();
        assert!(!hits.is_empty());
    }

    /// Minimal exact baseline for comparing ranks in tests.
    struct LinearBaseline {
        dims: usize,
        entries: Vec<(String, Vec<f32>)>,
    }

    impl LinearBaseline {
        fn new(dims: usize) -> Self {
            Self {
                dims,
                entries: Vec::new(),
            }
        }

        fn insert(&mut self, id: &str, vector: Vec<f32>) {
            assert_eq!(vector.len(), self.dims);
            self.entries.push((id.to_string(), vector));
        }

        fn search(&self, query: &[f32], top_k: usize) -> Vec<(String, f32)> {
            let hits = self
                .entries
                .iter()
                .map(|(id, v)| (id.clone(), SimilarityMetric::Cosine.score(query, v)))
                .collect();
            rank_hits(hits, top_k)
        }
    }
}
