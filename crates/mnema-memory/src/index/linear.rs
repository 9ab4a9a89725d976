// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact brute-force vector index.
//!
//! Scores every stored vector against the query. O(n) per search, but the
//! ground truth the approximate index is measured against, and fast enough
//! for the per-scope collection sizes this engine targets.

use std::collections::HashMap;

use mnema_core::MnemaError;
use tokio_util::sync::CancellationToken;

use crate::index::{VectorIndex, check_dimensions, rank_hits};
use crate::similarity::SimilarityMetric;

pub struct LinearIndex {
    dimensions: usize,
    metric: SimilarityMetric,
    vectors: HashMap<String, Vec<f32>>,
}

impl LinearIndex {
    pub fn new(dimensions: usize, metric: SimilarityMetric) -> Self {
        Self {
            dimensions,
            metric,
            vectors: HashMap::new(),
        }
    }
}

impl VectorIndex for LinearIndex {
    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    fn insert(&mut self, id: String, vector: Vec<f32>) -> Result<(), MnemaError> {
        check_dimensions(self.dimensions, &vector)?;
        self.vectors.insert(id, vector);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> bool {
        self.vectors.remove(id).is_some()
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, MnemaError> {
        check_dimensions(self.dimensions, query)?;
        let hits: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(id, vector)| (id.clone(), self.metric.score(query, vector)))
            .collect();
        Ok(rank_hits(hits, top_k))
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn rebuild(&mut self, _cancel: &CancellationToken) {
        // Scans have no derived structure to rebuild.
    }
}
