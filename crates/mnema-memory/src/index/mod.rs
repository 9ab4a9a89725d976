// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index abstraction.
//!
//! Both the exact linear scan and the approximate graph index live behind
//! [`VectorIndex`], so storage backends select a strategy without changing
//! their retrieval code.

pub mod graph;
pub mod linear;

use mnema_core::MnemaError;
use tokio_util::sync::CancellationToken;

use crate::similarity::SimilarityMetric;

pub use graph::NswIndex;
pub use linear::LinearIndex;

/// A vector index over `(id, embedding)` pairs.
///
/// All implementations enforce a fixed dimension set at construction and
/// return search hits ranked by score descending, id ascending on ties.
pub trait VectorIndex: Send + Sync {
    /// The metric this index ranks by.
    fn metric(&self) -> SimilarityMetric;

    /// Insert or replace a vector. Fails with `DimensionMismatch` if the
    /// vector length differs from the index dimension.
    fn insert(&mut self, id: String, vector: Vec<f32>) -> Result<(), MnemaError>;

    /// Remove a vector by id. Returns whether it was present.
    fn remove(&mut self, id: &str) -> bool;

    /// Find the `top_k` nearest vectors to `query`.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, MnemaError>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild internal structures from the stored vectors.
    ///
    /// Checked against `cancel` at safe points; a cancelled rebuild leaves
    /// the previous structure intact and searchable.
    fn rebuild(&mut self, cancel: &CancellationToken);
}

/// Index strategy selected by the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexStrategy {
    /// Exact brute-force scan.
    #[default]
    Exact,
    /// Approximate navigable-small-world graph.
    Graph,
}

impl IndexStrategy {
    /// Construct an empty index for this strategy.
    pub fn build(&self, dimensions: usize, metric: SimilarityMetric) -> Box<dyn VectorIndex> {
        match self {
            IndexStrategy::Exact => Box::new(LinearIndex::new(dimensions, metric)),
            IndexStrategy::Graph => Box::new(NswIndex::new(dimensions, metric)),
        }
    }
}

/// Check a vector against the index dimension.
pub(crate) fn check_dimensions(expected: usize, vector: &[f32]) -> Result<(), MnemaError> {
    if vector.len() != expected {
        return Err(MnemaError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Sort hits by score descending with deterministic id-ascending tie-break,
/// then truncate to `top_k`.
pub(crate) fn rank_hits(mut hits: Vec<(String, f32)>, top_k: usize) -> Vec<(String, f32)> {
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    hits.truncate(top_k);
    hits
}
