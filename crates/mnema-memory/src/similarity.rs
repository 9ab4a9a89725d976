// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similarity metrics for embedding vectors.
//!
//! The metric is selected at store construction time and fixed for the
//! life of an index; changing metric requires rebuilding the index.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Vector similarity metric. All metrics score higher-is-better so index
/// and store code can rank uniformly; L2 is the negated distance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Scale-invariant; recommended for text embeddings.
    #[default]
    Cosine,
    /// Scale-sensitive euclidean distance, negated for ranking.
    L2,
    /// Dot product; assumes pre-normalized vectors.
    InnerProduct,
}

impl SimilarityMetric {
    /// Parse a config label, falling back to cosine.
    pub fn from_label(label: &str) -> Self {
        SimilarityMetric::from_str(label.trim()).unwrap_or_default()
    }

    /// Score two vectors under this metric, higher-is-better.
    ///
    /// Callers guarantee equal lengths; the index layer enforces the
    /// store's fixed dimension before vectors get here.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Cosine => cosine_similarity(a, b),
            SimilarityMetric::L2 => -l2_distance(a, b),
            SimilarityMetric::InnerProduct => dot(a, b),
        }
    }
}

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean distance between two equal-length vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Cosine similarity: dot product over the product of magnitudes.
///
/// Zero-magnitude input scores 0.0 rather than dividing by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}
