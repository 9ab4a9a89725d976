// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic memory engine for conversational agents.
//!
//! Classifies conversation content into typed, scoped memory records,
//! stores them with embeddings, and retrieves them by semantic similarity
//! to enrich future turns.
//!
//! ## Architecture
//!
//! - **MemoryClassifier**: Model-backed classification, fact extraction,
//!   and the should-update gate
//! - **VectorIndex**: Exact linear scan and approximate NSW graph behind
//!   one trait
//! - **MemoryBackend**: In-memory, graph, and SQLite storage with a
//!   shared retrieval contract
//! - **RetentionPolicy**: Importance floors and deterministic eviction
//! - **Consolidation**: Advisory merge/summarize suggestions
//! - **MemoryManager**: Orchestration facade and chat command surface

pub mod classifier;
pub mod consolidation;
pub mod index;
pub mod manager;
pub mod retention;
pub mod similarity;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::MemoryClassifier;
pub use consolidation::{ConsolidationCriteria, suggest_consolidations};
pub use index::{IndexStrategy, LinearIndex, NswIndex, VectorIndex};
pub use manager::MemoryManager;
pub use retention::RetentionPolicy;
pub use similarity::{SimilarityMetric, cosine_similarity};
pub use store::{InMemoryStore, MemoryBackend, SqliteStore, open_backend};
pub use types::*;
