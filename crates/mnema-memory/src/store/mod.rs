// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage backends for memory records.
//!
//! All backends implement [`MemoryBackend`] and share one retrieval
//! contract: searches in a session scope also see the user-global scope,
//! and the top-K results for the configured metric are identical across
//! backends for any given collection.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use mnema_core::MnemaError;
use mnema_core::traits::PluginAdapter;
use mnema_config::MnemaConfig;
use tokio_util::sync::CancellationToken;

use crate::index::IndexStrategy;
use crate::similarity::SimilarityMetric;
use crate::types::{MemoryRecord, MemoryScope, ScoredMemory};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Storage backend for memory records.
///
/// Mutating operations address the exact scope of the record; searches
/// performed in a session scope additionally cover the user-global scope
/// of the same user.
#[async_trait]
pub trait MemoryBackend: PluginAdapter {
    /// Prepare the backend for use (schema creation, pragmas). Idempotent.
    async fn initialize(&self) -> Result<(), MnemaError>;

    /// Persist a batch of records with their embeddings.
    ///
    /// Records with an existing id are replaced. Embedding lengths must
    /// match the backend's configured dimension.
    async fn store_embeddings(&self, records: Vec<MemoryRecord>) -> Result<(), MnemaError>;

    /// Find up to `top_k` records similar to `query`, scored by the
    /// configured metric, filtered to `min_score`, ranked score
    /// descending with id-ascending tie-break.
    async fn search_similar(
        &self,
        scope: &MemoryScope,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredMemory>, MnemaError>;

    /// Fetch a record by id within its exact scope.
    async fn get(&self, scope: &MemoryScope, id: &str) -> Result<Option<MemoryRecord>, MnemaError>;

    /// List all records in the exact scope, newest first.
    async fn list(&self, scope: &MemoryScope) -> Result<Vec<MemoryRecord>, MnemaError>;

    /// Replace an existing record. Fails with `Validation` if absent.
    async fn update(&self, record: MemoryRecord) -> Result<(), MnemaError>;

    /// Delete a record by id. Returns whether it existed.
    async fn delete(&self, scope: &MemoryScope, id: &str) -> Result<bool, MnemaError>;

    /// Delete every record in the exact scope. Returns the count removed.
    async fn clear(&self, scope: &MemoryScope) -> Result<usize, MnemaError>;

    /// Number of records in the exact scope.
    async fn count(&self, scope: &MemoryScope) -> Result<usize, MnemaError>;

    /// Total number of stored embeddings across all scopes.
    async fn embedding_count(&self) -> Result<usize, MnemaError>;

    /// Rebuild derived index structures, honoring cancellation. A
    /// cancelled rebuild leaves the previous structures serving queries.
    async fn rebuild_index(&self, cancel: &CancellationToken) -> Result<(), MnemaError>;
}

/// Construct and initialize the backend named by the configuration.
pub async fn open_backend(config: &MnemaConfig) -> Result<Arc<dyn MemoryBackend>, MnemaError> {
    let metric = SimilarityMetric::from_label(&config.memory.metric);
    let dimensions = config.memory.embedding_dimensions;

    let backend: Arc<dyn MemoryBackend> = match config.storage.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new(dimensions, metric, IndexStrategy::Exact)),
        "graph" => Arc::new(InMemoryStore::new(dimensions, metric, IndexStrategy::Graph)),
        "sqlite" => Arc::new(
            SqliteStore::open(&config.storage.database_path, metric, config.storage.wal_mode)
                .await?,
        ),
        other => {
            return Err(MnemaError::Config(format!(
                "unknown storage backend `{other}`"
            )));
        }
    };
    backend.initialize().await?;
    Ok(backend)
}
