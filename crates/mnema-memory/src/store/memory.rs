// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process storage backend.
//!
//! Records are partitioned into per-scope shards, each with its own
//! vector index. Writes take a shard's write lock, so writes within one
//! scope serialize while other scopes proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use mnema_core::traits::PluginAdapter;
use mnema_core::types::{AdapterType, HealthStatus};
use mnema_core::MnemaError;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::index::{IndexStrategy, VectorIndex};
use crate::similarity::SimilarityMetric;
use crate::store::MemoryBackend;
use crate::types::{MemoryRecord, MemoryScope, ScoredMemory};

struct ScopeShard {
    records: HashMap<String, MemoryRecord>,
    index: Box<dyn VectorIndex>,
    /// Bumped on every write; lets a rebuild detect that its snapshot went
    /// stale before swapping in the fresh index.
    version: u64,
}

pub struct InMemoryStore {
    dimensions: usize,
    metric: SimilarityMetric,
    strategy: IndexStrategy,
    shards: DashMap<String, Arc<RwLock<ScopeShard>>>,
}

impl InMemoryStore {
    pub fn new(dimensions: usize, metric: SimilarityMetric, strategy: IndexStrategy) -> Self {
        Self {
            dimensions,
            metric,
            strategy,
            shards: DashMap::new(),
        }
    }

    /// Get or create the shard for a scope key. The `Arc` is cloned out so
    /// no map guard is held while awaiting the shard lock.
    fn shard(&self, key: &str) -> Arc<RwLock<ScopeShard>> {
        self.shards
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(ScopeShard {
                    records: HashMap::new(),
                    index: self.strategy.build(self.dimensions, self.metric),
                    version: 0,
                }))
            })
            .value()
            .clone()
    }

    fn existing_shard(&self, key: &str) -> Option<Arc<RwLock<ScopeShard>>> {
        self.shards.get(key).map(|entry| entry.value().clone())
    }

    /// Scope keys visible to a search from `scope`: the exact scope plus,
    /// for session scopes, the user-global scope of the same user.
    fn visible_keys(scope: &MemoryScope) -> Vec<String> {
        let mut keys = vec![scope.key()];
        if scope.session_id.is_some() {
            keys.push(scope.user_global().key());
        }
        keys
    }
}

#[async_trait]
impl PluginAdapter for InMemoryStore {
    fn name(&self) -> &str {
        match self.strategy {
            IndexStrategy::Exact => "memory",
            IndexStrategy::Graph => "graph",
        }
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MnemaError> {
        Ok(())
    }
}

#[async_trait]
impl MemoryBackend for InMemoryStore {
    async fn initialize(&self) -> Result<(), MnemaError> {
        Ok(())
    }

    async fn store_embeddings(&self, records: Vec<MemoryRecord>) -> Result<(), MnemaError> {
        for record in records {
            if record.embedding.len() != self.dimensions {
                return Err(MnemaError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: record.embedding.len(),
                });
            }
            let shard = self.shard(&record.scope.key());
            let mut guard = shard.write().await;
            guard
                .index
                .insert(record.id.clone(), record.embedding.clone())?;
            guard.records.insert(record.id.clone(), record);
            guard.version = guard.version.wrapping_add(1);
        }
        Ok(())
    }

    async fn search_similar(
        &self,
        scope: &MemoryScope,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredMemory>, MnemaError> {
        if query.len() != self.dimensions {
            return Err(MnemaError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut hits: Vec<ScoredMemory> = Vec::new();
        for key in Self::visible_keys(scope) {
            let Some(shard) = self.existing_shard(&key) else {
                continue;
            };
            let guard = shard.read().await;
            for (id, score) in guard.index.search(query, top_k)? {
                if score < min_score {
                    continue;
                }
                if let Some(record) = guard.records.get(&id) {
                    hits.push(ScoredMemory {
                        memory: record.clone(),
                        score,
                    });
                }
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        hits.truncate(top_k);
        debug!(scope = %scope.key(), hits = hits.len(), "similarity search");
        Ok(hits)
    }

    async fn get(
        &self,
        scope: &MemoryScope,
        id: &str,
    ) -> Result<Option<MemoryRecord>, MnemaError> {
        let Some(shard) = self.existing_shard(&scope.key()) else {
            return Ok(None);
        };
        let guard = shard.read().await;
        Ok(guard.records.get(id).cloned())
    }

    async fn list(&self, scope: &MemoryScope) -> Result<Vec<MemoryRecord>, MnemaError> {
        let Some(shard) = self.existing_shard(&scope.key()) else {
            return Ok(Vec::new());
        };
        let guard = shard.read().await;
        let mut records: Vec<MemoryRecord> = guard.records.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn update(&self, record: MemoryRecord) -> Result<(), MnemaError> {
        if record.embedding.len() != self.dimensions {
            return Err(MnemaError::DimensionMismatch {
                expected: self.dimensions,
                actual: record.embedding.len(),
            });
        }
        let shard = self.shard(&record.scope.key());
        let mut guard = shard.write().await;
        if !guard.records.contains_key(&record.id) {
            return Err(MnemaError::Validation(format!(
                "memory `{}` not found in scope",
                record.id
            )));
        }
        guard
            .index
            .insert(record.id.clone(), record.embedding.clone())?;
        guard.records.insert(record.id.clone(), record);
        guard.version = guard.version.wrapping_add(1);
        Ok(())
    }

    async fn delete(&self, scope: &MemoryScope, id: &str) -> Result<bool, MnemaError> {
        let Some(shard) = self.existing_shard(&scope.key()) else {
            return Ok(false);
        };
        let mut guard = shard.write().await;
        let existed = guard.records.remove(id).is_some();
        if existed {
            guard.index.remove(id);
            guard.version = guard.version.wrapping_add(1);
        }
        Ok(existed)
    }

    async fn clear(&self, scope: &MemoryScope) -> Result<usize, MnemaError> {
        let Some(shard) = self.existing_shard(&scope.key()) else {
            return Ok(0);
        };
        let mut guard = shard.write().await;
        let removed = guard.records.len();
        let ids: Vec<String> = guard.records.keys().cloned().collect();
        for id in ids {
            guard.index.remove(&id);
        }
        guard.records.clear();
        guard.version = guard.version.wrapping_add(1);
        Ok(removed)
    }

    async fn count(&self, scope: &MemoryScope) -> Result<usize, MnemaError> {
        let Some(shard) = self.existing_shard(&scope.key()) else {
            return Ok(0);
        };
        let guard = shard.read().await;
        Ok(guard.records.len())
    }

    async fn embedding_count(&self) -> Result<usize, MnemaError> {
        let mut total = 0;
        let keys: Vec<String> = self.shards.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some(shard) = self.existing_shard(&key) {
                total += shard.read().await.index.len();
            }
        }
        Ok(total)
    }

    async fn rebuild_index(&self, cancel: &CancellationToken) -> Result<(), MnemaError> {
        let keys: Vec<String> = self.shards.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if cancel.is_cancelled() {
                debug!("index rebuild cancelled");
                return Ok(());
            }
            let Some(shard) = self.existing_shard(&key) else {
                continue;
            };

            // Snapshot under a short read lock; searches keep hitting the
            // current index while the replacement is built.
            let (mut snapshot, version) = {
                let guard = shard.read().await;
                let pairs: Vec<(String, Vec<f32>)> = guard
                    .records
                    .values()
                    .map(|r| (r.id.clone(), r.embedding.clone()))
                    .collect();
                (pairs, guard.version)
            };
            snapshot.sort_by(|a, b| a.0.cmp(&b.0));

            let mut fresh = self.strategy.build(self.dimensions, self.metric);
            for (id, vector) in snapshot {
                if cancel.is_cancelled() {
                    debug!("index rebuild cancelled");
                    return Ok(());
                }
                fresh.insert(id, vector)?;
            }

            let mut guard = shard.write().await;
            if guard.version == version && !cancel.is_cancelled() {
                guard.index = fresh;
            } else {
                debug!(scope = %key, "discarding stale rebuilt index");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use crate::types::{MemoryImportance, MemoryType};

    fn record(id: &str, scope: MemoryScope, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            scope,
            content: format!("content for {id}"),
            memory_type: MemoryType::Fact,
            importance: MemoryImportance::Medium,
            relevance: 0.5,
            tags: Vec::new(),
            entities: Vec::new(),
            embedding,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::new(3, SimilarityMetric::Cosine, IndexStrategy::Exact)
    }

    #[tokio::test]
    async fn store_and_search_round_trip() {
        let store = store();
        let scope = MemoryScope::user("alice");
        let rec = record("m1", scope.clone(), vec![1.0, 0.0, 0.0]);
        store.store_embeddings(vec![rec]).await.unwrap();

        let hits = store
            .search_similar(&scope, &[1.0, 0.0, 0.0], 5, 0.0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, "m1");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn session_search_sees_user_global_memories() {
        let store = store();
        let global = MemoryScope::user("alice");
        let session = MemoryScope::session("alice", "s1");
        store
            .store_embeddings(vec![
                record("global", global, vec![1.0, 0.0, 0.0]),
                record("local", session.clone(), vec![0.9, 0.1, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .search_similar(&session, &[1.0, 0.0, 0.0], 5, 0.0)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.memory.id.as_str()).collect();
        assert!(ids.contains(&"global"));
        assert!(ids.contains(&"local"));
    }

    #[tokio::test]
    async fn scopes_do_not_leak_across_users() {
        let store = store();
        let alice = MemoryScope::user("alice");
        let bob = MemoryScope::user("bob");
        store
            .store_embeddings(vec![record("m1", alice, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let hits = store
            .search_similar(&bob, &[1.0, 0.0, 0.0], 5, 0.0)
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(store.count(&bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn min_score_filters_weak_matches() {
        let store = store();
        let scope = MemoryScope::user("alice");
        store
            .store_embeddings(vec![
                record("near", scope.clone(), vec![1.0, 0.0, 0.0]),
                record("far", scope.clone(), vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store
            .search_similar(&scope, &[1.0, 0.0, 0.0], 5, 0.5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory.id, "near");
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let store = store();
        let scope = MemoryScope::user("alice");
        let mut old = record("old", scope.clone(), vec![1.0, 0.0, 0.0]);
        old.created_at = Utc::now() - Duration::hours(2);
        let new = record("new", scope.clone(), vec![0.0, 1.0, 0.0]);
        store.store_embeddings(vec![old, new]).await.unwrap();

        let records = store.list(&scope).await.unwrap();
        assert_eq!(records[0].id, "new");
        assert_eq!(records[1].id, "old");
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let store = store();
        let scope = MemoryScope::user("alice");
        let rec = record("m1", scope.clone(), vec![1.0, 0.0, 0.0]);
        let err = store.update(rec.clone()).await.unwrap_err();
        assert!(matches!(err, MnemaError::Validation(_)));

        store.store_embeddings(vec![rec.clone()]).await.unwrap();
        let mut updated = rec;
        updated.content = "revised".to_string();
        store.update(updated).await.unwrap();
        let fetched = store.get(&scope, "m1").await.unwrap().unwrap();
        assert_eq!(fetched.content, "revised");
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let store = store();
        let scope = MemoryScope::user("alice");
        store
            .store_embeddings(vec![
                record("m1", scope.clone(), vec![1.0, 0.0, 0.0]),
                record("m2", scope.clone(), vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        assert!(store.delete(&scope, "m1").await.unwrap());
        assert!(!store.delete(&scope, "m1").await.unwrap());
        assert_eq!(store.count(&scope).await.unwrap(), 1);
        assert_eq!(store.clear(&scope).await.unwrap(), 1);
        assert_eq!(store.embedding_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = store();
        let scope = MemoryScope::user("alice");
        let rec = record("m1", scope.clone(), vec![1.0, 0.0]);
        let err = store.store_embeddings(vec![rec]).await.unwrap_err();
        assert!(matches!(err, MnemaError::DimensionMismatch { .. }));

        let err = store
            .search_similar(&scope, &[1.0], 5, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, MnemaError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn rebuild_swaps_in_equivalent_index() {
        let store = InMemoryStore::new(3, SimilarityMetric::Cosine, IndexStrategy::Graph);
        let scope = MemoryScope::user("alice");
        store
            .store_embeddings(vec![
                record("a", scope.clone(), vec![1.0, 0.0, 0.0]),
                record("b", scope.clone(), vec![0.8, 0.2, 0.0]),
                record("c", scope.clone(), vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();

        let query = [1.0, 0.1, 0.0];
        let before = store.search_similar(&scope, &query, 2, 0.0).await.unwrap();
        store
            .rebuild_index(&CancellationToken::new())
            .await
            .unwrap();
        let after = store.search_similar(&scope, &query, 2, 0.0).await.unwrap();

        let before_ids: Vec<&str> = before.iter().map(|h| h.memory.id.as_str()).collect();
        let after_ids: Vec<&str> = after.iter().map(|h| h.memory.id.as_str()).collect();
        assert_eq!(before_ids, after_ids);
        assert_eq!(store.embedding_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn cancelled_rebuild_keeps_serving_queries() {
        let store = InMemoryStore::new(3, SimilarityMetric::Cosine, IndexStrategy::Graph);
        let scope = MemoryScope::user("alice");
        store
            .store_embeddings(vec![
                record("a", scope.clone(), vec![1.0, 0.0, 0.0]),
                record("b", scope.clone(), vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        store.rebuild_index(&cancel).await.unwrap();

        let hits = store
            .search_similar(&scope, &[1.0, 0.0, 0.0], 5, 0.0)
            .await
            .unwrap();
        assert_eq!(hits[0].memory.id, "a");
    }

    #[tokio::test]
    async fn graph_strategy_matches_exact_for_small_scopes() {
        let exact = InMemoryStore::new(3, SimilarityMetric::Cosine, IndexStrategy::Exact);
        let graph = InMemoryStore::new(3, SimilarityMetric::Cosine, IndexStrategy::Graph);
        let scope = MemoryScope::user("alice");
        let records = vec![
            record("a", scope.clone(), vec![1.0, 0.0, 0.0]),
            record("b", scope.clone(), vec![0.8, 0.2, 0.0]),
            record("c", scope.clone(), vec![0.0, 0.0, 1.0]),
        ];
        exact.store_embeddings(records.clone()).await.unwrap();
        graph.store_embeddings(records).await.unwrap();

        let query = [1.0, 0.1, 0.0];
        let from_exact = exact.search_similar(&scope, &query, 2, 0.0).await.unwrap();
        let from_graph = graph.search_similar(&scope, &query, 2, 0.0).await.unwrap();
        let exact_ids: Vec<&str> = from_exact.iter().map(|h| h.memory.id.as_str()).collect();
        let graph_ids: Vec<&str> = from_graph.iter().map(|h| h.memory.id.as_str()).collect();
        assert_eq!(exact_ids, graph_ids);
    }
}
