// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed storage backend with vector BLOB storage.
//!
//! Embeddings live as little-endian f32 BLOBs next to the record row and
//! are scored in-process after a scoped fetch. SQLite serializes writers,
//! which gives the per-scope write ordering guarantee for free.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnema_core::traits::PluginAdapter;
use mnema_core::types::{AdapterType, HealthStatus};
use mnema_core::MnemaError;
use tokio_rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::similarity::SimilarityMetric;
use crate::store::MemoryBackend;
use crate::types::{
    MemoryImportance, MemoryRecord, MemoryScope, MemoryType, NamedEntity, ScoredMemory,
    blob_to_vec, vec_to_blob,
};

/// Helper to convert tokio_rusqlite errors into MnemaError::Storage.
fn storage_err(e: tokio_rusqlite::Error) -> MnemaError {
    MnemaError::Storage {
        source: Box::new(e),
    }
}

const SELECT_COLUMNS: &str = "id, user_id, session_id, content, memory_type, importance, \
     relevance, tags, entities, embedding, created_at, updated_at";

/// Persistent store for memory records in SQLite.
pub struct SqliteStore {
    conn: Connection,
    metric: SimilarityMetric,
    wal_mode: bool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub async fn open(
        path: &str,
        metric: SimilarityMetric,
        wal_mode: bool,
    ) -> Result<Self, MnemaError> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| MnemaError::Storage {
                source: Box::new(e),
            })?;
        }
        let conn = Connection::open(path).await.map_err(|e| MnemaError::Storage {
            source: Box::new(e),
        })?;
        Ok(Self {
            conn,
            metric,
            wal_mode,
        })
    }

    /// Open an in-memory database, used by tests.
    pub async fn open_in_memory(metric: SimilarityMetric) -> Result<Self, MnemaError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| MnemaError::Storage {
                source: Box::new(e),
            })?;
        Ok(Self {
            conn,
            metric,
            wal_mode: false,
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemaError> {
        let result = self
            .conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
            .map_err(storage_err);
        match result {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), MnemaError> {
        Ok(())
    }
}

#[async_trait]
impl MemoryBackend for SqliteStore {
    async fn initialize(&self) -> Result<(), MnemaError> {
        let wal_mode = self.wal_mode;
        self.conn
            .call(move |conn| {
                if wal_mode {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                }
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS memories (
                        id TEXT PRIMARY KEY NOT NULL,
                        user_id TEXT NOT NULL,
                        session_id TEXT,
                        content TEXT NOT NULL,
                        memory_type TEXT NOT NULL,
                        importance TEXT NOT NULL,
                        relevance REAL NOT NULL DEFAULT 0.0,
                        tags TEXT NOT NULL DEFAULT '[]',
                        entities TEXT NOT NULL DEFAULT '[]',
                        embedding BLOB NOT NULL,
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_memories_scope
                        ON memories(user_id, session_id);
                    CREATE INDEX IF NOT EXISTS idx_memories_created
                        ON memories(created_at);",
                )?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn store_embeddings(&self, records: Vec<MemoryRecord>) -> Result<(), MnemaError> {
        if records.is_empty() {
            return Ok(());
        }
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for record in &records {
                    tx.execute(
                        "INSERT OR REPLACE INTO memories (id, user_id, session_id, content, memory_type, importance, relevance, tags, entities, embedding, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                        rusqlite::params![
                            record.id,
                            record.scope.user_id,
                            record.scope.session_id,
                            record.content,
                            record.memory_type.to_string(),
                            record.importance.to_string(),
                            record.relevance,
                            serde_json::to_string(&record.tags).unwrap_or_default(),
                            serde_json::to_string(&record.entities).unwrap_or_default(),
                            vec_to_blob(&record.embedding),
                            record.created_at.to_rfc3339(),
                            record.updated_at.to_rfc3339(),
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }

    async fn search_similar(
        &self,
        scope: &MemoryScope,
        query: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredMemory>, MnemaError> {
        let user_id = scope.user_id.clone();
        let session_id = scope.session_id.clone();
        let candidates = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM memories WHERE user_id = ?1 AND (session_id IS NULL OR session_id IS ?2)",
                ))?;
                let records = stmt
                    .query_map(rusqlite::params![user_id, session_id], |row| {
                        Ok(row_to_record(row))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(storage_err)?;

        let mut hits: Vec<ScoredMemory> = Vec::new();
        for record in candidates {
            if record.embedding.len() != query.len() {
                return Err(MnemaError::DimensionMismatch {
                    expected: query.len(),
                    actual: record.embedding.len(),
                });
            }
            let score = self.metric.score(query, &record.embedding);
            if score >= min_score {
                hits.push(ScoredMemory {
                    memory: record,
                    score,
                });
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
        let id = id.to_string();
        let user_id = scope.user_id.clone();
        let session_id = scope.session_id.clone();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM memories WHERE id = ?1 AND user_id = ?2 AND session_id IS ?3",
                ))?;
                let record = stmt
                    .query_row(rusqlite::params![id, user_id, session_id], |row| {
                        Ok(row_to_record(row))
                    })
                    .optional()?;
                Ok(record)
            })
            .await
            .map_err(storage_err)
    }

    async fn list(&self, scope: &MemoryScope) -> Result<Vec<MemoryRecord>, MnemaError> {
        let user_id = scope.user_id.clone();
        let session_id = scope.session_id.clone();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM memories WHERE user_id = ?1 AND session_id IS ?2 ORDER BY created_at DESC, id ASC",
                ))?;
                let records = stmt
                    .query_map(rusqlite::params![user_id, session_id], |row| {
                        Ok(row_to_record(row))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(storage_err)
    }

    async fn update(&self, record: MemoryRecord) -> Result<(), MnemaError> {
        let id = record.id.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "UPDATE memories SET content = ?1, memory_type = ?2, importance = ?3, relevance = ?4, tags = ?5, entities = ?6, embedding = ?7, updated_at = ?8 WHERE id = ?9 AND user_id = ?10 AND session_id IS ?11",
                    rusqlite::params![
                        record.content,
                        record.memory_type.to_string(),
                        record.importance.to_string(),
                        record.relevance,
                        serde_json::to_string(&record.tags).unwrap_or_default(),
                        serde_json::to_string(&record.entities).unwrap_or_default(),
                        vec_to_blob(&record.embedding),
                        record.updated_at.to_rfc3339(),
                        record.id,
                        record.scope.user_id,
                        record.scope.session_id,
                    ],
                )?;
                Ok(changed)
            })
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(MnemaError::Validation(format!(
                "memory `{id}` not found in scope"
            )));
        }
        Ok(())
    }

    async fn delete(&self, scope: &MemoryScope, id: &str) -> Result<bool, MnemaError> {
        let id = id.to_string();
        let user_id = scope.user_id.clone();
        let session_id = scope.session_id.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM memories WHERE id = ?1 AND user_id = ?2 AND session_id IS ?3",
                    rusqlite::params![id, user_id, session_id],
                )?;
                Ok(changed)
            })
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    async fn clear(&self, scope: &MemoryScope) -> Result<usize, MnemaError> {
        let user_id = scope.user_id.clone();
        let session_id = scope.session_id.clone();
        self.conn
            .call(move |conn| {
                let changed = conn.execute(
                    "DELETE FROM memories WHERE user_id = ?1 AND session_id IS ?2",
                    rusqlite::params![user_id, session_id],
                )?;
                Ok(changed)
            })
            .await
            .map_err(storage_err)
    }

    async fn count(&self, scope: &MemoryScope) -> Result<usize, MnemaError> {
        let user_id = scope.user_id.clone();
        let session_id = scope.session_id.clone();
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE user_id = ?1 AND session_id IS ?2",
                    rusqlite::params![user_id, session_id],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(storage_err)
    }

    async fn embedding_count(&self) -> Result<usize, MnemaError> {
        self.conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(storage_err)
    }

    async fn rebuild_index(&self, cancel: &CancellationToken) -> Result<(), MnemaError> {
        if cancel.is_cancelled() {
            return Ok(());
        }
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA optimize;")?;
                Ok(())
            })
            .await
            .map_err(storage_err)
    }
}

/// Convert a rusqlite Row to a MemoryRecord.
fn row_to_record(row: &rusqlite::Row) -> MemoryRecord {
    let memory_type: String = row.get(4).unwrap_or_default();
    let importance: String = row.get(5).unwrap_or_default();
    let tags_json: String = row.get(7).unwrap_or_default();
    let entities_json: String = row.get(8).unwrap_or_default();
    let embedding_blob: Vec<u8> = row.get(9).unwrap_or_default();
    let created_at: String = row.get(10).unwrap_or_default();
    let updated_at: String = row.get(11).unwrap_or_default();

    MemoryRecord {
        id: row.get(0).unwrap_or_default(),
        scope: MemoryScope {
            user_id: row.get(1).unwrap_or_default(),
            session_id: row.get(2).unwrap_or(None),
        },
        content: row.get(3).unwrap_or_default(),
        memory_type: MemoryType::from_label(&memory_type),
        importance: MemoryImportance::from_label(&importance),
        relevance: row.get(6).unwrap_or(0.0),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        entities: serde_json::from_str::<Vec<NamedEntity>>(&entities_json).unwrap_or_default(),
        embedding: blob_to_vec(&embedding_blob),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Extension trait for optional row queries.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
