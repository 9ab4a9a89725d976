// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory manager: the orchestration facade over classifier, store, and
//! retention policy.
//!
//! Conversation-path operations (message enhancement, interaction
//! processing) degrade gracefully on provider failures; explicit user
//! commands surface errors to the caller. Storage errors always surface.

use std::sync::Arc;

use chrono::Utc;
use mnema_core::traits::{EmbeddingAdapter, ProviderAdapter};
use mnema_core::types::ChatMessage;
use mnema_core::MnemaError;
use mnema_config::MnemaConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{MemoryClassifier, find_most_similar};
use crate::consolidation::{ConsolidationCriteria, suggest_consolidations};
use crate::retention::RetentionPolicy;
use crate::store::{MemoryBackend, open_backend};
use crate::types::{
    ConsolidationSuggestion, MemoryClassification, MemoryContext, MemoryImportance,
    MemoryRecord, MemoryScope, ScoredMemory,
};

/// Explicit memories never land below this importance: the user asked for
/// them by name.
const EXPLICIT_MIN_IMPORTANCE: MemoryImportance = MemoryImportance::Medium;

/// Relevance floor applied to explicit memories.
const EXPLICIT_MIN_RELEVANCE: f64 = 0.8;

/// Orchestrates classification, storage, retrieval, and retention.
pub struct MemoryManager {
    store: Arc<dyn MemoryBackend>,
    classifier: MemoryClassifier,
    config: MnemaConfig,
    policy: RetentionPolicy,
    consolidation: ConsolidationCriteria,
}

impl MemoryManager {
    pub fn new(
        store: Arc<dyn MemoryBackend>,
        provider: Arc<dyn ProviderAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        config: MnemaConfig,
    ) -> Self {
        let classifier = MemoryClassifier::new(provider, embedder, &config.memory);
        let policy = RetentionPolicy::from_config(&config.memory);
        let consolidation = ConsolidationCriteria::from_config(&config.memory.consolidation);
        Self {
            store,
            classifier,
            config,
            policy,
            consolidation,
        }
    }

    /// Construct the manager with the backend named in the configuration.
    pub async fn from_config(
        provider: Arc<dyn ProviderAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        config: MnemaConfig,
    ) -> Result<Self, MnemaError> {
        let store = open_backend(&config).await?;
        Ok(Self::new(store, provider, embedder, config))
    }

    pub fn store(&self) -> &Arc<dyn MemoryBackend> {
        &self.store
    }

    /// Build the per-call context from caller-supplied identifiers.
    ///
    /// With anonymous mode on, a missing user id gets a generated one, a
    /// missing session id alongside it gets one too, and the context is
    /// flagged anonymous; with it off, a missing user id is a validation
    /// error. A caller-supplied user id with no session id stays
    /// user-global.
    pub fn load_context(
        &self,
        user_id: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<MemoryContext, MnemaError> {
        let (user_id, generated) = match user_id {
            Some(id) if !id.trim().is_empty() => (id.to_string(), false),
            _ if self.config.memory.anonymous_mode => {
                (format!("anon-{}", Uuid::new_v4()), true)
            }
            _ => {
                return Err(MnemaError::Validation(
                    "user id is required when anonymous mode is disabled".to_string(),
                ));
            }
        };
        let session_id = match session_id {
            Some(id) => Some(id.to_string()),
            None if generated => Some(format!("anon-{}", Uuid::new_v4())),
            None => None,
        };

        let mut context = MemoryContext::new(user_id, session_id);
        context.is_anonymous = generated;
        context.was_generated = generated;
        Ok(context)
    }

    /// Prepend relevant memories to a conversation turn.
    ///
    /// Never fails: any provider, embedding, or storage problem logs a
    /// warning and returns the messages unchanged.
    pub async fn enhance_messages(
        &self,
        messages: Vec<ChatMessage>,
        context: &MemoryContext,
    ) -> Vec<ChatMessage> {
        if !self.config.memory.enabled {
            return messages;
        }
        let Some(query) = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
        else {
            return messages;
        };

        let hits = match self.search_memories(context, &query, None).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("memory retrieval failed, continuing without context: {e}");
                return messages;
            }
        };
        if hits.is_empty() {
            return messages;
        }

        let mut memory_text = String::from("## Relevant Memories\n");
        for scored in &hits {
            memory_text.push_str(&format!("- {}\n", scored.memory.content));
        }
        debug!(count = hits.len(), "injecting memories into context");

        let mut enhanced = Vec::with_capacity(messages.len() + 1);
        enhanced.push(ChatMessage {
            role: "system".to_string(),
            content: memory_text,
        });
        enhanced.extend(messages);
        enhanced
    }

    /// Extract and store memorable facts from a completed interaction.
    ///
    /// Provider and embedding failures skip the affected fact (or the whole
    /// interaction) with a warning; storage errors surface. Ends with a
    /// retention pass over the scope.
    pub async fn process_interaction(
        &self,
        messages: &[ChatMessage],
        context: &MemoryContext,
    ) -> Result<Vec<MemoryRecord>, MnemaError> {
        if !self.config.memory.enabled {
            return Ok(Vec::new());
        }

        let facts = match self.classifier.extract_facts(messages).await {
            Ok(facts) => facts,
            Err(e) => {
                warn!("fact extraction failed, skipping interaction: {e}");
                return Ok(Vec::new());
            }
        };
        if facts.is_empty() {
            return Ok(Vec::new());
        }

        let scope = context.scope();
        let mut existing = self.store.list(&scope).await?;
        let mut stored = Vec::new();

        for fact in facts {
            let accepted = self
                .classifier
                .should_update(&fact, context, &existing, self.policy.min_importance)
                .await;
            if !accepted {
                continue;
            }

            let classification = self.classifier.classify(&fact, context, None).await;
            if !self
                .policy
                .admits(classification.memory_type, classification.importance)
            {
                debug!(fact = %fact, "classified below importance floor");
                continue;
            }

            let embedding = match self.classifier.embed_one(&fact).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!("embedding failed for extracted fact, skipping: {e}");
                    continue;
                }
            };

            let record = build_record(scope.clone(), fact, classification, embedding);
            self.store.store_embeddings(vec![record.clone()]).await?;
            // Later facts in the same batch dedup against this one too.
            existing.push(record.clone());
            stored.push(record);
        }

        let evicted = self.enforce_retention(&scope).await?;
        if evicted > 0 {
            info!(evicted, scope = %scope.key(), "retention pass evicted memories");
        }
        Ok(stored)
    }

    /// Explicitly store a memory on the user's request.
    ///
    /// Explicit memories get floor-raised importance and relevance, and a
    /// duplicate at or above the duplicate threshold is superseded: the old
    /// record is removed and the new one stored. Errors surface.
    pub async fn add_memory(
        &self,
        content: &str,
        context: &MemoryContext,
    ) -> Result<MemoryRecord, MnemaError> {
        let content = strip_remember_prefix(content);
        if content.is_empty() {
            return Err(MnemaError::Validation(
                "cannot store an empty memory".to_string(),
            ));
        }

        let scope = context.scope();
        let mut classification = self.classifier.classify(content, context, None).await;
        classification.importance = classification.importance.max(EXPLICIT_MIN_IMPORTANCE);
        classification.relevance = classification.relevance.max(EXPLICIT_MIN_RELEVANCE);

        let embedding = self.classifier.embed_one(content).await?;

        let existing = self.store.list(&scope).await?;
        let superseded = find_most_similar(&embedding, &existing)
            .filter(|(_, score)| *score >= self.config.memory.duplicate_threshold as f32)
            .map(|(duplicate, score)| {
                debug!(superseded = %duplicate.id, score, "explicit memory supersedes duplicate");
                duplicate.id.clone()
            });
        if let Some(id) = superseded {
            self.store.delete(&scope, &id).await?;
        }

        let record = build_record(scope.clone(), content.to_string(), classification, embedding);
        self.store.store_embeddings(vec![record.clone()]).await?;
        self.enforce_retention(&scope).await?;
        Ok(record)
    }

    /// Replace a memory's content, re-embedding it. The id and creation
    /// timestamp are preserved.
    pub async fn update_memory(
        &self,
        context: &MemoryContext,
        id: &str,
        content: &str,
    ) -> Result<MemoryRecord, MnemaError> {
        let scope = context.scope();
        let Some(mut record) = self.store.get(&scope, id).await? else {
            return Err(MnemaError::Validation(format!("memory `{id}` not found")));
        };
        record.content = content.to_string();
        record.embedding = self.classifier.embed_one(content).await?;
        record.updated_at = Utc::now();
        self.store.update(record.clone()).await?;
        Ok(record)
    }

    /// Delete a memory by id. Returns whether it existed.
    pub async fn delete_memory(
        &self,
        context: &MemoryContext,
        id: &str,
    ) -> Result<bool, MnemaError> {
        self.store.delete(&context.scope(), id).await
    }

    /// Delete every memory in the context's scope.
    pub async fn clear_memory(&self, context: &MemoryContext) -> Result<usize, MnemaError> {
        self.store.clear(&context.scope()).await
    }

    /// List the scope's memories: newest first, or by stored relevance
    /// descending when `by_relevance` is set.
    pub async fn get_existing_memories(
        &self,
        context: &MemoryContext,
        limit: usize,
        by_relevance: bool,
    ) -> Result<Vec<MemoryRecord>, MnemaError> {
        let mut records = self.store.list(&context.scope()).await?;
        if by_relevance {
            records.sort_by(|a, b| {
                b.relevance
                    .total_cmp(&a.relevance)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        records.truncate(limit);
        Ok(records)
    }

    /// Semantic search over the scope (plus the user-global scope for
    /// session contexts).
    pub async fn search_memories(
        &self,
        context: &MemoryContext,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredMemory>, MnemaError> {
        let embedding = self.classifier.embed_one(query).await?;
        self.store
            .search_similar(
                &context.scope(),
                &embedding,
                limit.unwrap_or(self.config.memory.retrieval_limit),
                self.config.memory.similarity_threshold as f32,
            )
            .await
    }

    /// Propose consolidations for the scope's memories. Advisory only.
    pub async fn suggest_consolidations(
        &self,
        context: &MemoryContext,
    ) -> Result<Vec<ConsolidationSuggestion>, MnemaError> {
        let records = self.store.list(&context.scope()).await?;
        Ok(suggest_consolidations(&records, &self.consolidation))
    }

    /// Delete the scope's lowest-priority overflow. Returns the eviction
    /// count.
    pub async fn enforce_retention(&self, scope: &MemoryScope) -> Result<usize, MnemaError> {
        let records = self.store.list(scope).await?;
        let evictions = self.policy.select_evictions(&records);
        let mut evicted = 0;
        for id in &evictions {
            if self.store.delete(scope, id).await? {
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Rebuild backend index structures, honoring cancellation.
    pub async fn rebuild_index(&self, cancel: &CancellationToken) -> Result<(), MnemaError> {
        self.store.rebuild_index(cancel).await
    }

    /// Plain-text command surface for chat-embedded memory control.
    ///
    /// Supports `remember ...`, `search <query>`, `forget <id>`, `list`,
    /// and `clear`. Anything else returns a usage hint.
    pub async fn run(
        &self,
        message: &str,
        context: &MemoryContext,
    ) -> Result<String, MnemaError> {
        let trimmed = message.trim();

        if strip_prefix_ci(trimmed, "remember").is_some() {
            let record = self.add_memory(trimmed, context).await?;
            return Ok(format!("Remembered: {}", record.content));
        }
        if let Some(query) = strip_prefix_ci(trimmed, "search ")
            .or_else(|| strip_prefix_ci(trimmed, "recall "))
        {
            let hits = self.search_memories(context, query.trim(), None).await?;
            if hits.is_empty() {
                return Ok("No matching memories.".to_string());
            }
            let mut out = String::new();
            for hit in &hits {
                out.push_str(&format!(
                    "[{}] {} ({:.2})\n",
                    hit.memory.id, hit.memory.content, hit.score
                ));
            }
            return Ok(out.trim_end().to_string());
        }
        if let Some(id) = strip_prefix_ci(trimmed, "forget ") {
            return Ok(if self.delete_memory(context, id.trim()).await? {
                "Forgotten.".to_string()
            } else {
                "No such memory.".to_string()
            });
        }
        if trimmed.eq_ignore_ascii_case("list") {
            let records = self
                .get_existing_memories(context, self.config.memory.max_memories, false)
                .await?;
            if records.is_empty() {
                return Ok("No memories stored.".to_string());
            }
            let mut out = String::new();
            for record in &records {
                out.push_str(&format!("[{}] {}\n", record.id, record.content));
            }
            return Ok(out.trim_end().to_string());
        }
        if trimmed.eq_ignore_ascii_case("clear") {
            let removed = self.clear_memory(context).await?;
            return Ok(format!("Cleared {removed} memories."));
        }

        Ok("Commands: remember <content>, search <query>, forget <id>, list, clear".to_string())
    }
}

fn build_record(
    scope: MemoryScope,
    content: String,
    classification: MemoryClassification,
    embedding: Vec<f32>,
) -> MemoryRecord {
    let now = Utc::now();
    MemoryRecord {
        id: Uuid::new_v4().to_string(),
        scope,
        content,
        memory_type: classification.memory_type,
        importance: classification.importance,
        relevance: classification.relevance,
        tags: classification.tags,
        entities: classification.entities,
        embedding,
        created_at: now,
        updated_at: now,
    }
}

/// Case-insensitive ASCII prefix strip that never slices mid-character.
fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

/// Strip "remember this:", "remember that", etc. prefixes from explicit
/// memory text.
fn strip_remember_prefix(text: &str) -> &str {
    let text = text.trim();
    let prefixes = [
        "remember this:",
        "remember that:",
        "remember:",
        "remember this ",
        "remember that ",
        "remember ",
    ];

    for prefix in &prefixes {
        if let Some(rest) = strip_prefix_ci(text, prefix) {
            return rest.trim();
        }
    }

    text
}
