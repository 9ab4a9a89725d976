// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic test doubles shared across the crate's test modules.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use mnema_core::traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
use mnema_core::types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus, ProviderRequest,
    ProviderResponse,
};
use mnema_core::MnemaError;

use crate::types::{MemoryImportance, MemoryRecord, MemoryScope, MemoryType};

/// Embedder that maps known keywords to fixed dimensions and normalizes.
///
/// Texts sharing keywords get high cosine similarity; identical texts get
/// identical vectors. Texts with no known keyword fall back to a hash so
/// the vector is never zero.
pub(crate) struct KeywordEmbedder {
    dimensions: usize,
    lexicon: HashMap<String, usize>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            lexicon: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_lexicon(dimensions: usize, entries: &[(&str, usize)]) -> Self {
        let mut embedder = Self::new(dimensions);
        for (word, dim) in entries {
            embedder.lexicon.insert(word.to_string(), dim % dimensions);
        }
        embedder
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        let lower = text.to_lowercase();
        for word in lower.split(|c: char| !c.is_alphanumeric()) {
            if let Some(&dim) = self.lexicon.get(word) {
                vector[dim] += 1.0;
            }
        }
        if vector.iter().all(|v| *v == 0.0) {
            let hash: usize = lower.bytes().fold(0usize, |acc, b| {
                acc.wrapping_mul(31).wrapping_add(b as usize)
            });
            vector[hash % self.dimensions] = 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl PluginAdapter for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 0, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MnemaError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for KeywordEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| self.embed_text(t)).collect(),
            dimensions: self.dimensions,
        })
    }
}

/// Provider that replays scripted responses in order and counts calls.
///
/// Once the script is exhausted every further call fails with a
/// non-retryable validation error so tests fail fast instead of retrying.
pub(crate) struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    exhausted_retryable: bool,
}

impl ScriptedProvider {
    pub(crate) fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            exhausted_retryable: false,
        }
    }

    /// Like `new`, but exhaustion produces a retryable provider error, for
    /// exercising the backoff-then-degrade path.
    pub(crate) fn with_retryable_failures(responses: Vec<&str>) -> Self {
        Self {
            exhausted_retryable: true,
            ..Self::new(responses)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PluginAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 0, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, MnemaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MnemaError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, MnemaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = request.messages.first() {
            self.prompts.lock().unwrap().push(message.content.clone());
        }
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(content) => Ok(ProviderResponse {
                content,
                usage: None,
            }),
            None if self.exhausted_retryable => Err(MnemaError::Provider {
                message: "scripted provider exhausted".to_string(),
                source: None,
            }),
            None => Err(MnemaError::Validation(
                "scripted provider exhausted".to_string(),
            )),
        }
    }
}

pub(crate) fn make_record(
    id: &str,
    scope: MemoryScope,
    content: &str,
    embedding: Vec<f32>,
) -> MemoryRecord {
    MemoryRecord {
        id: id.to_string(),
        scope,
        content: content.to_string(),
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
