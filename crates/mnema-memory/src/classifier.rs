// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model-backed memory classification and fact extraction.
//!
//! The classifier decides what is worth remembering (the should-update
//! gate), classifies accepted content into type/importance/tags, and
//! extracts candidate facts from whole conversations. Model calls use
//! bounded backoff; on exhaustion the caller gets conservative defaults
//! instead of an error.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use mnema_core::retry::{DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, with_backoff};
use mnema_core::traits::{EmbeddingAdapter, ProviderAdapter};
use mnema_core::types::{ChatMessage, EmbeddingInput, ProviderRequest};
use mnema_core::MnemaError;
use mnema_config::MemoryConfig;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::similarity::cosine_similarity;
use crate::types::{
    MemoryClassification, MemoryContext, MemoryImportance, MemoryRecord, MemoryType,
    NamedEntity, SentimentAnalysis, SimilarMemory, SimilarityType, UserProfile,
};

/// Similarity at or above which a match is reported as an exact duplicate.
pub const EXACT_DUPLICATE_THRESHOLD: f32 = 0.98;

/// Inputs that never reach the model: acknowledgments, greetings, filler.
const TRIVIAL_INPUTS: &[&str] = &[
    "ok", "okay", "k", "kk", "yes", "no", "yep", "nope", "yeah", "nah", "sure", "thanks",
    "thank you", "thx", "ty", "hi", "hello", "hey", "bye", "goodbye", "lol", "haha", "hmm",
    "hm", "cool", "nice", "great", "good", "fine",
];

/// First-person markers that raise the relevance heuristic.
const FIRST_PERSON_MARKERS: &[&str] = &["i ", "i'm", "i've", "my ", "me ", "mine", "we "];

/// Preference and durable-fact verbs that raise the relevance heuristic.
const PREFERENCE_MARKERS: &[&str] = &[
    "like", "love", "hate", "prefer", "favorite", "always", "never", "allergic",
];

/// The built-in memory type taxonomy offered to the classification model.
const DEFAULT_CATEGORIES: &[&str] = &[
    "fact",
    "preference",
    "conversation",
    "task",
    "context",
    "instruction",
    "feedback",
    "question",
    "answer",
    "other",
];

/// System prompt for content classification.
const CLASSIFICATION_PROMPT: &str = r#"Classify this content for long-term memory storage. Output a single JSON object.

Fields:
- "memory_type": One of: {categories}
- "importance": One of: very_low, low, medium, high, critical
- "tags": Array of up to {max_tags} short lowercase topic tags
- "topic": A short topic label, or null
- "entities": Array of {"text": ..., "entity_type": ..., "confidence": 0.0-1.0} for named entities in the content
- "sentiment": {"positive": 0.0-1.0, "negative": 0.0-1.0, "neutral": 0.0-1.0}

Content:
{content}

Output JSON object only, no explanation:"#;

/// System prompt for fact extraction from conversations.
const EXTRACTION_PROMPT: &str = r#"Extract factual information from this conversation that would be useful to remember for future conversations. Output as JSON array of strings.

Only include facts that are:
1. Stated by the user (not the assistant)
2. Specific and factual (not opinions unless explicitly stated as preferences)
3. Likely to be relevant in future conversations

Each fact must be a standalone statement (e.g., "The user's dog is named Max").

If no memorable facts, return an empty array: []

Conversation:
{conversation}

Output JSON array only, no explanation:"#;

const TAG_PROMPT: &str = r#"List up to {max_tags} short lowercase topic tags for this content as a JSON array of strings.

Content:
{content}

Output JSON array only, no explanation:"#;

const ENTITY_PROMPT: &str = r#"Extract named entities (people, places, organizations, dates, products) from this content. Output a JSON array of objects with "text", "entity_type", and "confidence" (0.0-1.0).

Content:
{content}

Output JSON array only, no explanation:"#;

const SENTIMENT_PROMPT: &str = r#"Score the sentiment of this content. Output a JSON object with "positive", "negative", and "neutral" values between 0.0 and 1.0 summing to 1.

Content:
{content}

Output JSON object only, no explanation:"#;

/// Raw shape of a classification response before label parsing.
#[derive(Debug, Deserialize)]
struct RawClassification {
    memory_type: String,
    importance: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    sentiment: Option<RawSentiment>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    text: String,
    entity_type: String,
    #[serde(default = "default_entity_confidence")]
    confidence: f64,
}

fn default_entity_confidence() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
struct RawSentiment {
    #[serde(default)]
    positive: f64,
    #[serde(default)]
    negative: f64,
    #[serde(default)]
    neutral: f64,
}

/// Classifies content and extracts facts via the configured model.
pub struct MemoryClassifier {
    provider: Arc<dyn ProviderAdapter>,
    embedder: Arc<dyn EmbeddingAdapter>,
    model: String,
    max_tokens: u32,
    duplicate_threshold: f32,
    max_tags: usize,
    categories: Vec<String>,
    extraction_template: Option<String>,
}

impl MemoryClassifier {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        embedder: Arc<dyn EmbeddingAdapter>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            provider,
            embedder,
            model: config.classification_model.clone(),
            max_tokens: config.classification_max_tokens,
            duplicate_threshold: config.duplicate_threshold as f32,
            max_tags: config.max_tags,
            categories: config.categories.clone(),
            extraction_template: config.extraction_template.clone(),
        }
    }

    /// Replace the category taxonomy offered to the classification model.
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// Replace the extraction prompt. The template must contain a
    /// `{conversation}` placeholder.
    pub fn with_extraction_template(mut self, template: String) -> Self {
        self.extraction_template = Some(template);
        self
    }

    /// Decide whether `content` is worth storing.
    ///
    /// Trivial input is rejected without any model or embedding call. A
    /// failure anywhere downgrades to rejection rather than an error, so
    /// a flaky embedder never blocks the conversation.
    pub async fn should_update(
        &self,
        content: &str,
        context: &MemoryContext,
        existing: &[MemoryRecord],
        min_importance: MemoryImportance,
    ) -> bool {
        if is_trivial(content) {
            debug!("skipping trivial content");
            return false;
        }

        let relevance = self.calculate_relevance(content, context, None);
        if relevance < min_importance.relevance_floor() {
            debug!(relevance, "content below relevance floor");
            return false;
        }

        if existing.is_empty() {
            return true;
        }
        let embedding = match self.embed_one(content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("embedding failed during dedup check, rejecting content: {e}");
                return false;
            }
        };
        if let Some((record, score)) = find_most_similar(&embedding, existing)
            && score >= self.duplicate_threshold
        {
            debug!(duplicate_of = %record.id, score, "content is a duplicate");
            return false;
        }
        true
    }

    /// Heuristic relevance score in [0, 1]. No model call.
    ///
    /// Base 0.3, plus recency of the context timestamp, first-person and
    /// preference markers, and the strongest matching profile topic weight.
    pub fn calculate_relevance(
        &self,
        content: &str,
        context: &MemoryContext,
        profile: Option<&UserProfile>,
    ) -> f64 {
        let lower = content.to_lowercase();
        let mut score = 0.3;

        let age_hours = (Utc::now() - context.timestamp).num_minutes().max(0) as f64 / 60.0;
        score += 0.2 / (1.0 + age_hours / 24.0);

        if FIRST_PERSON_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 0.25;
        }
        if PREFERENCE_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 0.15;
        }
        if let Some(profile) = profile {
            let weight = profile
                .topic_preferences
                .iter()
                .filter(|(topic, _)| lower.contains(&topic.to_lowercase()))
                .map(|(_, weight)| *weight)
                .fold(0.0_f64, f64::max);
            score += 0.2 * weight.clamp(0.0, 1.0);
        }

        score.clamp(0.0, 1.0)
    }

    /// Classify content into type, importance, tags, entities, and
    /// sentiment. Never fails: after retries are exhausted the
    /// conservative default comes back instead.
    pub async fn classify(
        &self,
        content: &str,
        context: &MemoryContext,
        profile: Option<&UserProfile>,
    ) -> MemoryClassification {
        let prompt = self.build_classification_prompt(content);
        let response = match self.complete_with_backoff("classification", prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("classification failed, using conservative default: {e}");
                return MemoryClassification::conservative_default();
            }
        };

        let Some(raw) = parse_classification_response(&response) else {
            warn!("unparseable classification response, using conservative default");
            return MemoryClassification::conservative_default();
        };

        let memory_type = MemoryType::from_label(&raw.memory_type);
        let mut tags = raw.tags;
        // A label outside the canonical taxonomy still lands in Other,
        // but survives as a tag for retrieval.
        let raw_label = raw.memory_type.trim().to_lowercase();
        if memory_type == MemoryType::Other
            && !raw_label.is_empty()
            && raw_label != "other"
            && !tags.contains(&raw_label)
        {
            tags.push(raw_label);
        }
        tags.truncate(self.max_tags);

        let entities = raw
            .entities
            .into_iter()
            .map(|e| NamedEntity {
                span: content.find(&e.text).map(|at| (at, at + e.text.len())),
                text: e.text,
                entity_type: e.entity_type,
                confidence: e.confidence.clamp(0.0, 1.0),
            })
            .collect();
        let sentiment = raw
            .sentiment
            .map(|s| SentimentAnalysis::from_scores(s.positive, s.negative, s.neutral))
            .unwrap_or_default();

        MemoryClassification {
            memory_type,
            importance: MemoryImportance::from_label(&raw.importance),
            relevance: self.calculate_relevance(content, context, profile),
            tags,
            entities,
            sentiment,
            topic: raw.topic.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Extract candidate facts from a conversation.
    ///
    /// Provider failures propagate after retries so the caller can log and
    /// skip the whole interaction; an unparseable response is an empty list.
    pub async fn extract_facts(
        &self,
        conversation: &[ChatMessage],
    ) -> Result<Vec<String>, MnemaError> {
        let conversation_text = format_conversation(conversation);
        if conversation_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let template = self
            .extraction_template
            .as_deref()
            .unwrap_or(EXTRACTION_PROMPT);
        let prompt = template.replace("{conversation}", &conversation_text);

        let response = self.complete_with_backoff("fact extraction", prompt).await?;
        Ok(parse_string_array(&response))
    }

    /// Extract topic tags, capped at the configured maximum. Failures
    /// degrade to an empty list.
    pub async fn extract_tags(&self, content: &str) -> Vec<String> {
        let prompt = TAG_PROMPT
            .replace("{max_tags}", &self.max_tags.to_string())
            .replace("{content}", content);
        match self.complete_with_backoff("tag extraction", prompt).await {
            Ok(response) => {
                let mut tags = parse_string_array(&response);
                for tag in &mut tags {
                    *tag = tag.trim().to_lowercase();
                }
                tags.retain(|t| !t.is_empty());
                // First occurrence wins; duplicates may be non-adjacent.
                let mut seen = HashSet::new();
                tags.retain(|t| seen.insert(t.clone()));
                tags.truncate(self.max_tags);
                tags
            }
            Err(e) => {
                warn!("tag extraction failed: {e}");
                Vec::new()
            }
        }
    }

    /// Extract named entities with byte spans where the entity text is
    /// locatable in the content. Failures degrade to an empty list.
    pub async fn extract_entities(&self, content: &str) -> Vec<NamedEntity> {
        let prompt = ENTITY_PROMPT.replace("{content}", content);
        match self.complete_with_backoff("entity extraction", prompt).await {
            Ok(response) => parse_entity_array(&response)
                .into_iter()
                .map(|e| NamedEntity {
                    span: content.find(&e.text).map(|at| (at, at + e.text.len())),
                    text: e.text,
                    entity_type: e.entity_type,
                    confidence: e.confidence.clamp(0.0, 1.0),
                })
                .collect(),
            Err(e) => {
                warn!("entity extraction failed: {e}");
                Vec::new()
            }
        }
    }

    /// Score sentiment of content. Failures degrade to neutral.
    pub async fn analyze_sentiment(&self, content: &str) -> SentimentAnalysis {
        let prompt = SENTIMENT_PROMPT.replace("{content}", content);
        match self.complete_with_backoff("sentiment analysis", prompt).await {
            Ok(response) => parse_sentiment(&response).unwrap_or_default(),
            Err(e) => {
                warn!("sentiment analysis failed: {e}");
                SentimentAnalysis::neutral()
            }
        }
    }

    /// Find existing memories similar to a candidate embedding.
    ///
    /// Always scores with cosine similarity regardless of the retrieval
    /// metric, since duplicate thresholds are calibrated for it. Records
    /// whose embedding dimension differs are skipped.
    pub fn detect_similar_content(
        &self,
        embedding: &[f32],
        existing: &[MemoryRecord],
        min_score: f32,
    ) -> Vec<SimilarMemory> {
        let mut similar: Vec<SimilarMemory> = existing
            .iter()
            .filter(|record| record.embedding.len() == embedding.len())
            .filter_map(|record| {
                let score = cosine_similarity(embedding, &record.embedding);
                if score < min_score {
                    return None;
                }
                let similarity_type = if score >= EXACT_DUPLICATE_THRESHOLD {
                    SimilarityType::ExactDuplicate
                } else {
                    SimilarityType::SemanticSimilarity
                };
                Some(SimilarMemory {
                    memory: record.clone(),
                    score,
                    similarity_type,
                    reason: format!("cosine similarity {score:.3}"),
                })
            })
            .collect();
        similar.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        similar
    }

    /// Embed a single text, with retries.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MnemaError> {
        let output = with_backoff("embedding", DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, || {
            self.embedder.embed(EmbeddingInput {
                texts: vec![text.to_string()],
            })
        })
        .await?;
        output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| MnemaError::Internal("embedding returned no vectors".to_string()))
    }

    fn build_classification_prompt(&self, content: &str) -> String {
        let categories = if self.categories.is_empty() {
            DEFAULT_CATEGORIES.join(", ")
        } else {
            self.categories.join(", ")
        };
        CLASSIFICATION_PROMPT
            .replace("{categories}", &categories)
            .replace("{max_tags}", &self.max_tags.to_string())
            .replace("{content}", content)
    }

    async fn complete_with_backoff(
        &self,
        label: &str,
        prompt: String,
    ) -> Result<String, MnemaError> {
        let response = with_backoff(label, DEFAULT_ATTEMPTS, DEFAULT_BASE_DELAY, || {
            self.provider.complete(ProviderRequest {
                model: self.model.clone(),
                system_prompt: None,
                messages: vec![ChatMessage::user(prompt.clone())],
                max_tokens: self.max_tokens,
            })
        })
        .await?;
        Ok(response.content)
    }
}

/// True for content that should never trigger a model call: too short, or
/// a known acknowledgment/greeting/filler.
pub fn is_trivial(content: &str) -> bool {
    let normalized = content
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase();
    normalized.len() < 3 || TRIVIAL_INPUTS.contains(&normalized.as_str())
}

/// Most similar record by cosine, skipping dimension mismatches.
pub fn find_most_similar<'a>(
    query: &[f32],
    records: &'a [MemoryRecord],
) -> Option<(&'a MemoryRecord, f32)> {
    records
        .iter()
        .filter(|record| record.embedding.len() == query.len())
        .map(|record| (record, cosine_similarity(query, &record.embedding)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Format a conversation as role-prefixed lines for prompt substitution.
fn format_conversation(messages: &[ChatMessage]) -> String {
    let mut text = String::new();
    for msg in messages {
        let role = match msg.role.as_str() {
            "user" => "User",
            "assistant" => "Assistant",
            other => other,
        };
        text.push_str(&format!("{role}: {}\n", msg.content));
    }
    text
}

/// Slice out the first JSON value delimited by `open`/`close`, tolerating
/// markdown fences and surrounding prose.
fn extract_json_slice(response: &str, open: char, close: char) -> &str {
    let trimmed = response.trim();
    let start = trimmed.find(open).unwrap_or(0);
    let end = trimmed.rfind(close).map(|i| i + 1).unwrap_or(trimmed.len());
    &trimmed[start..end.max(start)]
}

/// Parse a JSON array of strings. Malformed responses are an empty list.
fn parse_string_array(response: &str) -> Vec<String> {
    let json_str = extract_json_slice(response, '[', ']');
    match serde_json::from_str::<Vec<String>>(json_str) {
        Ok(items) => items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(e) => {
            warn!("failed to parse string array response: {e}");
            debug!("raw response: {response}");
            Vec::new()
        }
    }
}

fn parse_entity_array(response: &str) -> Vec<RawEntity> {
    let json_str = extract_json_slice(response, '[', ']');
    match serde_json::from_str::<Vec<RawEntity>>(json_str) {
        Ok(entities) => entities,
        Err(e) => {
            warn!("failed to parse entity response: {e}");
            Vec::new()
        }
    }
}

fn parse_sentiment(response: &str) -> Option<SentimentAnalysis> {
    let json_str = extract_json_slice(response, '{', '}');
    match serde_json::from_str::<RawSentiment>(json_str) {
        Ok(raw) => Some(SentimentAnalysis::from_scores(
            raw.positive,
            raw.negative,
            raw.neutral,
        )),
        Err(e) => {
            warn!("failed to parse sentiment response: {e}");
            None
        }
    }
}

fn parse_classification_response(response: &str) -> Option<RawClassification> {
    let json_str = extract_json_slice(response, '{', '}');
    match serde_json::from_str::<RawClassification>(json_str) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!("failed to parse classification response: {e}");
            debug!("raw response: {response}");
            None
        }
    }
}
