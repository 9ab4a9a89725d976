// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types for the classification and retrieval engine.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mnema_core::types::ChatMessage;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The `(user, session?)` partition a memory belongs to.
///
/// An absent session id means the memory is user-global and visible to
/// every session of that user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryScope {
    pub user_id: String,
    pub session_id: Option<String>,
}

impl MemoryScope {
    /// A user-global scope.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: None,
        }
    }

    /// A session-bound scope.
    pub fn session(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: Some(session_id.into()),
        }
    }

    /// Stable partition key for this scope.
    pub fn key(&self) -> String {
        match &self.session_id {
            Some(session) => format!("{}\u{1f}{}", self.user_id, session),
            None => self.user_id.clone(),
        }
    }

    /// The user-global scope for the same user.
    pub fn user_global(&self) -> MemoryScope {
        MemoryScope::user(self.user_id.clone())
    }
}

/// Category of a memory. Extendable at the prompt level via custom
/// category sets; labels outside this closed set parse to [`MemoryType::Other`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    Default,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Preference,
    Conversation,
    Task,
    Context,
    Instruction,
    Feedback,
    Question,
    Answer,
    #[default]
    Other,
}

impl MemoryType {
    /// Parse a classification label, falling back to `Other` for labels
    /// outside the canonical set (custom domain categories).
    pub fn from_label(label: &str) -> Self {
        MemoryType::from_str(label.trim()).unwrap_or(MemoryType::Other)
    }
}

/// Ordinal long-term significance of a memory, independent of any query.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    Default,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum MemoryImportance {
    VeryLow,
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl MemoryImportance {
    /// Parse a label, falling back to `Low`.
    pub fn from_label(label: &str) -> Self {
        MemoryImportance::from_str(label.trim()).unwrap_or(MemoryImportance::Low)
    }

    /// The relevance score a candidate must reach to clear this floor.
    pub fn relevance_floor(&self) -> f64 {
        match self {
            MemoryImportance::VeryLow => 0.0,
            MemoryImportance::Low => 0.2,
            MemoryImportance::Medium => 0.4,
            MemoryImportance::High => 0.6,
            MemoryImportance::Critical => 0.8,
        }
    }
}

/// A named entity extracted from memory content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntity {
    /// The entity text as it appears in the content.
    pub text: String,
    /// Entity category (person, place, organization, date, ...).
    pub entity_type: String,
    /// Extraction confidence (0.0-1.0).
    pub confidence: f64,
    /// Byte span of the entity within the content, if locatable.
    pub span: Option<(usize, usize)>,
}

/// Dominant sentiment label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

/// Sentiment score distribution; components sum to 1 after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub dominant: Sentiment,
}

impl SentimentAnalysis {
    /// Fully neutral sentiment, the conservative default.
    pub fn neutral() -> Self {
        Self {
            positive: 0.0,
            negative: 0.0,
            neutral: 1.0,
            dominant: Sentiment::Neutral,
        }
    }

    /// Build from raw component scores, renormalizing so they sum to 1
    /// and picking the dominant label. Non-finite or all-zero input
    /// collapses to neutral.
    pub fn from_scores(positive: f64, negative: f64, neutral: f64) -> Self {
        let positive = positive.max(0.0);
        let negative = negative.max(0.0);
        let neutral = neutral.max(0.0);
        let sum = positive + negative + neutral;
        if !sum.is_finite() || sum <= f64::EPSILON {
            return Self::neutral();
        }

        let (positive, negative, neutral) = (positive / sum, negative / sum, neutral / sum);
        let dominant = if positive >= negative && positive >= neutral {
            Sentiment::Positive
        } else if negative >= neutral {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        };

        Self {
            positive,
            negative,
            neutral,
            dominant,
        }
    }
}

impl Default for SentimentAnalysis {
    fn default() -> Self {
        Self::neutral()
    }
}

/// A durable unit of recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, assigned on creation, immutable.
    pub id: String,
    /// Owning scope.
    pub scope: MemoryScope,
    /// The remembered content.
    pub content: String,
    /// Memory category.
    pub memory_type: MemoryType,
    /// Long-term significance.
    pub importance: MemoryImportance,
    /// Usefulness to the current topic focus (0.0-1.0), recomputed over time.
    pub relevance: f64,
    /// Bounded tag set, order-irrelevant.
    pub tags: Vec<String>,
    /// Extracted named entities.
    pub entities: Vec<NamedEntity>,
    /// Embedding vector; dimension fixed per store instance.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Ephemeral per-call descriptor used to parameterize classification and
/// retrieval. Never persisted.
#[derive(Debug, Clone)]
pub struct MemoryContext {
    pub user_id: String,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub conversation_topic: Option<String>,
    pub role: Option<String>,
    pub previous_messages: Vec<ChatMessage>,
    /// Free-form additional context.
    pub additional: HashMap<String, String>,
    /// True when ids were generated because the caller supplied none.
    pub is_anonymous: bool,
    /// True when any id in this context was generated rather than supplied.
    pub was_generated: bool,
}

impl MemoryContext {
    pub fn new(user_id: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id,
            timestamp: Utc::now(),
            conversation_topic: None,
            role: None,
            previous_messages: Vec::new(),
            additional: HashMap::new(),
            is_anonymous: false,
            was_generated: false,
        }
    }

    /// The storage scope this context addresses.
    pub fn scope(&self) -> MemoryScope {
        MemoryScope {
            user_id: self.user_id.clone(),
            session_id: self.session_id.clone(),
        }
    }
}

/// Transient output of classifying one piece of content; consumed
/// immediately to build or update a [`MemoryRecord`].
#[derive(Debug, Clone)]
pub struct MemoryClassification {
    pub memory_type: MemoryType,
    pub importance: MemoryImportance,
    pub relevance: f64,
    pub tags: Vec<String>,
    pub entities: Vec<NamedEntity>,
    pub sentiment: SentimentAnalysis,
    pub topic: Option<String>,
}

impl MemoryClassification {
    /// The conservative default used when the model call fails or its
    /// output cannot be parsed.
    pub fn conservative_default() -> Self {
        Self {
            memory_type: MemoryType::Other,
            importance: MemoryImportance::Low,
            relevance: 0.0,
            tags: Vec::new(),
            entities: Vec::new(),
            sentiment: SentimentAnalysis::neutral(),
            topic: None,
        }
    }
}

/// Optional slowly-changing aggregate used to bias relevance scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub interests: Vec<String>,
    /// Topic label to preference weight (0.0-1.0).
    pub topic_preferences: HashMap<String, f64>,
}

/// Kind of consolidation a suggestion proposes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationType {
    Merge,
    Summarize,
    Archive,
    Delete,
    Split,
}

/// Advisory consolidation proposal; never auto-applied without an explicit
/// apply step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationSuggestion {
    pub memory_ids: Vec<String>,
    pub kind: ConsolidationType,
    pub reason: String,
    pub confidence: f64,
    pub suggested_title: String,
}

/// How a similar memory relates to the probed content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityType {
    ExactDuplicate,
    SemanticSimilarity,
    ContentSimilarity,
    TopicSimilarity,
    EntitySimilarity,
}

/// An existing memory found similar to probed content.
#[derive(Debug, Clone)]
pub struct SimilarMemory {
    pub memory: MemoryRecord,
    pub score: f32,
    pub similarity_type: SimilarityType,
    pub reason: String,
}

/// A memory with a retrieval score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: MemoryRecord,
    pub score: f32,
}

/// Convert an f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(chunk);
            f32::from_le_bytes(bytes)
        })
        .collect()
}
