// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mnema memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level Mnema configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemaConfig {
    /// Memory classification and retention settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Memory system configuration.
///
/// Controls classification, retention, deduplication, and retrieval.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Enable the memory system. When false, no memory operations occur.
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,

    /// Maximum retained memories per scope; overflow triggers eviction.
    #[serde(default = "default_max_memories")]
    pub max_memories: usize,

    /// Write-time importance floor. Content classified below this importance
    /// is rejected by the should-update gate, not merely evicted later.
    /// One of: very_low, low, medium, high, critical.
    #[serde(default = "default_min_importance")]
    pub min_importance: String,

    /// Stricter per-type importance floors, e.g. `fact = "high"`.
    /// Types not listed fall back to `min_importance`.
    #[serde(default)]
    pub type_min_importance: HashMap<String, String>,

    /// Minimum similarity for a memory to be retrieved into context (0.0-1.0).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Similarity at or above which a candidate insert is treated as a
    /// duplicate of an existing memory (0.0-1.0).
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,

    /// Maximum memories prepended to a turn by message enhancement.
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,

    /// Maximum tags kept per memory.
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,

    /// Similarity metric: cosine, l2, or inner_product.
    /// Fixed for the life of an index; changing it requires a rebuild.
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Embedding vector dimension, fixed per store instance.
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,

    /// Generate stable anonymous user/session ids when the caller supplies
    /// none. When false, a missing user id is a validation error.
    #[serde(default = "default_anonymous_mode")]
    pub anonymous_mode: bool,

    /// Model to use for classification calls (small tier for cost efficiency).
    #[serde(default = "default_classification_model")]
    pub classification_model: String,

    /// Max tokens for classification responses.
    #[serde(default = "default_classification_max_tokens")]
    pub classification_max_tokens: u32,

    /// Custom category labels substituted into the classification prompt.
    /// Empty means the built-in taxonomy.
    #[serde(default)]
    pub categories: Vec<String>,

    /// Custom extraction template with a `{conversation}` placeholder,
    /// substituted verbatim into interaction processing.
    #[serde(default)]
    pub extraction_template: Option<String>,

    /// Consolidation suggestion criteria.
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            max_memories: default_max_memories(),
            min_importance: default_min_importance(),
            type_min_importance: HashMap::new(),
            similarity_threshold: default_similarity_threshold(),
            duplicate_threshold: default_duplicate_threshold(),
            retrieval_limit: default_retrieval_limit(),
            max_tags: default_max_tags(),
            metric: default_metric(),
            embedding_dimensions: default_embedding_dimensions(),
            anonymous_mode: default_anonymous_mode(),
            classification_model: default_classification_model(),
            classification_max_tokens: default_classification_max_tokens(),
            categories: Vec::new(),
            extraction_template: None,
            consolidation: ConsolidationConfig::default(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_max_memories() -> usize {
    200
}

fn default_min_importance() -> String {
    "low".to_string()
}

fn default_similarity_threshold() -> f64 {
    0.35
}

fn default_duplicate_threshold() -> f64 {
    0.95
}

fn default_retrieval_limit() -> usize {
    5
}

fn default_max_tags() -> usize {
    5
}

fn default_metric() -> String {
    "cosine".to_string()
}

fn default_embedding_dimensions() -> usize {
    384
}

fn default_anonymous_mode() -> bool {
    true
}

fn default_classification_model() -> String {
    "claude-haiku-4-5-20250901".to_string()
}

fn default_classification_max_tokens() -> u32 {
    1024
}

/// Consolidation suggestion criteria.
///
/// A topic group must have at least `min_memories` records within
/// `max_time_span_days`, all pairwise similar at `similarity_threshold`
/// or above, before a suggestion is emitted.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConsolidationConfig {
    /// Minimum group size before consolidation is proposed.
    #[serde(default = "default_consolidation_min_memories")]
    pub min_memories: usize,

    /// Maximum age spread of a consolidation group, in days.
    #[serde(default = "default_consolidation_max_time_span_days")]
    pub max_time_span_days: u32,

    /// Minimum pairwise similarity within a group (0.0-1.0).
    #[serde(default = "default_consolidation_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Maximum suggestions emitted per pass.
    #[serde(default = "default_consolidation_max_suggestions")]
    pub max_suggestions: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            min_memories: default_consolidation_min_memories(),
            max_time_span_days: default_consolidation_max_time_span_days(),
            similarity_threshold: default_consolidation_similarity_threshold(),
            max_suggestions: default_consolidation_max_suggestions(),
        }
    }
}

fn default_consolidation_min_memories() -> usize {
    5
}

fn default_consolidation_max_time_span_days() -> u32 {
    7
}

fn default_consolidation_similarity_threshold() -> f64 {
    0.7
}

fn default_consolidation_max_suggestions() -> usize {
    3
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend kind: memory (exact in-memory), graph (approximate in-memory),
    /// or sqlite (file-backed).
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Path to the SQLite database file (sqlite backend only).
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("mnema").join("mnema.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("mnema.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = MnemaConfig::default();
        assert!(config.memory.enabled);
        assert_eq!(config.memory.max_memories, 200);
        assert_eq!(config.memory.min_importance, "low");
        assert_eq!(config.memory.duplicate_threshold, 0.95);
        assert_eq!(config.memory.retrieval_limit, 5);
        assert_eq!(config.memory.embedding_dimensions, 384);
        assert_eq!(config.memory.metric, "cosine");
        assert_eq!(config.memory.consolidation.min_memories, 5);
        assert_eq!(config.memory.consolidation.max_time_span_days, 7);
        assert_eq!(config.memory.consolidation.similarity_threshold, 0.7);
        assert_eq!(config.memory.consolidation.max_suggestions, 3);
        assert_eq!(config.storage.backend, "memory");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let toml_str = r#"
[memory]
max_memoriez = 50
"#;
        let result = toml::from_str::<MnemaConfig>(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn type_floors_deserialize() {
        let toml_str = r#"
[memory]
min_importance = "low"

[memory.type_min_importance]
fact = "high"
preference = "medium"
"#;
        let config: MnemaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.memory.type_min_importance.get("fact"),
            Some(&"high".to_string())
        );
        assert_eq!(
            config.memory.type_min_importance.get("preference"),
            Some(&"medium".to_string())
        );
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml_str = r#"
[memory]
max_memories = 50

[storage]
backend = "sqlite"
"#;
        let config: MnemaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.memory.max_memories, 50);
        assert_eq!(config.memory.retrieval_limit, 5);
        assert_eq!(config.storage.backend, "sqlite");
        assert!(config.storage.wal_mode);
    }
}
