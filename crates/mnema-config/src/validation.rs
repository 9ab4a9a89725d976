// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as threshold ranges and known enum labels. The
//! importance/type/metric/backend label sets are kept as string lists here
//! so the config crate does not depend on the memory domain crate.

use crate::diagnostic::ConfigError;
use crate::model::MnemaConfig;

const VALID_IMPORTANCE: &[&str] = &["very_low", "low", "medium", "high", "critical"];

const VALID_TYPES: &[&str] = &[
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

const VALID_METRICS: &[&str] = &["cosine", "l2", "inner_product"];

const VALID_BACKENDS: &[&str] = &["memory", "graph", "sqlite"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MnemaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let mem = &config.memory;

    if mem.max_memories == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.max_memories must be at least 1".to_string(),
        });
    }

    if mem.embedding_dimensions == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.embedding_dimensions must be at least 1".to_string(),
        });
    }

    if mem.retrieval_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "memory.retrieval_limit must be at least 1".to_string(),
        });
    }

    for (key, value) in [
        ("memory.similarity_threshold", mem.similarity_threshold),
        ("memory.duplicate_threshold", mem.duplicate_threshold),
        (
            "memory.consolidation.similarity_threshold",
            mem.consolidation.similarity_threshold,
        ),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be within 0.0-1.0, got {value}"),
            });
        }
    }

    if !VALID_IMPORTANCE.contains(&mem.min_importance.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "memory.min_importance `{}` is not one of: {}",
                mem.min_importance,
                VALID_IMPORTANCE.join(", ")
            ),
        });
    }

    for (mem_type, floor) in &mem.type_min_importance {
        if !VALID_TYPES.contains(&mem_type.as_str()) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "memory.type_min_importance key `{mem_type}` is not a known memory type"
                ),
            });
        }
        if !VALID_IMPORTANCE.contains(&floor.as_str()) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "memory.type_min_importance.{mem_type} `{floor}` is not one of: {}",
                    VALID_IMPORTANCE.join(", ")
                ),
            });
        }
    }

    if !VALID_METRICS.contains(&mem.metric.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "memory.metric `{}` is not one of: {}",
                mem.metric,
                VALID_METRICS.join(", ")
            ),
        });
    }

    if let Some(template) = &mem.extraction_template
        && !template.contains("{conversation}")
    {
        errors.push(ConfigError::Validation {
            message: "memory.extraction_template must contain a `{conversation}` placeholder"
                .to_string(),
        });
    }

    if !VALID_BACKENDS.contains(&config.storage.backend.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "storage.backend `{}` is not one of: {}",
                config.storage.backend,
                VALID_BACKENDS.join(", ")
            ),
        });
    }

    if config.storage.backend == "sqlite" && config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty for the sqlite backend"
                .to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
