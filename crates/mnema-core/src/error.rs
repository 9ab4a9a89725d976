// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mnema memory engine.

use thiserror::Error;

/// The primary error type used across all Mnema adapter traits and core operations.
#[derive(Debug, Error)]
pub enum MnemaError {
    /// Caller-supplied input was rejected (bad scope, empty content, bad limit).
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Model provider errors (API failure, token limits, rate limiting).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// An embedding did not match the store's fixed dimension.
    ///
    /// Structural corruption: continuing would silently produce wrong
    /// search results, so this is always surfaced immediately.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MnemaError {
    /// Whether this error is worth retrying (transient provider-side failures).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MnemaError::Provider { .. } | MnemaError::Timeout { .. }
        )
    }
}
