// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mnema memory engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Mnema workspace. The memory engine's
//! two external collaborators, the model provider and the embedding
//! provider, implement traits defined here.

pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::MnemaError;
pub use types::{AdapterType, ChatMessage, HealthStatus};

// Re-export all adapter traits at crate root.
pub use traits::{EmbeddingAdapter, PluginAdapter, ProviderAdapter};
