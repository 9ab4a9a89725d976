// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Mnema engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter behind a [`crate::traits::PluginAdapter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    Storage,
}

/// A single conversation message as seen by the hosting agent runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role: "user", "assistant", or "system".
    pub role: String,
    /// Plain-text message content.
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model identifier to route the request to.
    pub model: String,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// Conversation messages, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// A response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Full text content of the completion.
    pub content: String,
    /// Token usage, if the provider reports it.
    pub usage: Option<TokenUsage>,
}

/// Token usage reported by a provider (for cost tracking).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Input for an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    /// Texts to embed, order preserved in the output.
    pub texts: Vec<String>,
}

/// Output from an embedding adapter.
///
/// `embeddings.len() == input.texts.len()` and every vector has
/// `dimensions` elements.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [
            AdapterType::Provider,
            AdapterType::Embedding,
            AdapterType::Storage,
        ] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn chat_message_constructors() {
        let user = ChatMessage::user("hello");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "hello");

        let assistant = ChatMessage::assistant("hi");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn embedding_output_shape() {
        let output = EmbeddingOutput {
            embeddings: vec![vec![0.1, 0.2, 0.3]],
            dimensions: 3,
        };
        assert_eq!(output.embeddings.len(), 1);
        assert_eq!(output.embeddings[0].len(), output.dimensions);
    }
}
