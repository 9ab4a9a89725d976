// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for the model-backed classification boundary.

use async_trait::async_trait;

use crate::error::MnemaError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Adapter for LLM provider integrations.
///
/// The memory engine uses the provider for exactly one thing: structured
/// classification/extraction completions. Prompt construction stays on the
/// caller's side; the adapter only moves requests and responses.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, MnemaError>;
}
