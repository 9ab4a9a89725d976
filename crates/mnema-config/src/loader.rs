// SPDX-FileCopyrightText: 2026 Mnema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./mnema.toml` > `~/.config/mnema/mnema.toml` >
//! `/etc/mnema/mnema.toml` with environment variable overrides via the
//! `MNEMA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tracing::debug;

use crate::model::MnemaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mnema/mnema.toml` (system-wide)
/// 3. `~/.config/mnema/mnema.toml` (user XDG config)
/// 4. `./mnema.toml` (local directory)
/// 5. `MNEMA_*` environment variables
pub fn load_config() -> Result<MnemaConfig, figment::Error> {
    debug!("loading configuration from XDG hierarchy with MNEMA_ overrides");
    Figment::new()
        .merge(Serialized::defaults(MnemaConfig::default()))
        .merge(Toml::file("/etc/mnema/mnema.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mnema/mnema.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("mnema.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<MnemaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MnemaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MnemaConfig, figment::Error> {
    debug!(path = %path.display(), "loading configuration file");
    Figment::new()
        .merge(Serialized::defaults(MnemaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `MNEMA_MEMORY_MAX_MEMORIES` must map to
/// `memory.max_memories`, not `memory.max.memories`.
fn env_provider() -> Env {
    Env::prefixed("MNEMA_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("memory_", "memory.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_yields_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.memory.max_memories, 200);
        assert_eq!(config.storage.backend, "memory");
    }

    #[test]
    fn toml_string_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[memory]
max_memories = 25
similarity_threshold = 0.5

[storage]
backend = "graph"
"#,
        )
        .unwrap();
        assert_eq!(config.memory.max_memories, 25);
        assert_eq!(config.memory.similarity_threshold, 0.5);
        assert_eq!(config.storage.backend, "graph");
        // Untouched keys keep defaults.
        assert_eq!(config.memory.duplicate_threshold, 0.95);
    }

    #[test]
    fn file_path_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mnema.toml");
        std::fs::write(&path, "[memory]\nretrieval_limit = 9\n").unwrap();
        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.memory.retrieval_limit, 9);
    }

    #[test]
    fn unknown_key_fails_extraction() {
        let result = load_config_from_str(
            r#"
[memory]
similarty_threshold = 0.5
"#,
        );
        assert!(result.is_err());
    }
}
