// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration types.

use serde::{Deserialize, Serialize};

/// Static server configuration, resolved once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Postgres connection string. Required to serve anything useful.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Default log filter when RUST_LOG is not set.
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_port() -> u16 {
    8181
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_url: None,
            log_level: None,
        }
    }
}

/// Which provider slot a caller wants configuration for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// Chat/completion calls (contextual prefixes, code summaries, source summaries).
    Llm,
    /// Embedding calls.
    Embedding,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Embedding => "embedding",
        }
    }
}

/// Resolved configuration for one provider slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider name: `openai`, `ollama`, `google`, ...
    pub provider: String,
    /// API key, if the provider needs one.
    pub api_key: Option<String>,
    /// Base URL override, if configured.
    pub base_url: Option<String>,
    /// Chat model override (`MODEL_CHOICE`).
    pub chat_model: Option<String>,
    /// Embedding model override (`EMBEDDING_MODEL`).
    pub embedding_model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_str() {
        assert_eq!(ServiceType::Llm.as_str(), "llm");
        assert_eq!(ServiceType::Embedding.as_str(), "embedding");
    }

    #[test]
    fn test_server_config_default_port() {
        assert_eq!(ServerConfig::default().port, 8181);
    }
}
