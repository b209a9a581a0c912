// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider selection and client construction.
//!
//! Providers are selected at call time from the settings cache, so a settings
//! change takes effect without a restart (modulo the five-minute TTL). All
//! chat traffic speaks the OpenAI chat-completions shape; Ollama and Google
//! are reached through their OpenAI-compatible endpoints.

use std::sync::Arc;

use crate::config::{ProviderConfig, ServiceType, SettingsCache};
use crate::error::EmbeddingError;
use crate::llm::chat::ChatClient;

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama host when no instance URL is configured.
pub const OLLAMA_DEFAULT_HOST: &str = "http://host.docker.internal:11434";

/// Google's OpenAI-compatible chat endpoint.
pub const GOOGLE_OPENAI_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/";

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Ollama,
    Google,
    Anthropic,
    OpenRouter,
    Grok,
}

impl LlmProvider {
    /// Parse a provider name. Unknown names fall back to OpenAI, matching the
    /// retrieval paths' lenient behavior; the ingest probe validates keys
    /// separately.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "ollama" => Self::Ollama,
            "google" | "gemini" => Self::Google,
            "anthropic" => Self::Anthropic,
            "openrouter" => Self::OpenRouter,
            "grok" | "xai" => Self::Grok,
            _ => Self::OpenAi,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Google => "google",
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
            Self::Grok => "grok",
        }
    }

    /// Default embedding model for the provider.
    pub fn default_embedding_model(&self) -> &'static str {
        match self {
            Self::Ollama => "nomic-embed-text",
            Self::Google => "text-embedding-004",
            _ => "text-embedding-3-small",
        }
    }

    /// Default chat model for the provider.
    pub fn default_chat_model(&self) -> &'static str {
        match self {
            Self::Ollama => "llama3.2:latest",
            Self::Google => "gemini-1.5-flash",
            Self::Anthropic => "claude-3-5-haiku-20241022",
            Self::OpenRouter => "anthropic/claude-3.5-sonnet",
            Self::Grok => "grok-3-mini",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    /// Whether this provider honors `response_format: json_object`.
    pub fn supports_response_format(&self, model: &str) -> bool {
        match self {
            Self::OpenAi | Self::Google | Self::Anthropic => true,
            Self::OpenRouter => model.starts_with("openai/"),
            _ => false,
        }
    }
}

/// Append `/v1` so an Ollama host serves the OpenAI-shaped API.
pub fn ollama_openai_url(host: &str) -> String {
    let trimmed = host.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

/// Factory that resolves the active provider and builds chat clients.
#[derive(Clone)]
pub struct LlmClientFactory {
    settings: Arc<SettingsCache>,
    http: reqwest::Client,
}

impl LlmClientFactory {
    pub fn new(settings: Arc<SettingsCache>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { settings, http }
    }

    pub fn settings(&self) -> &Arc<SettingsCache> {
        &self.settings
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Pick the Ollama instance URL for the given slot. A distinct embedding
    /// URL is allowed via `OLLAMA_EMBEDDING_URL`; chat traffic uses
    /// `LLM_BASE_URL`.
    pub fn ollama_instance_url(&self, service: ServiceType) -> String {
        let host = match service {
            ServiceType::Embedding => self
                .settings
                .get("OLLAMA_EMBEDDING_URL")
                .or_else(|| self.settings.get("LLM_BASE_URL")),
            ServiceType::Llm => self.settings.get("LLM_BASE_URL"),
        }
        .unwrap_or_else(|| OLLAMA_DEFAULT_HOST.to_string());
        ollama_openai_url(&host)
    }

    /// Resolve the active provider config for a service slot, applying the
    /// OpenAI-without-key fallback to a local Ollama instance.
    pub fn resolve(&self, service: ServiceType, override_provider: Option<&str>) -> ResolvedProvider {
        let config: ProviderConfig = match override_provider {
            Some(name) => {
                let provider = name.to_lowercase();
                let key_var = format!("{}_API_KEY", provider.to_uppercase());
                ProviderConfig {
                    api_key: self.settings.get(&key_var),
                    base_url: self.settings.get("LLM_BASE_URL"),
                    chat_model: self.settings.get("MODEL_CHOICE"),
                    embedding_model: self.settings.get("EMBEDDING_MODEL"),
                    provider,
                }
            }
            None => self.settings.get_active_provider(service),
        };

        let mut provider = LlmProvider::parse(&config.provider);
        let mut api_key = config.api_key.clone();
        let mut base_url = config.base_url.clone();

        if provider == LlmProvider::OpenAi && api_key.is_none() {
            tracing::warn!("OpenAI API key not found, falling back to Ollama instance");
            provider = LlmProvider::Ollama;
            base_url = None;
        }

        let base_url = match provider {
            LlmProvider::Ollama => {
                api_key = None;
                self.ollama_instance_url(service)
            }
            LlmProvider::Google => GOOGLE_OPENAI_BASE_URL.trim_end_matches('/').to_string(),
            _ => base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        };

        ResolvedProvider {
            provider,
            base_url,
            api_key,
            chat_model: config
                .chat_model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| provider.default_chat_model().to_string()),
            embedding_model: config
                .embedding_model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| provider.default_embedding_model().to_string()),
        }
    }

    /// Build a chat client for the active (or overridden) LLM provider.
    pub fn chat_client(&self, override_provider: Option<&str>) -> Result<ChatClient, EmbeddingError> {
        let resolved = self.resolve(ServiceType::Llm, override_provider);
        Ok(ChatClient::new(
            self.http.clone(),
            resolved.provider,
            resolved.base_url,
            resolved.api_key,
            resolved.chat_model,
        ))
    }

    /// Build a chat client pinned to OpenAI's `gpt-4o-mini` (summarizer fallback).
    pub fn openai_fallback_chat_client(&self) -> Result<ChatClient, EmbeddingError> {
        let api_key = self.settings.get("OPENAI_API_KEY").ok_or_else(|| {
            EmbeddingError::AuthenticationFailed {
                provider: "openai".to_string(),
                message: "OPENAI_API_KEY not configured for fallback".to_string(),
            }
        })?;
        Ok(ChatClient::new(
            self.http.clone(),
            LlmProvider::OpenAi,
            OPENAI_BASE_URL.to_string(),
            Some(api_key),
            "gpt-4o-mini".to_string(),
        ))
    }
}

/// Fully resolved provider selection for one call.
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub provider: LlmProvider,
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_names() {
        assert_eq!(LlmProvider::parse("OpenAI"), LlmProvider::OpenAi);
        assert_eq!(LlmProvider::parse("ollama"), LlmProvider::Ollama);
        assert_eq!(LlmProvider::parse("gemini"), LlmProvider::Google);
        assert_eq!(LlmProvider::parse("xai"), LlmProvider::Grok);
        assert_eq!(LlmProvider::parse("unknown"), LlmProvider::OpenAi);
    }

    #[test]
    fn test_ollama_url_gets_v1_suffix() {
        assert_eq!(
            ollama_openai_url("http://localhost:11434"),
            "http://localhost:11434/v1"
        );
        assert_eq!(
            ollama_openai_url("http://localhost:11434/"),
            "http://localhost:11434/v1"
        );
        assert_eq!(
            ollama_openai_url("http://localhost:11434/v1"),
            "http://localhost:11434/v1"
        );
    }

    #[test]
    fn test_default_models() {
        assert_eq!(
            LlmProvider::OpenAi.default_embedding_model(),
            "text-embedding-3-small"
        );
        assert_eq!(
            LlmProvider::Ollama.default_embedding_model(),
            "nomic-embed-text"
        );
        assert_eq!(
            LlmProvider::Google.default_embedding_model(),
            "text-embedding-004"
        );
    }

    #[test]
    fn test_response_format_support() {
        assert!(LlmProvider::OpenAi.supports_response_format("gpt-4o-mini"));
        assert!(LlmProvider::OpenRouter.supports_response_format("openai/gpt-4o"));
        assert!(!LlmProvider::OpenRouter.supports_response_format("meta/llama-3"));
        assert!(!LlmProvider::Grok.supports_response_format("grok-3-mini"));
        assert!(!LlmProvider::Ollama.supports_response_format("llama3.2"));
    }
}
