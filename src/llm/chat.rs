// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI-shaped chat completions client.
//!
//! One client type serves every provider because Ollama, Google, OpenRouter
//! and Grok all expose an OpenAI-compatible `/chat/completions` endpoint.
//! Provider quirks are handled at request-preparation time: JSON mode is
//! requested with `response_format` where supported and with `format: "json"`
//! for Ollama, and parameters Grok's reasoning models reject are stripped.

use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::llm::provider::LlmProvider;

/// A chat message in the completions request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for the chat completions API.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Ollama's JSON-mode parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
            response_format: None,
            format: None,
            presence_penalty: None,
            frequency_penalty: None,
            stop: None,
        }
    }

    /// Ask for a JSON object response using the provider's mechanism.
    pub fn with_json_mode(mut self, provider: LlmProvider) -> Self {
        if provider == LlmProvider::Ollama {
            self.response_format = None;
            self.format = Some("json".to_string());
        } else if provider.supports_response_format(&self.model) {
            self.response_format = Some(ResponseFormat {
                format_type: "json_object".to_string(),
            });
        }
        self
    }

    /// Drop parameters the target model does not accept.
    ///
    /// Grok reasoning models reject `presence_penalty`, `frequency_penalty`
    /// and `stop`; they tolerate `response_format` only on strict retries,
    /// which the caller controls.
    pub fn prepare_for(mut self, provider: LlmProvider) -> Self {
        let is_grok = provider == LlmProvider::Grok || self.model.to_lowercase().contains("grok");
        if is_grok {
            if self.presence_penalty.take().is_some() {
                tracing::warn!("Removed unsupported Grok parameter 'presence_penalty'");
            }
            if self.frequency_penalty.take().is_some() {
                tracing::warn!("Removed unsupported Grok parameter 'frequency_penalty'");
            }
            if self.stop.take().is_some() {
                tracing::warn!("Removed unsupported Grok parameter 'stop'");
            }
        }
        if provider != LlmProvider::Ollama {
            self.format = None;
        }
        self
    }
}

/// `response_format` object.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    /// Grok-style reasoning channel.
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Parsed chat completion.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    /// The assistant message content, possibly empty.
    pub content: String,
    /// Reasoning text for models that emit a separate reasoning channel.
    pub reasoning: Option<String>,
}

/// Error response body shared by OpenAI-compatible providers.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Chat completions client bound to one provider endpoint and model.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatClient {
    pub fn new(
        client: reqwest::Client,
        provider: LlmProvider,
        base_url: String,
        api_key: Option<String>,
        model: String,
    ) -> Self {
        Self {
            client,
            provider,
            base_url,
            api_key,
            model,
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build a request against this client's model.
    pub fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest::new(self.model.clone(), messages)
    }

    /// Execute a chat completion.
    pub async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, EmbeddingError> {
        let request = request.prepare_for(self.provider);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        } else if self.provider == LlmProvider::Ollama {
            // Ollama requires the header to be present but ignores the value.
            builder = builder.header("Authorization", "Bearer ollama");
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EmbeddingError::Api(format!("chat request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EmbeddingError::Api(format!("failed to read chat response: {}", e)))?;

        if !status.is_success() {
            if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(EmbeddingError::from_provider_body(
                    status.as_u16(),
                    &parsed.error.message,
                ));
            }
            return Err(EmbeddingError::from_provider_body(status.as_u16(), &body));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| EmbeddingError::Api(format!("failed to parse chat response: {}", e)))?;

        let message = parsed.choices.into_iter().next().map(|c| c.message);
        Ok(ChatCompletion {
            content: message
                .as_ref()
                .and_then(|m| m.content.clone())
                .unwrap_or_default(),
            reasoning: message.and_then(|m| m.reasoning_content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_mode_ollama_uses_format_param() {
        let req = ChatRequest::new("llama3.2", vec![ChatMessage::user("hi")])
            .with_json_mode(LlmProvider::Ollama);
        assert_eq!(req.format.as_deref(), Some("json"));
        assert!(req.response_format.is_none());
    }

    #[test]
    fn test_json_mode_openai_uses_response_format() {
        let req = ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("hi")])
            .with_json_mode(LlmProvider::OpenAi);
        assert_eq!(
            req.response_format.as_ref().map(|f| f.format_type.as_str()),
            Some("json_object")
        );
        assert!(req.format.is_none());
    }

    #[test]
    fn test_grok_strips_unsupported_params() {
        let mut req = ChatRequest::new("grok-3-mini", vec![ChatMessage::user("hi")]);
        req.presence_penalty = Some(0.5);
        req.frequency_penalty = Some(0.5);
        req.stop = Some(vec!["END".to_string()]);
        let prepared = req.prepare_for(LlmProvider::Grok);
        assert!(prepared.presence_penalty.is_none());
        assert!(prepared.frequency_penalty.is_none());
        assert!(prepared.stop.is_none());
    }

    #[test]
    fn test_grok_detected_by_model_name() {
        let mut req = ChatRequest::new("x-grok-beta", vec![ChatMessage::user("hi")]);
        req.stop = Some(vec!["END".to_string()]);
        let prepared = req.prepare_for(LlmProvider::OpenRouter);
        assert!(prepared.stop.is_none());
    }

    #[test]
    fn test_format_param_cleared_for_non_ollama() {
        let mut req = ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("hi")]);
        req.format = Some("json".to_string());
        let prepared = req.prepare_for(LlmProvider::OpenAi);
        assert!(prepared.format.is_none());
    }

    #[test]
    fn test_response_parsing_with_reasoning() {
        let body = r#"{"choices":[{"message":{"content":"hello","reasoning_content":"thinking"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        let msg = &parsed.choices[0].message;
        assert_eq!(msg.content.as_deref(), Some("hello"));
        assert_eq!(msg.reasoning_content.as_deref(), Some("thinking"));
    }
}
