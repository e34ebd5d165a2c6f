//! Chat model backends behind the gateway.
//!
//! `ChatModel` is the single seam: the gateway wraps any implementation in its
//! input-transform and output-transform stages, so a new backend plugs in
//! unchanged. `OpenAiChat` covers every OpenAI-compatible API (remote OpenAI,
//! vLLM, Ollama) via base-URL overrides; `MockChat` is the in-process backend
//! used by tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::debug;

use crate::error::AgentError;
use crate::message::ChatMessage;

/// Token usage for one model call (prompt + completion).
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from one chat completion.
#[derive(Clone, Debug)]
pub struct ChatCompletion {
    /// Assistant message content (plain text).
    pub content: String,
    /// Model identifier as reported by the backend (used for pricing).
    pub model: String,
    /// Token usage when the backend reports it.
    pub usage: Option<TokenUsage>,
}

/// Chat model: given messages, returns assistant text plus usage.
///
/// Implementations: `OpenAiChat` (real API), `MockChat` (fixed responses).
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// The model name this handle was created for (pricing key fallback).
    fn model_name(&self) -> &str;

    /// One completion: read messages, return assistant content and usage.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, AgentError>;
}

/// OpenAI-compatible chat client.
///
/// Uses `OPENAI_API_KEY` from the environment by default; or provide config via
/// `with_config` with a custom API key or base URL; vLLM and Ollama expose the
/// same API surface on their own ports.
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiChat {
    /// Build client with default config (API key from `OPENAI_API_KEY` env).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Build client with custom config (e.g. custom API key or base URL).
    pub fn with_config(config: OpenAIConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    /// Set temperature (0–2). Lower values are more deterministic.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Convert our `ChatMessage` list to OpenAI request messages.
    fn messages_to_request(messages: &[ChatMessage]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                ChatMessage::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                ChatMessage::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                ChatMessage::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
            })
            .collect()
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, AgentError> {
        let request_messages = Self::messages_to_request(messages);
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(request_messages);
        if let Some(t) = self.temperature {
            args.temperature(t);
        }

        let request = args
            .build()
            .map_err(|e| AgentError::Gateway(format!("chat request build failed: {}", e)))?;

        debug!(model = %self.model, message_count = messages.len(), "chat completion create");

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AgentError::Gateway(format!("chat API error: {}", e)))?;

        let model = if response.model.is_empty() {
            self.model.clone()
        } else {
            response.model.clone()
        };

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Gateway("chat API returned no choices".to_string()))?;

        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ChatCompletion {
            content: choice.message.content.unwrap_or_default(),
            model,
            usage,
        })
    }
}

/// Mock chat model: fixed response sequence, records every message list it saw.
///
/// The recording is what guardrail tests assert against, e.g. that a redacted
/// SSN never reached the model. The last response repeats once the sequence is
/// exhausted, so multi-tier workflows (planner, then response) can script both.
pub struct MockChat {
    responses: Vec<String>,
    calls: AtomicUsize,
    received: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    model: String,
}

impl MockChat {
    /// Mock returning the same content for every call.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self::with_sequence(vec![content.into()])
    }

    /// Mock returning each response in order; the last repeats.
    pub fn with_sequence(responses: Vec<String>) -> Self {
        Self {
            responses,
            calls: AtomicUsize::new(0),
            received: Arc::new(Mutex::new(Vec::new())),
            model: "mock-model".to_string(),
        }
    }

    /// Every message list this mock has been invoked with, in call order.
    pub fn received(&self) -> Vec<Vec<ChatMessage>> {
        self.received.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for MockChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatCompletion, AgentError> {
        if let Ok(mut guard) = self.received.lock() {
            guard.push(messages.to_vec());
        }
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .responses
            .get(idx)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(ChatCompletion {
            content,
            model: self.model.clone(),
            usage: Some(TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 8,
                total_tokens: 20,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: the mock replays its sequence in order and repeats the last entry.
    #[tokio::test]
    async fn mock_chat_sequence_and_repeat() {
        let mock = MockChat::with_sequence(vec!["one".into(), "two".into()]);
        let msgs = [ChatMessage::user("hi")];
        assert_eq!(mock.complete(&msgs).await.unwrap().content, "one");
        assert_eq!(mock.complete(&msgs).await.unwrap().content, "two");
        assert_eq!(mock.complete(&msgs).await.unwrap().content, "two");
        assert_eq!(mock.received().len(), 3);
    }

    /// **Scenario**: complete() against an unreachable API base returns an error
    /// (no real API key needed).
    #[tokio::test]
    async fn openai_chat_unreachable_base_returns_error() {
        let config = OpenAIConfig::new()
            .with_api_key("test-key")
            .with_api_base("https://127.0.0.1:1");
        let client = OpenAiChat::with_config(config, "gpt-4o-mini");
        let messages = [ChatMessage::user("Hello")];
        assert!(client.complete(&messages).await.is_err());
    }
}
