//! LLM gateway for debate-forge.
//!
//! This module abstracts "send a prompt, get a completion" behind the
//! [`LlmProvider`] trait so that agents and judges never depend on a
//! specific backend. Two implementations ship with the crate:
//!
//! - [`OpenAiChatClient`]: any OpenAI-compatible `/chat/completions`
//!   endpoint, with per-call timeouts and exponential-backoff retries.
//! - [`ScriptedProvider`]: a fully deterministic offline provider used for
//!   reproducible runs and tests.
//!
//! Retries and backoff are the gateway's responsibility. Calling components
//! treat [`LlmProvider::complete`] as "eventually succeeds or fails with a
//! classified [`LlmError`]".

pub mod openai;
pub mod script;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

pub use openai::{OpenAiChatClient, DEFAULT_MODEL};
pub use script::{ScriptFailure, ScriptedProvider};

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters applied to a single completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Model identifier to use for generation.
    pub model: String,
    /// Sampling temperature, clamped to [0, 2].
    pub temperature: f64,
    /// Maximum number of tokens to generate.
    pub max_tokens: u32,
    /// Optional fixed seed for backends that support reproducible sampling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SamplingConfig {
    /// Create a sampling configuration for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.2,
            max_tokens: 800,
            seed: None,
        }
    }

    /// Set the sampling temperature, clamping to the valid [0, 2] range.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Set the maximum output length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// A copy of this configuration pinned to temperature 0 (for judging).
    pub fn deterministic(&self) -> Self {
        Self {
            temperature: 0.0,
            ..self.clone()
        }
    }
}

/// Request for a single text completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Conversation messages, system instructions first.
    pub messages: Vec<Message>,
    /// Sampling parameters for this call.
    pub sampling: SamplingConfig,
}

impl GenerationRequest {
    /// Create a request from system instructions and a user prompt.
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        sampling: SamplingConfig,
    ) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
            sampling,
        }
    }

    /// Create a request from pre-built messages.
    pub fn from_messages(messages: Vec<Message>, sampling: SamplingConfig) -> Self {
        Self { messages, sampling }
    }

    /// Concatenated text of all messages, used by deterministic providers
    /// for rule matching.
    pub fn full_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Trait for backends that can produce text completions.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produce a completion for the given request.
    async fn complete(&self, request: GenerationRequest) -> Result<String, LlmError>;
}
