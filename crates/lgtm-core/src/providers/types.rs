//! Provider-agnostic request/response types

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One non-streaming, single-turn completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub message: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// A successful provider response, reduced to what the bot needs.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    /// First text segment of the response, if the provider produced one
    pub text: Option<String>,
    /// Provider-assigned response/session identifier
    pub response_id: Option<String>,
    /// Raw response body, kept for debug logging
    pub raw: Value,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_response_id(mut self, id: impl Into<String>) -> Self {
        self.response_id = Some(id.into());
        self
    }
}

/// Trait that all provider transports implement
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai", "gemini")
    fn provider_name(&self) -> &str;

    /// Model identifier sent with every request
    fn model(&self) -> &str;

    /// Send one request. Errors cover both transport failures and
    /// provider-reported failures (non-2xx, unparseable or empty bodies).
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}
