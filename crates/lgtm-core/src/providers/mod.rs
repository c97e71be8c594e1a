//! Provider transports
//!
//! Supports OpenAI, Google Gemini and Anthropic. Each transport implements
//! [`CompletionProvider`]; [`ProviderKind`] is the one place the selection is
//! made.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod types;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use anthropic::AnthropicProvider;
pub use google::GeminiProvider;
pub use openai::OpenAiProvider;
pub use types::{Completion, CompletionProvider, CompletionRequest};

/// Which backend a run talks to. Exactly one is active per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Gemini,
    Anthropic,
}

impl ProviderKind {
    /// Environment variable holding this provider's API key.
    pub fn credential_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GOOGLE_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
            Self::Anthropic => "Anthropic",
        }
    }

    /// Highest sampling temperature the provider accepts.
    pub fn max_temperature(self) -> f32 {
        match self {
            Self::OpenAi | Self::Gemini => 2.0,
            Self::Anthropic => 1.0,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }

    /// Build the transport for this provider.
    ///
    /// `timeout` bounds each individual HTTP attempt.
    pub fn connect(
        self,
        api_key: String,
        model: String,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Box<dyn CompletionProvider>, ConfigError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url
            .unwrap_or(self.default_base_url())
            .trim_end_matches('/')
            .to_string();

        Ok(match self {
            Self::OpenAi => Box::new(OpenAiProvider::new(client, api_key, model, base_url)),
            Self::Gemini => Box::new(GeminiProvider::new(client, api_key, model, base_url)),
            Self::Anthropic => Box::new(AnthropicProvider::new(client, api_key, model, base_url)),
        })
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Error text of a failed provider response, trimmed for logs.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    const MAX_ERROR_BODY: usize = 2_000;

    let mut text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    if text.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    text
}
