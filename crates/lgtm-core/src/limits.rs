//! Per-model token limits
//!
//! Every provider keeps a static table of known models. Unknown model names
//! fall back to that provider's default bucket, so the lookup never fails.

use std::fmt;

use serde::Serialize;

use crate::providers::ProviderKind;

/// Tokens held back from the request allowance for message framing.
pub const REQUEST_MARGIN: u32 = 100;

/// One row of a provider's model table.
struct ModelLimits {
    model: &'static str,
    max_tokens: u32,
    response_tokens: u32,
}

const fn row(model: &'static str, max_tokens: u32, response_tokens: u32) -> ModelLimits {
    ModelLimits {
        model,
        max_tokens,
        response_tokens,
    }
}

struct ProviderTable {
    knowledge_cut_off: &'static str,
    default_model: &'static str,
    models: &'static [ModelLimits],
    fallback_max_tokens: u32,
    fallback_response_tokens: u32,
}

const OPENAI: ProviderTable = ProviderTable {
    knowledge_cut_off: "2023-10-1",
    default_model: "gpt-4o-mini",
    models: &[
        row("gpt-4o-mini", 128_000, 3_000),
        row("gpt-4.1-mini", 128_000, 3_000),
        row("gpt-4o", 128_000, 3_000),
        row("gpt-4.1", 1_047_576, 3_000),
    ],
    fallback_max_tokens: 128_000,
    fallback_response_tokens: 2_000,
};

const GEMINI: ProviderTable = ProviderTable {
    knowledge_cut_off: "2025-05-11",
    default_model: "gemini-1.5-flash",
    models: &[
        row("gemini-1.5-flash", 1_048_576, 3_000),
        row("gemini-1.5-pro", 2_097_152, 3_000),
        row("gemini-2.0-flash", 1_048_576, 3_000),
    ],
    fallback_max_tokens: 1_048_576,
    fallback_response_tokens: 1_000,
};

const ANTHROPIC: ProviderTable = ProviderTable {
    knowledge_cut_off: "2024-06-20",
    default_model: "claude-3-5-sonnet-20241022",
    models: &[
        row("claude-3-opus-20240229", 200_000, 3_000),
        row("claude-3-5-haiku-20241022", 200_000, 3_000),
        row("claude-3-5-sonnet-20241022", 200_000, 3_000),
    ],
    fallback_max_tokens: 200_000,
    fallback_response_tokens: 1_000,
};

fn table(provider: ProviderKind) -> &'static ProviderTable {
    match provider {
        ProviderKind::OpenAi => &OPENAI,
        ProviderKind::Gemini => &GEMINI,
        ProviderKind::Anthropic => &ANTHROPIC,
    }
}

/// Token allowance split for one (provider, model) pair.
///
/// `request_tokens` is always `max_tokens - response_tokens - REQUEST_MARGIN`;
/// there is no way to build a value that breaks this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenLimits {
    max_tokens: u32,
    request_tokens: u32,
    response_tokens: u32,
    knowledge_cut_off: &'static str,
}

impl TokenLimits {
    /// Look up the limits for `model` on `provider`.
    pub fn for_model(provider: ProviderKind, model: &str) -> Self {
        let table = table(provider);
        let (max_tokens, response_tokens) = table
            .models
            .iter()
            .find(|m| m.model == model)
            .map_or(
                (table.fallback_max_tokens, table.fallback_response_tokens),
                |m| (m.max_tokens, m.response_tokens),
            );

        Self {
            max_tokens,
            request_tokens: max_tokens
                .saturating_sub(response_tokens)
                .saturating_sub(REQUEST_MARGIN),
            response_tokens,
            knowledge_cut_off: table.knowledge_cut_off,
        }
    }

    /// Limits for the provider's default model.
    pub fn provider_default(provider: ProviderKind) -> Self {
        Self::for_model(provider, default_model(provider))
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn request_tokens(&self) -> u32 {
        self.request_tokens
    }

    pub fn response_tokens(&self) -> u32 {
        self.response_tokens
    }

    pub fn knowledge_cut_off(&self) -> &'static str {
        self.knowledge_cut_off
    }

    /// One-line summary for logs.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TokenLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_tokens={}, request_tokens={}, response_tokens={}",
            self.max_tokens, self.request_tokens, self.response_tokens
        )
    }
}

/// Model used when a provider is selected without naming one.
pub fn default_model(provider: ProviderKind) -> &'static str {
    table(provider).default_model
}

/// Model names with a dedicated row in the provider's table.
pub fn known_models(provider: ProviderKind) -> impl Iterator<Item = &'static str> {
    table(provider).models.iter().map(|m| m.model)
}
