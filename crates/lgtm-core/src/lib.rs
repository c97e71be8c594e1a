//! lgtm-core - Provider bots for automated pull request review
//!
//! This crate provides:
//! - A single `chat` contract over OpenAI, Google Gemini and Anthropic
//! - Token budget lookup per provider and model
//! - Include/exclude glob filtering of changed file paths
//! - Validated run options shared by every bot

pub mod bot;
pub mod error;
pub mod limits;
pub mod options;
pub mod path_filter;
pub mod providers;
pub mod retry;

// Re-export main types for convenience
pub use bot::{Bot, Ids, ProviderBot, build_system_message, create_bot, resolve_credential};
pub use error::ConfigError;
pub use limits::{REQUEST_MARGIN, TokenLimits};
pub use options::{BotTier, ModelOptions, Options, RawOptions};
pub use path_filter::{PathFilter, PathRule};
pub use providers::{Completion, CompletionProvider, CompletionRequest, ProviderKind};
pub use retry::RetryPolicy;
