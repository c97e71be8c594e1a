//! Run-wide options
//!
//! [`RawOptions`] is what comes out of a config file or action inputs.
//! [`Options`] is the validated, immutable form every bot reads from.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::limits::{self, TokenLimits};
use crate::path_filter::PathFilter;
use crate::providers::ProviderKind;

/// Unvalidated options, deserializable from TOML/JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOptions {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub disable_review: bool,
    #[serde(default)]
    pub disable_release_notes: bool,
    /// Maximum number of files to review, 0 for unlimited
    #[serde(default)]
    pub max_files: usize,
    #[serde(default)]
    pub review_simple_changes: bool,
    #[serde(default)]
    pub review_comment_lgtm: bool,
    #[serde(default)]
    pub path_filters: Vec<String>,
    #[serde(default)]
    pub system_message: String,
    #[serde(default = "default_provider", alias = "mode")]
    pub provider: String,
    /// Defaults to the provider's default model
    #[serde(default)]
    pub light_model: Option<String>,
    /// Defaults to the provider's default model
    #[serde(default)]
    pub heavy_model: Option<String>,
    #[serde(default)]
    pub model_temperature: f32,
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Fixed pause between retry attempts, 0 for none
    #[serde(default)]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    #[serde(default = "default_concurrency_limit")]
    pub github_concurrency_limit: usize,
    #[serde(default = "default_language")]
    pub language: String,
    /// Override the provider endpoint (proxies, gateways, tests)
    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_provider() -> String {
    ProviderKind::default().to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_concurrency_limit() -> usize {
    6
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            debug: false,
            disable_review: false,
            disable_release_notes: false,
            max_files: 0,
            review_simple_changes: false,
            review_comment_lgtm: false,
            path_filters: Vec::new(),
            system_message: String::new(),
            provider: default_provider(),
            light_model: None,
            heavy_model: None,
            model_temperature: 0.0,
            retries: default_retries(),
            retry_delay_ms: 0,
            timeout_ms: default_timeout_ms(),
            concurrency_limit: default_concurrency_limit(),
            github_concurrency_limit: default_concurrency_limit(),
            language: default_language(),
            api_base_url: None,
        }
    }
}

/// Which of the two bots a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotTier {
    /// Cheaper, faster model used for summaries
    Light,
    /// More capable model used for reviews
    Heavy,
}

impl fmt::Display for BotTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Light => "light",
            Self::Heavy => "heavy",
        })
    }
}

/// Model selection for one bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelOptions {
    pub model: String,
    pub token_limits: TokenLimits,
}

impl ModelOptions {
    /// Use `token_limits` if given, otherwise look them up for `model`.
    pub fn new(
        provider: ProviderKind,
        model: impl Into<String>,
        token_limits: Option<TokenLimits>,
    ) -> Self {
        let model = model.into();
        let token_limits =
            token_limits.unwrap_or_else(|| TokenLimits::for_model(provider, &model));
        Self {
            model,
            token_limits,
        }
    }
}

/// Validated run options. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Options {
    debug: bool,
    disable_review: bool,
    disable_release_notes: bool,
    max_files: usize,
    review_simple_changes: bool,
    review_comment_lgtm: bool,
    path_filters: PathFilter,
    system_message: String,
    provider: ProviderKind,
    light_model: String,
    heavy_model: String,
    model_temperature: f32,
    retries: u32,
    retry_delay: Duration,
    timeout: Duration,
    concurrency_limit: usize,
    github_concurrency_limit: usize,
    language: String,
    api_base_url: Option<String>,
    light_token_limits: TokenLimits,
    heavy_token_limits: TokenLimits,
}

impl Options {
    pub fn new(raw: RawOptions) -> Result<Self, ConfigError> {
        let provider: ProviderKind = raw.provider.parse()?;

        let max_temperature = provider.max_temperature();
        if !raw.model_temperature.is_finite()
            || !(0.0..=max_temperature).contains(&raw.model_temperature)
        {
            return Err(ConfigError::invalid(
                "model_temperature",
                format!(
                    "{} is outside 0.0..={} for {}",
                    raw.model_temperature, max_temperature, provider
                ),
            ));
        }
        if raw.retries == 0 {
            return Err(ConfigError::invalid("retries", "must be at least 1"));
        }
        if raw.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be at least 1"));
        }
        if raw.concurrency_limit == 0 {
            return Err(ConfigError::invalid("concurrency_limit", "must be at least 1"));
        }
        if raw.github_concurrency_limit == 0 {
            return Err(ConfigError::invalid(
                "github_concurrency_limit",
                "must be at least 1",
            ));
        }

        let language = raw.language.trim().to_string();
        if language.is_empty() {
            return Err(ConfigError::invalid("language", "must not be empty"));
        }

        let light_model = model_or_default(provider, raw.light_model, "light_model")?;
        let heavy_model = model_or_default(provider, raw.heavy_model, "heavy_model")?;

        let api_base_url = match raw.api_base_url.map(|u| u.trim().to_string()) {
            Some(url) if url.is_empty() => None,
            Some(url) => {
                let parsed = reqwest::Url::parse(&url)
                    .map_err(|e| ConfigError::invalid("api_base_url", e.to_string()))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(ConfigError::invalid(
                        "api_base_url",
                        format!("unsupported scheme '{}'", parsed.scheme()),
                    ));
                }
                Some(url)
            }
            None => None,
        };

        let path_filters = PathFilter::new(&raw.path_filters)?;

        Ok(Self {
            debug: raw.debug,
            disable_review: raw.disable_review,
            disable_release_notes: raw.disable_release_notes,
            max_files: raw.max_files,
            review_simple_changes: raw.review_simple_changes,
            review_comment_lgtm: raw.review_comment_lgtm,
            path_filters,
            system_message: raw.system_message,
            provider,
            light_token_limits: TokenLimits::for_model(provider, &light_model),
            heavy_token_limits: TokenLimits::for_model(provider, &heavy_model),
            light_model,
            heavy_model,
            model_temperature: raw.model_temperature,
            retries: raw.retries,
            retry_delay: Duration::from_millis(raw.retry_delay_ms),
            timeout: Duration::from_millis(raw.timeout_ms),
            concurrency_limit: raw.concurrency_limit,
            github_concurrency_limit: raw.github_concurrency_limit,
            language,
            api_base_url,
        })
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn disable_review(&self) -> bool {
        self.disable_review
    }

    pub fn disable_release_notes(&self) -> bool {
        self.disable_release_notes
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn review_simple_changes(&self) -> bool {
        self.review_simple_changes
    }

    pub fn review_comment_lgtm(&self) -> bool {
        self.review_comment_lgtm
    }

    pub fn path_filters(&self) -> &PathFilter {
        &self.path_filters
    }

    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn light_model(&self) -> &str {
        &self.light_model
    }

    pub fn heavy_model(&self) -> &str {
        &self.heavy_model
    }

    pub fn model_temperature(&self) -> f32 {
        self.model_temperature
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Pause between retry attempts
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Per-attempt HTTP timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub fn github_concurrency_limit(&self) -> usize {
        self.github_concurrency_limit
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url.as_deref()
    }

    pub fn light_token_limits(&self) -> &TokenLimits {
        &self.light_token_limits
    }

    pub fn heavy_token_limits(&self) -> &TokenLimits {
        &self.heavy_token_limits
    }

    /// Model name and limits for the given bot tier.
    pub fn model_options(&self, tier: BotTier) -> ModelOptions {
        let (model, limits) = match tier {
            BotTier::Light => (&self.light_model, &self.light_token_limits),
            BotTier::Heavy => (&self.heavy_model, &self.heavy_token_limits),
        };
        ModelOptions::new(self.provider, model.clone(), Some(limits.clone()))
    }

    /// Whether `path` passes the configured path filters.
    pub fn check_path(&self, path: &str) -> bool {
        let ok = self.path_filters.check(path);
        info!("checking path: {} => {}", path, ok);
        ok
    }

    /// Write every option to the log.
    pub fn log_summary(&self) {
        info!("debug: {}", self.debug);
        info!("disable_review: {}", self.disable_review);
        info!("disable_release_notes: {}", self.disable_release_notes);
        info!("max_files: {}", self.max_files);
        info!("review_simple_changes: {}", self.review_simple_changes);
        info!("review_comment_lgtm: {}", self.review_comment_lgtm);
        info!("path_filters: {}", self.path_filters);
        info!("system_message: {}", self.system_message);
        info!("provider: {}", self.provider);
        info!("light_model: {}", self.light_model);
        info!("heavy_model: {}", self.heavy_model);
        info!("model_temperature: {}", self.model_temperature);
        info!("retries: {}", self.retries);
        info!("retry_delay_ms: {}", self.retry_delay.as_millis());
        info!("timeout_ms: {}", self.timeout.as_millis());
        info!("concurrency_limit: {}", self.concurrency_limit);
        info!("github_concurrency_limit: {}", self.github_concurrency_limit);
        info!("light_token_limits: {}", self.light_token_limits);
        info!("heavy_token_limits: {}", self.heavy_token_limits);
        info!("language: {}", self.language);
        if let Some(url) = &self.api_base_url {
            info!("api_base_url: {}", url);
        }
    }
}

fn model_or_default(
    provider: ProviderKind,
    model: Option<String>,
    field: &'static str,
) -> Result<String, ConfigError> {
    match model.map(|m| m.trim().to_string()) {
        Some(m) if m.is_empty() => Err(ConfigError::invalid(field, "must not be empty")),
        Some(m) => Ok(m),
        None => Ok(limits::default_model(provider).to_string()),
    }
}
