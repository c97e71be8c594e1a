use anyhow::{Context, Result, anyhow};
use lgtm_core::{Options, ProviderKind, RawOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// On-disk config file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LgtmConfig {
    #[serde(default)]
    pub review: RawOptions,
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lgtm")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl LgtmConfig {
    /// Load the config file.
    ///
    /// An explicit path must exist. A missing file at the default path means
    /// every option keeps its default.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::read(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::read(&path)
                } else {
                    debug!("No config at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `lgtm init` first.",
                path.display()
            )
        })?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if config.review.api_base_url.is_some() {
            warn!("api_base_url is set; requests will not go to the provider's public endpoint");
        }

        Ok(config)
    }
}

/// Load the config, apply `INPUT_*` overrides from the environment, validate.
pub fn load_options(custom_path: &Option<PathBuf>) -> Result<Options> {
    let mut raw = LgtmConfig::load(custom_path)?.review;
    apply_input_overrides(&mut raw, |name| std::env::var(name).ok())?;
    Options::new(raw).context("Invalid review options")
}

/// Override options from GitHub Actions style inputs (`INPUT_<NAME>`).
///
/// Unset and empty inputs leave the option untouched.
pub fn apply_input_overrides(
    raw: &mut RawOptions,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let input = |name: &str| {
        lookup(&format!("INPUT_{}", name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = input("DEBUG") {
        raw.debug = parse_bool("debug", &v)?;
    }
    if let Some(v) = input("DISABLE_REVIEW") {
        raw.disable_review = parse_bool("disable_review", &v)?;
    }
    if let Some(v) = input("DISABLE_RELEASE_NOTES") {
        raw.disable_release_notes = parse_bool("disable_release_notes", &v)?;
    }
    if let Some(v) = input("MAX_FILES") {
        raw.max_files = parse_num("max_files", &v)?;
    }
    if let Some(v) = input("REVIEW_SIMPLE_CHANGES") {
        raw.review_simple_changes = parse_bool("review_simple_changes", &v)?;
    }
    if let Some(v) = input("REVIEW_COMMENT_LGTM") {
        raw.review_comment_lgtm = parse_bool("review_comment_lgtm", &v)?;
    }
    if let Some(v) = input("PATH_FILTERS") {
        raw.path_filters = v.lines().map(str::to_string).collect();
    }
    if let Some(v) = input("SYSTEM_MESSAGE") {
        raw.system_message = v;
    }
    if let Some(v) = input("PROVIDER").or_else(|| input("MODE")) {
        raw.provider = v;
    }
    if let Some(v) = input("LIGHT_MODEL") {
        raw.light_model = Some(v);
    }
    if let Some(v) = input("HEAVY_MODEL") {
        raw.heavy_model = Some(v);
    }
    if let Some(v) = input("MODEL_TEMPERATURE") {
        raw.model_temperature = parse_num("model_temperature", &v)?;
    }
    if let Some(v) = input("RETRIES") {
        raw.retries = parse_num("retries", &v)?;
    }
    if let Some(v) = input("RETRY_DELAY_MS") {
        raw.retry_delay_ms = parse_num("retry_delay_ms", &v)?;
    }
    if let Some(v) = input("TIMEOUT_MS") {
        raw.timeout_ms = parse_num("timeout_ms", &v)?;
    }
    if let Some(v) = input("CONCURRENCY_LIMIT") {
        raw.concurrency_limit = parse_num("concurrency_limit", &v)?;
    }
    if let Some(v) = input("GITHUB_CONCURRENCY_LIMIT") {
        raw.github_concurrency_limit = parse_num("github_concurrency_limit", &v)?;
    }
    if let Some(v) = input("LANGUAGE") {
        raw.language = v;
    }
    if let Some(v) = input("API_BASE_URL") {
        raw.api_base_url = Some(v);
    }

    Ok(())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(anyhow!("Input '{}' must be true or false, got '{}'", name, other)),
    }
}

fn parse_num<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Input '{}' is not a valid number: '{}'", name, value))
}

/// Credential status for display, never the full key.
pub fn credential_status(kind: ProviderKind) -> String {
    match std::env::var(kind.credential_var()) {
        Ok(key) if !key.trim().is_empty() => mask_secret(key.trim()),
        _ => "(not set)".to_string(),
    }
}

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}
