//! Construction-time errors

use thiserror::Error;

/// Errors raised while building options or bots.
///
/// These are fatal for the thing being built: a caller that gets one should
/// abort setup rather than retry. Per-call chat failures never surface as
/// errors, see [`crate::bot::ProviderBot::chat`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to initialize the {provider} API: environment variable '{var}' is not set")]
    MissingCredential {
        provider: &'static str,
        var: &'static str,
    },

    #[error("invalid value for '{field}': {reason}")]
    InvalidOption { field: &'static str, reason: String },

    #[error("invalid path filter '{rule}': {source}")]
    InvalidPathFilter {
        rule: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("unknown provider '{0}' (expected one of: openai, gemini, anthropic)")]
    UnknownProvider(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_message_names_variable() {
        let err = ConfigError::MissingCredential {
            provider: "OpenAI",
            var: "OPENAI_API_KEY",
        };
        let msg = err.to_string();
        assert!(msg.contains("OpenAI"));
        assert!(msg.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_invalid_option_message() {
        let err = ConfigError::invalid("retries", "must be at least 1");
        assert_eq!(err.to_string(), "invalid value for 'retries': must be at least 1");
    }

    #[test]
    fn test_invalid_path_filter_keeps_source() {
        let source = glob::Pattern::new("src/[").unwrap_err();
        let err = ConfigError::InvalidPathFilter {
            rule: "src/[".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid path filter 'src/['"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
