//! Provider-agnostic review bot
//!
//! A [`ProviderBot`] wraps exactly one [`CompletionProvider`] and gives every
//! provider the same `chat` contract: empty input is a no-op, the single
//! network call is retried, the text is normalized, continuation ids are
//! derived, and nothing ever escapes as an error.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::limits::TokenLimits;
use crate::options::{ModelOptions, Options};
use crate::providers::{Completion, CompletionProvider, CompletionRequest, ProviderKind};
use crate::retry::RetryPolicy;

/// Leading artifact some models prepend to their answer.
const WITH_PREFIX: &str = "with ";

/// Continuation identifiers returned alongside a response.
///
/// Both absent means there is no continuable state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ids {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl Ids {
    pub fn is_empty(&self) -> bool {
        self.parent_message_id.is_none() && self.conversation_id.is_none()
    }
}

/// The seam the review pipeline talks to.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Send one message and return the response text with its ids.
    ///
    /// Never fails: total failure is `("", Ids::default())`.
    async fn chat(&self, message: &str) -> (String, Ids);
}

/// A bot backed by one provider transport.
pub struct ProviderBot {
    provider: Box<dyn CompletionProvider>,
    options: Arc<Options>,
    model_options: ModelOptions,
    system_message: String,
    retry: RetryPolicy,
}

impl fmt::Debug for ProviderBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderBot")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.provider.model())
            .field("token_limits", &self.model_options.token_limits)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderBot {
    /// Build a bot around an already constructed transport.
    pub fn with_provider(
        provider: Box<dyn CompletionProvider>,
        options: Arc<Options>,
        model_options: ModelOptions,
    ) -> Self {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let system_message = build_system_message(
            options.system_message(),
            model_options.token_limits.knowledge_cut_off(),
            &today,
            options.language(),
        );
        let retry = RetryPolicy::new(options.retries()).with_delay(options.retry_delay());

        Self {
            provider,
            options,
            model_options,
            system_message,
            retry,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn token_limits(&self) -> &TokenLimits {
        &self.model_options.token_limits
    }

    /// The preamble sent as system instruction with every request.
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    fn build_request(&self, message: &str) -> CompletionRequest {
        CompletionRequest {
            system: self.system_message.clone(),
            message: message.to_string(),
            temperature: self.options.model_temperature(),
            max_output_tokens: self.model_options.token_limits.response_tokens(),
        }
    }

    async fn chat_inner(&self, message: &str) -> Result<(String, Ids)> {
        if message.is_empty() {
            return Ok((String::new(), Ids::default()));
        }

        let request = self.build_request(message);
        let name = self.provider.provider_name();

        let start = Instant::now();
        let outcome = self
            .retry
            .run(name, || self.provider.complete(&request))
            .await;
        info!(
            "{} sendMessage (including retries) response time: {} ms",
            name,
            start.elapsed().as_millis()
        );

        // An exhausted retry is an absent response: empty text, no ids
        let completion = match outcome {
            Ok(completion) => completion,
            Err(e) => {
                warn!(
                    "{} response is null after {} attempts: {:#}",
                    name,
                    self.retry.max_attempts(),
                    e
                );
                return Ok((String::new(), Ids::default()));
            }
        };

        if self.options.debug() {
            info!("{} raw response: {}", name, serde_json::to_string(&completion.raw)?);
        }

        let text = normalize_text(&completion);
        if self.options.debug() {
            info!("{} response text: {}", name, text);
        }

        let ids = Ids {
            parent_message_id: Some(message_hash(message)),
            conversation_id: completion.response_id,
        };
        debug!("{} ids: {:?}", name, ids);

        Ok((text, ids))
    }
}

#[async_trait]
impl Bot for ProviderBot {
    async fn chat(&self, message: &str) -> (String, Ids) {
        match self.chat_inner(message).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to chat: {:#}", e);
                (String::new(), Ids::default())
            }
        }
    }
}

/// Build a bot of the configured provider for one model tier.
///
/// The API key is read from the provider's environment variable; a missing or
/// blank key fails here rather than on the first call.
pub fn create_bot(
    options: Arc<Options>,
    model_options: ModelOptions,
) -> Result<ProviderBot, ConfigError> {
    let kind = options.provider();
    let api_key = resolve_credential(kind, |var| std::env::var(var).ok())?;
    let provider = kind.connect(
        api_key,
        model_options.model.clone(),
        options.api_base_url(),
        options.timeout(),
    )?;

    info!(
        "Initialized {} bot: model={}, {}",
        kind.display_name(),
        model_options.model,
        model_options.token_limits
    );

    Ok(ProviderBot::with_provider(provider, options, model_options))
}

/// Look up the provider's API key with `lookup`, treating blank as missing.
pub fn resolve_credential(
    kind: ProviderKind,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let var = kind.credential_var();
    match lookup(var) {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(ConfigError::MissingCredential {
            provider: kind.display_name(),
            var,
        }),
    }
}

/// Assemble the system preamble.
pub fn build_system_message(base: &str, cut_off: &str, date: &str, language: &str) -> String {
    format!(
        "{base}\nKnowledge cutoff: {cut_off}\nCurrent date: {date}\n\n\
         IMPORTANT: Entire response must be in the language with ISO code: {language}"
    )
}

fn normalize_text(completion: &Completion) -> String {
    let text = completion.text.as_deref().unwrap_or("");
    text.strip_prefix(WITH_PREFIX).unwrap_or(text).to_string()
}

/// Lowercase hex SHA-256 of the message.
fn message_hash(message: &str) -> String {
    Sha256::digest(message.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{BotTier, RawOptions};
    use anyhow::anyhow;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted outcomes and records every request it sees.
    struct ScriptedProvider {
        outcomes: Mutex<VecDeque<Result<Completion>>>,
        calls: Arc<AtomicU32>,
        seen: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl ScriptedProvider {
        fn new(outcomes: Vec<Result<Completion>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Arc::new(AtomicU32::new(0)),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    fn options(raw: RawOptions) -> Arc<Options> {
        Arc::new(Options::new(raw).unwrap())
    }

    fn bot(
        raw: RawOptions,
        outcomes: Vec<Result<Completion>>,
    ) -> (ProviderBot, Arc<AtomicU32>, Arc<Mutex<Vec<CompletionRequest>>>) {
        let provider = ScriptedProvider::new(outcomes);
        let calls = provider.calls.clone();
        let seen = provider.seen.clone();
        let options = options(raw);
        let model = options.model_options(BotTier::Light);
        (
            ProviderBot::with_provider(Box::new(provider), options, model),
            calls,
            seen,
        )
    }

    #[tokio::test]
    async fn test_empty_message_makes_no_request() {
        let (bot, calls, _) = bot(RawOptions::default(), vec![Ok(Completion::text("x"))]);
        let (text, ids) = bot.chat("").await;
        assert_eq!(text, "");
        assert!(ids.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_chat() {
        let (bot, calls, _) = bot(
            RawOptions::default(),
            vec![Ok(Completion::text("LGTM").with_response_id("chatcmpl-1"))],
        );
        let (text, ids) = bot.chat("review this").await;
        assert_eq!(text, "LGTM");
        assert_eq!(ids.conversation_id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(
            ids.parent_message_id.as_deref(),
            Some(message_hash("review this").as_str())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_strips_single_with_prefix() {
        let (bot, _, _) = bot(
            RawOptions::default(),
            vec![
                Ok(Completion::text("with Looks good to me")),
                Ok(Completion::text("with with twice")),
                Ok(Completion::text("Without change")),
            ],
        );
        assert_eq!(bot.chat("a").await.0, "Looks good to me");
        assert_eq!(bot.chat("b").await.0, "with twice");
        assert_eq!(bot.chat("c").await.0, "Without change");
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (bot, calls, seen) = bot(
            RawOptions::default(),
            vec![
                Err(anyhow!("503")),
                Err(anyhow!("timeout")),
                Ok(Completion::text("third time")),
            ],
        );
        let (text, _) = bot.chat("hello").await;
        assert_eq!(text, "third time");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let seen = seen.lock().unwrap();
        assert!(seen.windows(2).all(|w| w[0] == w[1]), "identical request each attempt");
    }

    #[tokio::test]
    async fn test_exhaustion_is_fail_soft() {
        let (bot, calls, _) = bot(
            RawOptions {
                retries: 2,
                ..RawOptions::default()
            },
            vec![Err(anyhow!("down")), Err(anyhow!("down")), Ok(Completion::text("late"))],
        );
        let (text, ids) = bot.chat("hello").await;
        assert_eq!(text, "");
        assert!(ids.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_from_options() {
        let (bot, calls, _) = bot(
            RawOptions {
                retries: 3,
                retry_delay_ms: 500,
                ..RawOptions::default()
            },
            vec![Err(anyhow!("down")), Err(anyhow!("down")), Ok(Completion::text("up"))],
        );
        let start = tokio::time::Instant::now();
        let (text, _) = bot.chat("hello").await;
        assert_eq!(text, "up");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= std::time::Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_absent_text_is_empty() {
        let (bot, _, _) = bot(
            RawOptions::default(),
            vec![Ok(Completion::default().with_response_id("r1"))],
        );
        let (text, ids) = bot.chat("x").await;
        assert_eq!(text, "");
        assert_eq!(ids.conversation_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_request_carries_preamble_temperature_and_cap() {
        let (bot, _, seen) = bot(
            RawOptions {
                system_message: "You are a reviewer.".to_string(),
                model_temperature: 0.3,
                language: "fr-FR".to_string(),
                debug: true,
                ..RawOptions::default()
            },
            vec![Ok(Completion {
                text: Some("ok".to_string()),
                response_id: None,
                raw: json!({"choices": []}),
            })],
        );
        bot.chat("diff").await;

        let seen = seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.message, "diff");
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.max_output_tokens, 3_000);
        assert!(request.system.starts_with("You are a reviewer.\nKnowledge cutoff: 2023-10-1\n"));
        assert!(request.system.ends_with("language with ISO code: fr-FR"));
    }

    #[tokio::test]
    async fn test_same_message_same_parent_id() {
        let (bot, _, _) = bot(
            RawOptions::default(),
            vec![
                Ok(Completion::text("a").with_response_id("1")),
                Ok(Completion::text("b").with_response_id("2")),
            ],
        );
        let (_, first) = bot.chat("same").await;
        let (_, second) = bot.chat("same").await;
        assert_eq!(first.parent_message_id, second.parent_message_id);
        assert_ne!(first.conversation_id, second.conversation_id);
    }

    #[test]
    fn test_build_system_message_format() {
        let msg = build_system_message("Base", "2024-06-20", "2026-01-02", "en-US");
        assert_eq!(
            msg,
            "Base\nKnowledge cutoff: 2024-06-20\nCurrent date: 2026-01-02\n\n\
             IMPORTANT: Entire response must be in the language with ISO code: en-US"
        );
    }

    #[test]
    fn test_message_hash_is_sha256_hex() {
        assert_eq!(
            message_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_resolve_credential() {
        let key = resolve_credential(ProviderKind::Gemini, |var| {
            (var == "GOOGLE_API_KEY").then(|| " AIza-key ".to_string())
        })
        .unwrap();
        assert_eq!(key, "AIza-key");

        let err = resolve_credential(ProviderKind::Anthropic, |_| None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential { var: "ANTHROPIC_API_KEY", .. }
        ));

        let err =
            resolve_credential(ProviderKind::OpenAi, |_| Some("   ".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn test_ids_serde_names() {
        let ids = Ids {
            parent_message_id: Some("p".to_string()),
            conversation_id: None,
        };
        assert_eq!(serde_json::to_string(&ids).unwrap(), r#"{"parentMessageId":"p"}"#);
        assert_eq!(serde_json::to_string(&Ids::default()).unwrap(), "{}");
        let back: Ids = serde_json::from_str(r#"{"conversationId":"c"}"#).unwrap();
        assert_eq!(back.conversation_id.as_deref(), Some("c"));
    }

    #[test]
    fn test_debug_output() {
        let (bot, _, _) = bot(RawOptions::default(), vec![]);
        let debug = format!("{:?}", bot);
        assert!(debug.contains("scripted"));
        assert!(debug.contains("scripted-1"));
    }
}
