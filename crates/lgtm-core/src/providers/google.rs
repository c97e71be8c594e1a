//! Google Gemini provider

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{Completion, CompletionProvider, CompletionRequest};

/// Google Gemini provider
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(client: Client, api_key: String, model: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }

    fn to_gemini_request(request: &CompletionRequest) -> GeminiRequest<'_> {
        GeminiRequest {
            contents: vec![GeminiRequestContent {
                role: "user",
                parts: vec![GeminiRequestPart {
                    text: &request.message,
                }],
            }],
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiRequestPart {
                    text: &request.system,
                }],
            },
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        }
    }

    /// Convert a Gemini response to the provider-agnostic form.
    ///
    /// The text is every text part of the first candidate joined together,
    /// which is what Gemini clients expose as the response text. A blocked
    /// prompt comes back without candidates; that is a final answer with empty
    /// text, not a failure worth resending.
    fn from_gemini_response(resp: GeminiApiResponse, raw: Value) -> Completion {
        let Some(candidate) = resp.candidates.into_iter().next() else {
            warn!(
                "Gemini response had no candidates (block_reason={:?})",
                resp.prompt_feedback.and_then(|f| f.block_reason)
            );
            return Completion {
                text: Some(String::new()),
                response_id: resp.response_id,
                raw,
            };
        };

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        Completion {
            text: Some(text),
            response_id: resp.response_id,
            raw,
        }
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = Self::to_gemini_request(request);

        debug!(
            "Gemini request: model={}, max_output_tokens={}",
            self.model, request.max_output_tokens
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = super::error_body(response).await;
            return Err(anyhow!(
                "Gemini API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let raw: Value = response
            .json()
            .await
            .context("Failed to read Gemini API response")?;
        let api_response: GeminiApiResponse = serde_json::from_value(raw.clone())
            .context("Failed to parse Gemini API response")?;

        debug!(
            "Gemini response: candidates={}, finish_reason={:?}",
            api_response.candidates.len(),
            api_response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
        );

        Ok(Self::from_gemini_response(api_response, raw))
    }
}

// ── Gemini wire types ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiRequestContent<'a>>,
    system_instruction: GeminiSystemInstruction<'a>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiRequestContent<'a> {
    role: &'static str,
    parts: Vec<GeminiRequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: Vec<GeminiRequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiRequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

/// Non-text parts (function calls, inline data) deserialize with `text: None`.
#[derive(Debug, Clone, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> GeminiProvider {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        GeminiProvider::new(
            client,
            "AIza-secret".to_string(),
            "gemini-2.0-flash".to_string(),
            base_url.to_string(),
        )
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "Be brief.".to_string(),
            message: "Summarize".to_string(),
            temperature: 0.5,
            max_output_tokens: 3000,
        }
    }

    fn parse(raw: Value) -> Completion {
        let resp: GeminiApiResponse = serde_json::from_value(raw.clone()).unwrap();
        GeminiProvider::from_gemini_response(resp, raw)
    }

    #[test]
    fn test_request_shape() {
        let req = request();
        let body = serde_json::to_value(GeminiProvider::to_gemini_request(&req)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Summarize");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 3000);
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn test_from_gemini_response_joins_text_parts() {
        let completion = parse(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "world"}]},
                "finishReason": "STOP"
            }],
            "responseId": "resp-42"
        }));
        assert_eq!(completion.text.as_deref(), Some("Hello, world"));
        assert_eq!(completion.response_id.as_deref(), Some("resp-42"));
    }

    #[test]
    fn test_from_gemini_response_skips_non_text_parts() {
        let completion = parse(json!({
            "candidates": [{
                "content": {"parts": [{"functionCall": {"name": "x", "args": {}}}, {"text": "ok"}]}
            }]
        }));
        assert_eq!(completion.text.as_deref(), Some("ok"));
        assert!(completion.response_id.is_none());
    }

    #[test]
    fn test_from_gemini_response_blocked_candidate_has_empty_text() {
        let completion = parse(json!({"candidates": [{"finishReason": "SAFETY"}]}));
        assert_eq!(completion.text.as_deref(), Some(""));
    }

    #[test]
    fn test_from_gemini_response_blocked_prompt_is_empty_answer() {
        let completion = parse(json!({
            "promptFeedback": {"blockReason": "SAFETY"},
            "responseId": "blocked-1"
        }));
        assert_eq!(completion.text.as_deref(), Some(""));
        assert_eq!(completion.response_id.as_deref(), Some("blocked-1"));

        let completion = parse(json!({"candidates": []}));
        assert_eq!(completion.text.as_deref(), Some(""));
        assert!(completion.response_id.is_none());
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": {"blockReason": "PROHIBITED_CONTENT"},
                "responseId": "gem-blocked"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = provider(&server.uri()).complete(&request()).await.unwrap();
        assert_eq!(completion.text.as_deref(), Some(""));
        assert_eq!(completion.response_id.as_deref(), Some("gem-blocked"));
    }

    #[test]
    fn test_gemini_provider_debug_hides_key() {
        let debug = format!("{:?}", provider("https://generativelanguage.googleapis.com"));
        assert!(!debug.contains("AIza-secret"));
    }

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "AIza-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "Looks fine"}]},
                    "finishReason": "STOP"
                }],
                "responseId": "gem-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = provider(&server.uri()).complete(&request()).await.unwrap();
        assert_eq!(completion.text.as_deref(), Some("Looks fine"));
        assert_eq!(completion.response_id.as_deref(), Some("gem-1"));
    }

    #[tokio::test]
    async fn test_complete_reports_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(&request())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("503"));
        assert!(err.contains("overloaded"));
    }
}
