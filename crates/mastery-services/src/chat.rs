//! OpenAI-compatible chat-completions client (OpenRouter by default).
//!
//! Each request is a system message plus one user message carrying the
//! context document serialized as JSON. Model names, latencies, and response
//! sizes are logged; contents and the API key never are.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use mastery_core::config::GENERATION_API_KEY_ENV;
use mastery_core::{
    Config, ContentGenerator, GeneratedDocument, GenerationRequest, MasteryError, Result,
    RetryConfig, TransportErrorKind,
};

const MAX_ERROR_BODY_CHARS: usize = 300;

/// Content generator backed by a chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    app_title: String,
    referer: String,
    temperature: Option<f32>,
    retry: RetryConfig,
}

impl ChatCompletionsClient {
    /// Builds a client using the key in `OPENROUTER_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Transport` with kind `MissingCredentials` if the
    /// variable is unset or blank.
    pub fn from_env(config: &Config) -> Result<Self> {
        let api_key = std::env::var(GENERATION_API_KEY_ENV).unwrap_or_default();
        Self::new(config, api_key)
    }

    /// Builds a client with an explicit API key.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::Transport` if the key is blank or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &Config, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MasteryError::missing_credentials(GENERATION_API_KEY_ENV));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                MasteryError::transport(
                    TransportErrorKind::Network,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            app_title: config.app_title.clone(),
            referer: config.referer.clone(),
            temperature: config.temperature,
            retry: config.retry.clone(),
        })
    }

    /// The model requests are sent to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[instrument(
        level = "info",
        skip(self, request),
        fields(purpose = %request.purpose, model = %self.model)
    )]
    async fn send_once(&self, request: &GenerationRequest) -> Result<GeneratedDocument> {
        let url = format!("{}/chat/completions", self.base_url);
        let user = serde_json::to_string(&request.context)?;
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessageReq {
                    role: "system",
                    content: &request.system_instruction,
                },
                ChatMessageReq {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: self.temperature,
            response_format: request.expect_json.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };
        debug!(
            system_chars = request.system_instruction.len(),
            user_chars = user.len(),
            expect_json = request.expect_json,
            "Sending chat completion"
        );

        let started = Instant::now();
        let res = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.app_title)
            .json(&body)
            .send()
            .await
            .map_err(|e| MasteryError::transport(TransportErrorKind::Network, e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let message = extract_provider_error(&text)
                .unwrap_or_else(|| truncate(&text, MAX_ERROR_BODY_CHARS));
            return Err(MasteryError::transport(
                TransportErrorKind::from_status(status.as_u16()),
                format!("HTTP {status}: {message}"),
            ));
        }

        let text = res
            .text()
            .await
            .map_err(|e| MasteryError::transport(TransportErrorKind::Network, e.to_string()))?;
        let envelope: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            MasteryError::malformed_response(format!("unexpected response envelope: {e}"))
        })?;

        if let Some(usage) = &envelope.usage {
            info!(
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                total_tokens = ?usage.total_tokens,
                "Token usage"
            );
        }

        let content = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| MasteryError::malformed_response("response has no message content"))?;

        info!(
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            chars = content.len(),
            "Chat completion received"
        );

        if request.expect_json {
            let document: Value = serde_json::from_str(content.trim()).map_err(|e| {
                MasteryError::malformed_response(format!(
                    "expected JSON content: {e} (got: {})",
                    truncate(&content, 80)
                ))
            })?;
            Ok(GeneratedDocument::Json(document))
        } else {
            Ok(GeneratedDocument::Text(content))
        }
    }
}

#[async_trait]
impl ContentGenerator for ChatCompletionsClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedDocument> {
        let mut retries = 0;
        let mut backoff = Duration::from_millis(self.retry.initial_backoff_ms);

        loop {
            match self.send_once(&request).await {
                Err(e) if e.is_transient() && retries < self.retry.max_retries => {
                    retries += 1;
                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = self.retry.max_retries,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                result => return result,
            }
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageReq<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessageReq<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResp,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

/// Pulls `error.message` out of a provider error body.
fn extract_provider_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorWrap {
        error: ErrorObj,
    }
    #[derive(Deserialize)]
    struct ErrorObj {
        message: String,
    }
    serde_json::from_str::<ErrorWrap>(body)
        .ok()
        .map(|w| w.error.message)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}
