use std::future::Future;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{Duration, sleep};

use crate::core::runtime::{Part, Prompt};
use crate::error::ModelError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the service declined to answer.
const REFUSAL_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Everything the model needs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Flow name, used for logging and response dumps only.
    pub flow: String,
    pub prompt: Prompt,
    /// Shape the response should take. Guidance, not a guarantee.
    pub response_schema: Value,
}

/// Transport to a generative model. Returns the raw structured output; the
/// caller decides whether it satisfies any contract.
pub trait ModelClient: Send + Sync {
    fn generate(
        &self,
        request: ModelRequest,
    ) -> impl Future<Output = Result<Value, ModelError>> + Send;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Exponential backoff for the given attempt (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub retry: RetryPolicy,
    /// Directory receiving a copy of every cleaned model response.
    pub dump_dir: Option<PathBuf>,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            dump_dir: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_with_retry(&self, request: &ModelRequest) -> Result<Value, ModelError> {
        let max_attempts = self.config.retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.generate_attempt(request).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.config.retry.backoff(attempt);
                    log::warn!(
                        "'{}' attempt {attempt}/{max_attempts} failed: {e}; retry in {delay:?}",
                        request.flow
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_attempt(&self, request: &ModelRequest) -> Result<Value, ModelError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let payload = GenerateContentRequest {
            contents: vec![Content {
                parts: request_parts(&request.prompt),
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: request.response_schema.clone(),
            },
        };

        let res = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            log::error!("API Error {status} for '{}': {body}", request.flow);
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| ModelError::Malformed(format!("unexpected response envelope: {e}")))?;
        let text = response_text(response)?;
        let cleaned = clean_json_block(&text);
        self.dump_response(&request.flow, cleaned).await;

        serde_json::from_str(cleaned)
            .map_err(|e| ModelError::Malformed(format!("response is not JSON: {e}")))
    }

    async fn dump_response(&self, flow: &str, text: &str) {
        let Some(dir) = &self.config.dump_dir else { return };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let safe_flow = flow.replace([' ', '/'], "_");
        let path = dir.join(format!("llm_response_{safe_flow}_{timestamp}.json"));

        match tokio::fs::write(&path, text).await {
            Ok(()) => log::info!("💾 LLM Response dumped to '{}'", path.display()),
            Err(e) => log::warn!("Failed to dump response to {}: {e}", path.display()),
        }
    }
}

impl ModelClient for GeminiClient {
    fn generate(
        &self,
        request: ModelRequest,
    ) -> impl Future<Output = Result<Value, ModelError>> + Send {
        async move { self.generate_with_retry(&request).await }
    }
}

fn request_parts(prompt: &Prompt) -> Vec<RequestPart> {
    prompt
        .parts()
        .iter()
        .map(|part| match part {
            Part::Text(text) => RequestPart::Text { text: text.clone() },
            Part::Media(media) => RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: media.mime_type().to_string(),
                    data: media.data().to_string(),
                },
            },
        })
        .collect()
}

fn response_text(response: GenerateContentResponse) -> Result<String, ModelError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ModelError::Refused(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Malformed("no candidates returned".into()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    match candidate.finish_reason.as_deref() {
        Some(reason) if text.trim().is_empty() && REFUSAL_REASONS.contains(&reason) => {
            Err(ModelError::Refused(reason.to_string()))
        }
        _ if text.trim().is_empty() => {
            Err(ModelError::Malformed("No text content returned".into()))
        }
        _ => Ok(text),
    }
}

/// Strips a Markdown code fence if the model wrapped its JSON in one.
fn clean_json_block(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
