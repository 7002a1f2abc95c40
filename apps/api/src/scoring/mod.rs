//! Resume scoring — the single point of entry for all LLM calls.
//!
//! The pipeline treats extraction/scoring as a black box behind
//! [`ResumeScorer`]; `AppState` carries an `Arc<dyn ResumeScorer>` so workers
//! never know which backend is wired in. The bundled [`LlmResumeScorer`]
//! talks to the Anthropic Messages API.
//!
//! Score range contract: this backend returns `overall_score` in 0.0–1.0.
//! The shortlist reader still normalizes values > 1 as already-percentage
//! scores, so rows written by a 0–100 backend render identically.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::job::JobRequirements;
use crate::models::resume::{ExtractedFields, ScoreBreakdown};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all scoring calls. Hardcoded to prevent drift between
/// what was scored and what the job posting believes was scored.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Scorer returned empty content")]
    EmptyContent,
}

/// Everything the worker persists for one successfully scored resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub extracted_fields: ExtractedFields,
    pub extracted_text: String,
    pub overall_score: f64,
    pub score_breakdown: ScoreBreakdown,
}

/// The extraction/scoring collaborator. Latency is seconds to tens of
/// seconds per document, which is why it only ever runs on worker tasks,
/// never on the request path.
#[async_trait]
pub trait ResumeScorer: Send + Sync {
    async fn score(
        &self,
        source_key: &str,
        requirements: &JobRequirements,
    ) -> Result<ScoreOutcome, ScoringError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl ApiResponse {
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Anthropic-backed scorer. Retries 429 and 5xx with exponential backoff.
#[derive(Clone)]
pub struct LlmResumeScorer {
    client: Client,
    api_key: String,
}

impl LlmResumeScorer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    async fn call(&self, prompt: &str, system: &str) -> Result<ApiResponse, ScoringError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error: Option<ScoringError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Scoring call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(ScoringError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Scoring API returned {}: {}", status, body);
                last_error = Some(ScoringError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(ScoringError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let api_response: ApiResponse = response.json().await?;

            debug!(
                "Scoring call succeeded: input_tokens={}, output_tokens={}",
                api_response.usage.input_tokens, api_response.usage.output_tokens
            );

            return Ok(api_response);
        }

        Err(last_error.unwrap_or(ScoringError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, ScoringError> {
        let response = self.call(prompt, system).await?;
        let text = response.text().ok_or(ScoringError::EmptyContent)?;
        let text = strip_json_fences(text);
        serde_json::from_str(text).map_err(ScoringError::Parse)
    }
}

#[async_trait]
impl ResumeScorer for LlmResumeScorer {
    async fn score(
        &self,
        source_key: &str,
        requirements: &JobRequirements,
    ) -> Result<ScoreOutcome, ScoringError> {
        let prompt = prompts::SCORE_PROMPT
            .replace("{source_key}", source_key)
            .replace("{required_skills}", &requirements.required_skills.join(", "));

        let mut outcome: ScoreOutcome = self.call_json(&prompt, prompts::SCORE_SYSTEM).await?;
        outcome.overall_score = outcome.overall_score.clamp(0.0, 1.0);
        Ok(outcome)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Scripted scorer for tests: succeeds with a fixed outcome, or fails for
/// resumes whose source key is listed in `fail_keys`.
#[cfg(test)]
pub struct StaticScorer {
    pub score: f64,
    pub fail_keys: Vec<String>,
}

#[cfg(test)]
#[async_trait]
impl ResumeScorer for StaticScorer {
    async fn score(
        &self,
        source_key: &str,
        _requirements: &JobRequirements,
    ) -> Result<ScoreOutcome, ScoringError> {
        if self.fail_keys.iter().any(|k| k == source_key) {
            return Err(ScoringError::EmptyContent);
        }
        Ok(ScoreOutcome {
            extracted_fields: ExtractedFields {
                name: Some("Test Candidate".to_string()),
                ..Default::default()
            },
            extracted_text: format!("text of {source_key}"),
            overall_score: self.score,
            score_breakdown: ScoreBreakdown::default(),
        })
    }
}
