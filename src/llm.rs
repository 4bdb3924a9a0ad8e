//! Generative text client
//!
//! Wraps the Gemini `generateContent` REST operation behind a trait seam so
//! the pipeline stages (and tests) are independent of the concrete provider.
//! Retry with exponential backoff and jitter lives here because every stage
//! shares the same discipline and differs only in the retry cap.

use crate::error::{DatalensError, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A single text-completion operation: prompt in, free-form text out.
///
/// The text may or may not contain well-formed JSON; extracting structure
/// from it is the caller's problem (see [`crate::extraction`]).
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Retry policy: bounded attempts, exponential backoff, sub-second jitter.
///
/// Delay before retry `n` is `2^n` seconds plus a random fraction of a
/// second. There is no overall deadline; the cap bounds attempts only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Clarification tolerates more retries because it degrades gracefully.
    pub const CLARIFY: RetryPolicy = RetryPolicy { max_retries: 3 };

    /// SQL generation, narration, and visualization selection.
    pub const GENERATE: RetryPolicy = RetryPolicy { max_retries: 2 };

    /// Column-type classification: a single attempt, the caller defaults on
    /// failure anyway.
    pub const CLASSIFY: RetryPolicy = RetryPolicy { max_retries: 0 };

    fn delay(&self, attempt: u32) -> Duration {
        let base_ms = (1u64 << attempt) * 1000;
        let jitter_ms = rand::thread_rng().gen_range(0..1000);
        Duration::from_millis(base_ms + jitter_ms)
    }
}

/// Shared handle to the generative service, constructed once at startup.
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn GenerativeBackend>,
}

impl LlmClient {
    pub fn gemini(api_key: String, base_url: String) -> Self {
        Self {
            backend: Arc::new(GeminiClient::new(api_key, base_url)),
        }
    }

    pub fn with_backend(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }

    /// Issue a generative call, retrying retryable failures per `policy`.
    pub async fn generate(&self, prompt: &str, policy: &RetryPolicy) -> Result<String> {
        let mut last_err = None;
        for attempt in 0..=policy.max_retries {
            match self.backend.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    let delay = policy.delay(attempt);
                    warn!(
                        "LLM call failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        policy.max_retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        // Unreachable: the loop always returns. Kept for totality.
        Err(last_err.unwrap_or_else(|| DatalensError::Llm("retries exhausted".to_string())))
    }
}

/// Gemini REST client (`models/gemini-2.0-flash:generateContent`).
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ContentPart>>,
}

#[derive(Deserialize)]
struct ContentPart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            model: "gemini-2.0-flash".to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DatalensError::Llm(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DatalensError::Llm(format!(
                "non-success status: {}",
                status
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| DatalensError::Llm(format!("unreadable response body: {}", e)))?;

        let candidate = parsed
            .candidates
            .and_then(|mut c| if c.is_empty() { None } else { Some(c.remove(0)) })
            .ok_or_else(|| DatalensError::Llm("no candidates in response".to_string()))?;

        let text = candidate
            .content
            .and_then(|c| c.parts)
            .map(|parts| {
                parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(DatalensError::Llm("empty response text".to_string()));
        }

        debug!("LLM returned {} chars", text.len());
        Ok(text)
    }
}
