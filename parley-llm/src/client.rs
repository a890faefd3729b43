//! Text generators: a trait seam plus the HTTP backends behind it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse};

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when the backend is unreachable, rejects the
    /// request on every attempt, or answers with something unparseable.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Whether a real backend sits behind this generator.
    fn is_available(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Default OpenAI endpoint root.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
/// Default Anthropic endpoint root.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
/// Default local Ollama endpoint root.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider backend for HTTP inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// OpenAI chat completions, or any server speaking the same API.
    OpenAiCompatible {
        /// Endpoint root, without `/v1`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// Anthropic messages API.
    Anthropic {
        /// Endpoint root, without `/v1`.
        base_url: String,
        /// `x-api-key` value.
        api_key: String,
    },
    /// Ollama running locally.
    Ollama {
        /// Endpoint root.
        base_url: String,
    },
}

impl LlmProvider {
    fn name(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible { .. } => "openai",
            Self::Anthropic { .. } => "anthropic",
            Self::Ollama { .. } => "ollama",
        }
    }

    fn build(&self, http: &Client, model: &str, request: &LlmRequest) -> RequestBuilder {
        let opts = &request.options;
        match self {
            Self::OpenAiCompatible { base_url, api_key } => http
                .post(format!("{}/v1/chat/completions", base_url.trim_end_matches('/')))
                .bearer_auth(api_key)
                .json(&json!({
                    "model": model,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.user },
                    ],
                    "max_tokens": opts.max_tokens,
                    "temperature": opts.temperature,
                    "top_p": opts.top_p,
                    "frequency_penalty": opts.frequency_penalty,
                    "presence_penalty": opts.presence_penalty,
                })),
            Self::Anthropic { base_url, api_key } => http
                .post(format!("{}/v1/messages", base_url.trim_end_matches('/')))
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": model,
                    "system": request.system,
                    "messages": [{ "role": "user", "content": request.user }],
                    "max_tokens": opts.max_tokens,
                    "temperature": opts.temperature,
                    "top_p": opts.top_p,
                })),
            Self::Ollama { base_url } => http
                .post(format!("{}/api/generate", base_url.trim_end_matches('/')))
                .json(&json!({
                    "model": model,
                    "prompt": format!("{}\n\n{}", request.system, request.user),
                    "stream": false,
                    "options": {
                        "temperature": opts.temperature,
                        "top_p": opts.top_p,
                        "num_predict": opts.max_tokens,
                    }
                })),
        }
    }

    /// Pull the generated text and token count out of a success body.
    fn read(&self, body: &Value) -> Option<(String, u32)> {
        let (text, tokens) = match self {
            Self::OpenAiCompatible { .. } => (
                body["choices"][0]["message"]["content"].as_str()?,
                body["usage"]["completion_tokens"].as_u64(),
            ),
            Self::Anthropic { .. } => (
                body["content"][0]["text"].as_str()?,
                body["usage"]["output_tokens"].as_u64(),
            ),
            Self::Ollama { .. } => (body["response"].as_str()?, body["eval_count"].as_u64()),
        };
        let tokens = tokens.and_then(|t| u32::try_from(t).ok()).unwrap_or(0);
        Some((text.trim().to_string(), tokens))
    }
}

// ---------------------------------------------------------------------------
// HttpGenerator
// ---------------------------------------------------------------------------

const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(10);

fn backoff_delay(base: Duration, cap: Duration, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1));
    base.saturating_mul(factor).min(cap)
}

/// Worst-case wall time of an [`HttpGenerator`] with the default backoff:
/// every attempt running for `per_attempt` plus every wait in between.
#[must_use]
pub fn retry_budget(max_retries: u32, per_attempt: Duration) -> Duration {
    (1..=max_retries).fold(per_attempt, |total, retry| {
        total
            .saturating_add(backoff_delay(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, retry))
            .saturating_add(per_attempt)
    })
}

/// Generator backed by one HTTP provider, with retries.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
}

impl HttpGenerator {
    /// Create a generator for `model` on `provider`.
    ///
    /// Failed attempts are retried up to `max_retries` times, waiting 1s,
    /// 2s, 4s and so on between attempts, capped at 10s.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        }
    }

    /// Override the retry backoff schedule.
    #[must_use]
    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    /// Model name sent to the provider.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn backoff(&self, retry: u32) -> Duration {
        backoff_delay(self.backoff_base, self.backoff_cap, retry)
    }

    async fn attempt(&self, request: &LlmRequest) -> Result<LlmResponse, Attempt> {
        let start = Instant::now();
        let resp = self
            .provider
            .build(&self.http, &self.model, request)
            .timeout(Duration::from_millis(request.options.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Attempt::Retry(format!("timed out after {}ms", request.options.timeout_ms))
                } else {
                    Attempt::Retry(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Attempt::Retry(format!("HTTP {status}: {body}")));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Attempt::Fatal(LlmError::ParseError(e.to_string())))?;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (text, tokens_generated) = self.provider.read(&body).ok_or_else(|| {
            Attempt::Fatal(LlmError::ParseError(format!(
                "{} response carried no text",
                self.provider.name()
            )))
        })?;

        Ok(LlmResponse {
            text,
            tokens_generated,
            latency_ms,
            model: self.model.clone(),
        })
    }
}

/// Outcome of a failed attempt.
enum Attempt {
    /// Worth trying again.
    Retry(String),
    /// Retrying would not help.
    Fatal(LlmError),
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let provider = self.provider.name();
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                debug!(
                    provider,
                    attempt = attempt + 1,
                    of = self.max_retries + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retrying generation"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(request).await {
                Ok(response) => {
                    debug!(
                        provider,
                        model = %response.model,
                        tokens = response.tokens_generated,
                        latency_ms = response.latency_ms,
                        "Generation complete"
                    );
                    return Ok(response);
                }
                Err(Attempt::Retry(reason)) => {
                    warn!(provider, error = %reason, "Generation attempt failed");
                    last_error = reason;
                }
                Err(Attempt::Fatal(err)) => return Err(err),
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

// ---------------------------------------------------------------------------
// UnavailableGenerator
// ---------------------------------------------------------------------------

/// Generator used when no provider is configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableGenerator;

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    async fn generate(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::Unavailable("No LLM provider configured".into()))
    }

    fn is_available(&self) -> bool {
        false
    }
}
