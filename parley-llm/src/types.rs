//! Core types for generation requests and responses.

use serde::{Deserialize, Serialize};

/// Sampling and deadline settings shared by every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
    /// Frequency penalty (ignored by providers without one).
    pub frequency_penalty: f32,
    /// Presence penalty (ignored by providers without one).
    pub presence_penalty: f32,
    /// Deadline for a single HTTP attempt, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            timeout_ms: 30_000,
        }
    }
}

/// A request to the text generator.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt (assistant persona, world framing).
    pub system: String,
    /// User prompt (the rendered dialogue prompt).
    pub user: String,
    /// Sampling settings.
    pub options: GenerationOptions,
}

impl LlmRequest {
    /// Request with default sampling settings.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            options: GenerationOptions::default(),
        }
    }

    /// Replace the sampling settings.
    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }
}

/// A response from the text generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text, trimmed.
    pub text: String,
    /// How many tokens were generated, when the provider reports it.
    pub tokens_generated: u32,
    /// Latency of the successful attempt in milliseconds.
    pub latency_ms: u64,
    /// Which model answered.
    pub model: String,
}

impl LlmResponse {
    /// Response carrying only text, for stubs and tests.
    #[must_use]
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_generated: 0,
            latency_ms: 0,
            model: String::new(),
        }
    }
}
