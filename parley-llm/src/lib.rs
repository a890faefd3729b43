//! # parley-llm: Generation Backends for Parley
//!
//! Provides the collaborators the dialogue engine calls out to:
//!   - **Text generation** behind [`TextGenerator`]: OpenAI-compatible chat
//!     completions, Anthropic messages, and local Ollama, with retries.
//!   - **Speech synthesis** behind [`VoiceSynthesizer`] (ElevenLabs), wrapped
//!     by the failure-tolerant [`VoiceSystem`].
//!   - **Prompt templates** and static world data via [`PromptLibrary`].
//!
//! # Failure model
//!
//! ```text
//! TextGenerator::generate   → Err(LlmError) surfaces to the caller
//! VoiceSystem::generate     → None, logged
//! PromptLibrary::load       → missing files logged, built-ins used
//! ```

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;
pub mod voice;

pub use client::{HttpGenerator, LlmProvider, TextGenerator, UnavailableGenerator, retry_budget};
pub use error::LlmError;
pub use prompt::{PromptLibrary, render_template};
pub use types::{GenerationOptions, LlmRequest, LlmResponse};
pub use voice::{ElevenLabsVoice, VoiceSynthesizer, VoiceSystem};
