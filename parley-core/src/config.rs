//! Configuration for the Parley dialogue server.
//!
//! Loaded from `parley.toml`, then selectively overridden from environment
//! variables. API keys are never read from the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

/// Top-level Parley configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    /// Listener and logging settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Text-generation backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Speech-synthesis backend.
    #[serde(default)]
    pub voice: VoiceConfig,
    /// Data directories.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Feature switches.
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ParleyError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| ParleyError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply overrides from the process environment.
    ///
    /// # Errors
    /// Returns `ParleyError::Config` if an override cannot be parsed.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    ///
    /// Recognised: `SERVER_HOST`, `SERVER_PORT`, `LOG_LEVEL`, `LLM_PROVIDER`,
    /// `LLM_MODEL`, `LLM_BASE_URL`, `VOICE_ENABLED`, `VOICE_PROVIDER`,
    /// `VOICE_ID`.
    ///
    /// # Errors
    /// Returns `ParleyError::Config` if `SERVER_PORT` is not a port number.
    pub fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("SERVER_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ParleyError::Config(format!("SERVER_PORT is not a port: {port:?}")))?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.server.log_level = level.to_lowercase();
        }
        if let Some(provider) = var("LLM_PROVIDER") {
            self.llm.provider = provider.to_lowercase();
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = var("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(enabled) = var("VOICE_ENABLED") {
            self.features.voice_generation = enabled.trim().eq_ignore_ascii_case("true");
        }
        if let Some(provider) = var("VOICE_PROVIDER") {
            self.voice.provider = provider.to_lowercase();
        }
        if let Some(voice_id) = var("VOICE_ID") {
            self.voice.voice_id = voice_id;
        }
        Ok(())
    }

    /// Effective tracing filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        if self.server.debug {
            "debug"
        } else {
            &self.server.log_level
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Listener and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Verbose mode: forces `debug` logging and logs prompts and raw replies.
    #[serde(default)]
    pub debug: bool,
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            log_level: default_log_level(),
        }
    }
}

/// Text-generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "openai", "anthropic", "ollama" (alias "local"), or "none".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,
    /// Endpoint override; the provider's public endpoint when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Upper bound on generated tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Nucleus sampling cutoff.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Frequency penalty (OpenAI-compatible providers only).
    #[serde(default)]
    pub frequency_penalty: f32,
    /// Presence penalty (OpenAI-compatible providers only).
    #[serde(default)]
    pub presence_penalty: f32,
    /// Deadline for one HTTP attempt, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// System prompt sent with every request.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl LlmConfig {
    /// Environment variable holding the API key for the configured provider.
    #[must_use]
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "openai" => Some("OPENAI_API_KEY"),
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            _ => None,
        }
    }
}

/// Speech-synthesis backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Provider: "elevenlabs".
    #[serde(default = "default_voice_provider")]
    pub provider: String,
    /// Provider voice identifier.
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    /// Provider model name.
    #[serde(default = "default_voice_model")]
    pub model: String,
    /// Endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            provider: default_voice_provider(),
            voice_id: default_voice_id(),
            model: default_voice_model(),
            base_url: None,
        }
    }
}

impl VoiceConfig {
    /// Environment variable holding the API key for the configured provider.
    #[must_use]
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "elevenlabs" => Some("ELEVENLABS_API_KEY"),
            _ => None,
        }
    }
}

/// Data directories, relative to the working directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Read-only hand-authored NPC records.
    #[serde(default = "default_npc_profiles")]
    pub npc_profiles: PathBuf,
    /// Saved NPC sessions.
    #[serde(default = "default_memories")]
    pub memories: PathBuf,
    /// Faction, location and lore JSON files.
    #[serde(default = "default_static_data")]
    pub static_data: PathBuf,
    /// Prompt templates (`*.txt`).
    #[serde(default = "default_templates")]
    pub templates: PathBuf,
    /// Synthesised audio files.
    #[serde(default = "default_voice_output")]
    pub voice_output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            npc_profiles: default_npc_profiles(),
            memories: default_memories(),
            static_data: default_static_data(),
            templates: default_templates(),
            voice_output: default_voice_output(),
        }
    }
}

impl PathsConfig {
    /// Directories the server writes to or expects, created at startup.
    #[must_use]
    pub fn writable_dirs(&self) -> [&Path; 3] {
        [
            self.memories.as_path(),
            self.npc_profiles.as_path(),
            self.voice_output.as_path(),
        ]
    }
}

/// Feature switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Extract embedded actions from generated text.
    #[serde(default = "default_true")]
    pub action_parsing: bool,
    /// Save contexts to the memory directory after each mutation.
    #[serde(default = "default_true")]
    pub memory_persistence: bool,
    /// Attach synthesised speech to dialogue responses.
    #[serde(default)]
    pub voice_generation: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            action_parsing: true,
            memory_persistence: true,
            voice_generation: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_host() -> String { "localhost".to_string() }
fn default_port() -> u16 { 8080 }
fn default_log_level() -> String { "info".to_string() }
fn default_provider() -> String { "openai".to_string() }
fn default_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 150 }
fn default_top_p() -> f32 { 1.0 }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_retries() -> u32 { 2 }
fn default_system_prompt() -> String { "You are a helpful assistant.".to_string() }
fn default_voice_provider() -> String { "elevenlabs".to_string() }
fn default_voice_id() -> String { "default".to_string() }
fn default_voice_model() -> String { "eleven_monolingual_v1".to_string() }
fn default_npc_profiles() -> PathBuf { PathBuf::from("npc-profiles") }
fn default_memories() -> PathBuf { PathBuf::from("memories") }
fn default_static_data() -> PathBuf { PathBuf::from("static-data") }
fn default_templates() -> PathBuf { PathBuf::from("static-data/templates") }
fn default_voice_output() -> PathBuf { PathBuf::from("voice-output") }
