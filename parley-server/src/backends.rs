//! Wiring configuration into concrete backends.

use std::sync::Arc;
use std::time::Duration;

use parley_core::config::{LlmConfig, VoiceConfig};
use parley_core::{ActionExtractor, ContextStore, ParleyConfig};
use parley_llm::client::{ANTHROPIC_BASE_URL, OLLAMA_BASE_URL, OPENAI_BASE_URL};
use parley_llm::{
    ElevenLabsVoice, GenerationOptions, HttpGenerator, LlmError, LlmProvider, PromptLibrary,
    TextGenerator, UnavailableGenerator, VoiceSystem, retry_budget,
};
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::prompt::DialoguePromptBuilder;

/// Build the text generator named by `[llm].provider`.
///
/// `env` supplies secrets; it is `std::env::var` in the binary.
///
/// # Errors
///
/// [`LlmError::ConfigError`] for an unknown provider, or for a hosted
/// provider with no API key and no custom `base_url`.
pub fn build_generator(
    config: &LlmConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn TextGenerator>, LlmError> {
    let api_key = |var: Option<&str>| -> Result<String, LlmError> {
        let key = var.and_then(&env).filter(|k| !k.is_empty());
        match (key, &config.base_url) {
            (Some(key), _) => Ok(key),
            (None, Some(_)) => Ok(String::new()),
            (None, None) => Err(LlmError::ConfigError(format!(
                "{} is not set",
                var.unwrap_or("API key")
            ))),
        }
    };
    let base_url = |default: &str| config.base_url.clone().unwrap_or_else(|| default.to_string());

    let provider = match config.provider.to_ascii_lowercase().as_str() {
        "openai" => LlmProvider::OpenAiCompatible {
            api_key: api_key(config.api_key_var())?,
            base_url: base_url(OPENAI_BASE_URL),
        },
        "anthropic" => LlmProvider::Anthropic {
            api_key: api_key(config.api_key_var())?,
            base_url: base_url(ANTHROPIC_BASE_URL),
        },
        "ollama" | "local" => LlmProvider::Ollama {
            base_url: base_url(OLLAMA_BASE_URL),
        },
        "none" => {
            warn!("No LLM provider configured; dialogue requests will fail");
            return Ok(Arc::new(UnavailableGenerator));
        }
        other => {
            return Err(LlmError::ConfigError(format!("Unknown LLM provider: {other}")));
        }
    };

    info!(provider = %config.provider, model = %config.model, "Text generator ready");
    Ok(Arc::new(HttpGenerator::new(provider, config.model.clone(), config.max_retries)))
}

/// Build the voice system when `[features].voice_generation` is on.
///
/// # Errors
///
/// [`LlmError::ConfigError`] for an unknown provider or a missing key.
pub fn build_voice(
    config: &ParleyConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Option<VoiceSystem>, LlmError> {
    if !config.features.voice_generation {
        return Ok(None);
    }
    let voice: &VoiceConfig = &config.voice;
    let output_dir = config.paths.voice_output.clone();

    match voice.provider.to_ascii_lowercase().as_str() {
        "elevenlabs" => {
            let var = voice.api_key_var().unwrap_or("ELEVENLABS_API_KEY");
            let api_key = env(var)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| LlmError::ConfigError(format!("{var} is not set")))?;
            let mut synth =
                ElevenLabsVoice::new(api_key, voice.voice_id.clone(), voice.model.clone(), &output_dir)
                    .with_timeout(Duration::from_secs(config.llm.timeout_secs));
            if let Some(base_url) = &voice.base_url {
                synth = synth.with_base_url(base_url.clone());
            }
            info!(voice_id = %voice.voice_id, dir = %output_dir.display(), "Voice generation enabled");
            Ok(Some(VoiceSystem::new(Arc::new(synth), output_dir)))
        }
        other => Err(LlmError::ConfigError(format!("Unknown voice provider: {other}"))),
    }
}

/// Sampling settings from `[llm]`.
#[must_use]
pub fn generation_options(config: &LlmConfig) -> GenerationOptions {
    GenerationOptions {
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        top_p: config.top_p,
        frequency_penalty: config.frequency_penalty,
        presence_penalty: config.presence_penalty,
        timeout_ms: config.timeout_secs.saturating_mul(1_000),
    }
}

/// Dispatcher deadline for one dialogue: `timeout_secs` per HTTP attempt,
/// across every retry and the waits between them.
#[must_use]
pub fn generation_deadline(config: &LlmConfig) -> Duration {
    retry_budget(config.max_retries, Duration::from_secs(config.timeout_secs))
}

/// Assemble a dispatcher from configuration.
///
/// # Errors
///
/// Propagates backend configuration errors.
pub fn build_dispatcher(
    config: &ParleyConfig,
    env: impl Fn(&str) -> Option<String> + Copy,
) -> Result<Dispatcher, LlmError> {
    let store = Arc::new(ContextStore::from_config(&config.paths, &config.features));
    let generator = build_generator(&config.llm, env)?;
    let voice = build_voice(config, env)?;
    let library = PromptLibrary::load(&config.paths.templates, &config.paths.static_data);

    Ok(Dispatcher::new(store, generator)
        .with_voice(voice)
        .with_prompts(DialoguePromptBuilder::new(library))
        .with_extractor(ActionExtractor::new(config.features.action_parsing))
        .with_options(generation_options(&config.llm))
        .with_system_prompt(config.llm.system_prompt.clone())
        .with_generation_timeout(generation_deadline(&config.llm))
        .with_debug(config.server.debug))
}
