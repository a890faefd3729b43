//! Speech synthesis for NPC replies.
//!
//! A [`VoiceSynthesizer`] turns text into an audio file on disk. The
//! [`VoiceSystem`] wrapper is what the server calls: it swallows failures
//! (voice is optional garnish on a dialogue reply) and reports paths relative
//! to the output directory so clients can resolve them against their own
//! mount of it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::LlmError;

/// Default ElevenLabs endpoint root.
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Anything that can render text to an audio file.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Synthesise `text` spoken by `npc_id` and return the written file.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] if the backend fails or the file cannot be written.
    async fn synthesize(&self, text: &str, npc_id: &str) -> Result<PathBuf, LlmError>;
}

// ---------------------------------------------------------------------------
// ElevenLabs
// ---------------------------------------------------------------------------

/// ElevenLabs text-to-speech.
#[derive(Debug, Clone)]
pub struct ElevenLabsVoice {
    http: Client,
    base_url: String,
    api_key: String,
    voice_id: String,
    model: String,
    output_dir: PathBuf,
    timeout: Duration,
}

impl ElevenLabsVoice {
    /// Synthesiser writing MP3 files into `output_dir`.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
        model: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: ELEVENLABS_BASE_URL.to_string(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model: model.into(),
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Point at a different endpoint root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Deadline for one synthesis request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn file_name(npc_id: &str) -> String {
        let stem: String = npc_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{stem}_{}.mp3", Uuid::new_v4().simple())
    }
}

#[async_trait]
impl VoiceSynthesizer for ElevenLabsVoice {
    async fn synthesize(&self, text: &str, npc_id: &str) -> Result<PathBuf, LlmError> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.base_url.trim_end_matches('/'),
            self.voice_id
        );
        let resp = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&json!({ "text": text, "model_id": self.model }))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("HTTP {status}: {body}")));
        }

        let audio = resp.bytes().await?;
        let path = self.output_dir.join(Self::file_name(npc_id));
        tokio::fs::write(&path, &audio).await?;
        info!(npc = %npc_id, path = %path.display(), bytes = audio.len(), "Generated voice file");
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// VoiceSystem
// ---------------------------------------------------------------------------

/// Failure-tolerant front for a [`VoiceSynthesizer`].
#[derive(Clone)]
pub struct VoiceSystem {
    synthesizer: Arc<dyn VoiceSynthesizer>,
    output_dir: PathBuf,
}

impl std::fmt::Debug for VoiceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSystem")
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl VoiceSystem {
    /// Wrap `synthesizer`, reporting paths relative to `output_dir`.
    #[must_use]
    pub fn new(synthesizer: Arc<dyn VoiceSynthesizer>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            synthesizer,
            output_dir: output_dir.into(),
        }
    }

    /// Directory synthesised files land in.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Synthesise `text` and return the file path relative to the output
    /// directory, or `None` on any failure.
    pub async fn generate(&self, text: &str, npc_id: &str) -> Option<String> {
        match self.synthesizer.synthesize(text, npc_id).await {
            Ok(path) => {
                let relative = path.strip_prefix(&self.output_dir).unwrap_or(&path);
                Some(relative.to_string_lossy().into_owned())
            }
            Err(e) => {
                error!(npc = %npc_id, error = %e, "Voice generation failed");
                None
            }
        }
    }
}
