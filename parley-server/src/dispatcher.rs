//! Request routing and the dialogue / event flows.
//!
//! ```text
//! raw frame ─► JSON ─► type? ─┬─ dialogue ─► resolve ─► override ─► prompt ─► generate
//!                             │                                        │
//!                             │               reply ◄─ voice ◄─ persist ◄─ append ◄─ extract
//!                             ├─ event ────► resolve ─► append ─► persist ─► ack
//!                             └─ other ────► 400
//! ```
//!
//! Every call to [`Dispatcher::handle`] yields exactly one outbound message.
//! Context mutexes are only held for short synchronous sections; the
//! generator and synthesizer are always awaited with no lock held.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parley_core::{ActionExtractor, ContextStore, Extraction};
use parley_llm::{GenerationOptions, LlmError, LlmRequest, TextGenerator, VoiceSystem};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::DispatchError;
use crate::prompt::DialoguePromptBuilder;
use crate::protocol::{DialogueRequest, EventRequest, OutboundMessage, describe_type};

/// Default overall deadline for one generation call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default system prompt when neither configuration nor templates give one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Routes decoded requests to the dialogue and event flows.
pub struct Dispatcher {
    store: Arc<ContextStore>,
    generator: Arc<dyn TextGenerator>,
    voice: Option<VoiceSystem>,
    prompts: DialoguePromptBuilder,
    extractor: ActionExtractor,
    options: GenerationOptions,
    system_prompt: String,
    generation_timeout: Duration,
    debug: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cached_npcs", &self.store.len())
            .field("generator_available", &self.generator.is_available())
            .field("voice", &self.voice.is_some())
            .field("extractor", &self.extractor)
            .field("generation_timeout", &self.generation_timeout)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher with built-in templates, extraction on, voice off.
    #[must_use]
    pub fn new(store: Arc<ContextStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            voice: None,
            prompts: DialoguePromptBuilder::default(),
            extractor: ActionExtractor::default(),
            options: GenerationOptions::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            debug: false,
        }
    }

    /// Attach a voice system; replies then carry a `voice` path when
    /// synthesis succeeds.
    #[must_use]
    pub fn with_voice(mut self, voice: Option<VoiceSystem>) -> Self {
        self.voice = voice;
        self
    }

    /// Replace the prompt builder.
    #[must_use]
    pub fn with_prompts(mut self, prompts: DialoguePromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    /// Replace the action extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: ActionExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Sampling settings sent with every generation request.
    #[must_use]
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Fallback system prompt, used when no system template is loaded.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Overall deadline for one generation call, retries included.
    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Log prompts and raw generations at debug level.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The context store requests are served from.
    #[must_use]
    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Handle one raw text frame.
    ///
    /// Never fails: protocol faults come back as 400 envelopes, processing
    /// faults (including a panic while handling) as 500 envelopes.
    pub async fn handle(&self, raw: &str) -> OutboundMessage {
        let outcome = AssertUnwindSafe(self.route(raw)).catch_unwind().await;
        match outcome {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => {
                if e.code() >= 500 {
                    error!(error = %e, "Request processing failed");
                } else {
                    warn!(error = %e, "Rejected request");
                }
                e.into()
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(panic = %reason, "Request handler panicked");
                DispatchError::Internal(reason).into()
            }
        }
    }

    /// Handle one binary frame, read as UTF-8 text.
    pub async fn handle_bytes(&self, raw: &[u8]) -> OutboundMessage {
        match std::str::from_utf8(raw) {
            Ok(text) => self.handle(text).await,
            Err(_) => {
                warn!(len = raw.len(), "Binary frame is not UTF-8");
                DispatchError::bad_request("Invalid JSON").into()
            }
        }
    }

    async fn route(&self, raw: &str) -> Result<OutboundMessage, DispatchError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|_| DispatchError::bad_request("Invalid JSON"))?;

        let empty = Map::new();
        let envelope = value.as_object().unwrap_or(&empty);
        let kind = envelope.get("type");

        match kind.and_then(Value::as_str) {
            Some("dialogue") => self.dialogue(DialogueRequest::parse(envelope)?).await,
            Some("event") => self.event(EventRequest::parse(envelope)?).await,
            _ => Err(DispatchError::bad_request(format!(
                "Unknown message type: {}",
                describe_type(kind)
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    async fn dialogue(&self, request: DialogueRequest) -> Result<OutboundMessage, DispatchError> {
        let shared = self.store.resolve(&request.npc_id, Some(&request.npc)).await;

        let snapshot = {
            let mut ctx = shared.lock();
            if let Some(memory) = &request.memory {
                ctx.apply_memory_override(memory)?;
            }
            ctx.clone()
        };

        let prompt = self.prompts.dialogue_prompt(
            &request.npc,
            &request.player_message,
            &request.game_state,
            &snapshot,
        );
        if self.debug {
            debug!(npc = %request.npc_id, %prompt, "Dialogue prompt");
        }

        let generation = LlmRequest::new(self.prompts.system_prompt(&self.system_prompt), prompt)
            .with_options(self.options);
        let timeout_ms = u64::try_from(self.generation_timeout.as_millis()).unwrap_or(u64::MAX);
        let response = tokio::time::timeout(self.generation_timeout, self.generator.generate(&generation))
            .await
            .map_err(|_| LlmError::Timeout(timeout_ms))??;
        if self.debug {
            debug!(
                npc = %request.npc_id,
                model = %response.model,
                latency_ms = response.latency_ms,
                raw = %response.text,
                "Raw generation"
            );
        }

        let Extraction { text, actions } = self.extractor.extract(&response.text);

        let updated = {
            let mut ctx = shared.lock();
            ctx.add_conversation(request.player_message.as_str(), text.as_str());
            ctx.clone()
        };
        self.store.persist(&updated).await;

        let voice = match &self.voice {
            Some(voice) => voice.generate(&text, &request.npc_id).await,
            None => None,
        };

        info!(
            npc = %request.npc_id,
            actions = actions.len(),
            tokens = response.tokens_generated,
            voice = voice.is_some(),
            "Dialogue answered"
        );

        Ok(OutboundMessage::Dialogue {
            npc: request.npc_ref(),
            text,
            actions,
            voice,
        })
    }

    async fn event(&self, request: EventRequest) -> Result<OutboundMessage, DispatchError> {
        let shared = self.store.resolve(&request.npc_id, None).await;

        let updated = {
            let mut ctx = shared.lock();
            ctx.add_event(request.event_type.as_str(), request.description);
            ctx.clone()
        };
        self.store.persist(&updated).await;

        info!(npc = %request.npc_id, event_type = %request.event_type, "Event recorded");
        Ok(OutboundMessage::event_ack(request.npc_id, request.event_type))
    }
}

/// Best-effort text of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Internal error: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Internal error: {s}")
    } else {
        "Internal error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_described() {
        let payload: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(payload.as_ref()), "Internal error: index out of bounds");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bad state"));
        assert_eq!(panic_message(payload.as_ref()), "Internal error: bad state");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "Internal error");
    }
}
