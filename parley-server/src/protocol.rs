//! Wire envelopes exchanged with the game client.
//!
//! One JSON object per WebSocket text frame. Inbound requests are checked for
//! their required identifiers first, so a missing id is always reported as
//! such even when other fields are malformed too.

use parley_core::{Action, NpcSeed};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DispatchError;

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// NPC identity echoed in a dialogue response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcRef {
    /// NPC id from the request.
    pub id: String,
    /// NPC name from the request, or empty.
    pub name: String,
}

/// Every message the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// NPC reply to a dialogue request.
    Dialogue {
        /// Who spoke.
        npc: NpcRef,
        /// Reply with directives stripped.
        text: String,
        /// Directives found in the reply.
        actions: Vec<Action>,
        /// Synthesised audio, relative to the voice output directory.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice: Option<String>,
    },
    /// Acknowledgement of a recorded event.
    EventAck {
        /// NPC the event was recorded against.
        #[serde(rename = "npcId")]
        npc_id: String,
        /// Event kind as sent.
        #[serde(rename = "eventType")]
        event_type: String,
        /// Always `"success"`.
        status: String,
    },
    /// Request failed.
    Error {
        /// Human-readable reason.
        error: String,
        /// 400 for client faults, 500 for processing faults.
        code: u16,
    },
}

impl OutboundMessage {
    /// Successful event acknowledgement.
    #[must_use]
    pub fn event_ack(npc_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self::EventAck {
            npc_id: npc_id.into(),
            event_type: event_type.into(),
            status: "success".into(),
        }
    }

    /// Whether this is an error envelope.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// The `npc` object of a dialogue request.
#[derive(Debug, Clone, Default, Deserialize)]
struct NpcPayload {
    id: String,
    #[serde(flatten)]
    seed: NpcSeed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DialoguePayload {
    npc: NpcPayload,
    #[serde(default)]
    player_message: Option<String>,
    #[serde(default)]
    game_state: Option<Map<String, Value>>,
    #[serde(default)]
    memory: Option<Map<String, Value>>,
}

/// A validated `dialogue` request.
#[derive(Debug, Clone)]
pub struct DialogueRequest {
    /// Target NPC.
    pub npc_id: String,
    /// Descriptive NPC fields supplied by the client.
    pub npc: NpcSeed,
    /// What the player said.
    pub player_message: String,
    /// Free-form game state (location, time of day, player details, …).
    pub game_state: Map<String, Value>,
    /// Externally held memory to restore before generating.
    pub memory: Option<Map<String, Value>>,
}

impl DialogueRequest {
    /// Validate a decoded `dialogue` envelope.
    ///
    /// # Errors
    ///
    /// `Missing NPC ID` when `npc.id` is absent or empty, otherwise
    /// `Invalid dialogue request: …` when a field has the wrong JSON type.
    pub fn parse(envelope: &Map<String, Value>) -> Result<Self, DispatchError> {
        let id = envelope.get("npc").and_then(|npc| npc.get("id"));
        if is_blank(id) {
            return Err(DispatchError::bad_request("Missing NPC ID"));
        }

        let payload: DialoguePayload = serde_json::from_value(Value::Object(envelope.clone()))
            .map_err(|e| DispatchError::bad_request(format!("Invalid dialogue request: {e}")))?;

        Ok(Self {
            npc_id: payload.npc.id,
            npc: payload.npc.seed,
            player_message: payload.player_message.unwrap_or_default(),
            game_state: payload.game_state.unwrap_or_default(),
            memory: payload.memory,
        })
    }

    /// Identity to echo back in the response.
    #[must_use]
    pub fn npc_ref(&self) -> NpcRef {
        NpcRef {
            id: self.npc_id.clone(),
            name: self.npc.name.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload {
    npc_id: String,
    event_type: String,
    #[serde(default)]
    description: Value,
}

/// A validated `event` request.
#[derive(Debug, Clone)]
pub struct EventRequest {
    /// Target NPC.
    pub npc_id: String,
    /// Symbolic event kind.
    pub event_type: String,
    /// Any JSON value; `null` when absent.
    pub description: Value,
}

impl EventRequest {
    /// Validate a decoded `event` envelope.
    ///
    /// # Errors
    ///
    /// `Missing NPC ID`, then `Missing event type`, then
    /// `Invalid event request: …` for identifiers that are not strings.
    pub fn parse(envelope: &Map<String, Value>) -> Result<Self, DispatchError> {
        if is_blank(envelope.get("npcId")) {
            return Err(DispatchError::bad_request("Missing NPC ID"));
        }
        if is_blank(envelope.get("eventType")) {
            return Err(DispatchError::bad_request("Missing event type"));
        }

        let payload: EventPayload = serde_json::from_value(Value::Object(envelope.clone()))
            .map_err(|e| DispatchError::bad_request(format!("Invalid event request: {e}")))?;

        Ok(Self {
            npc_id: payload.npc_id,
            event_type: payload.event_type,
            description: payload.description,
        })
    }
}

/// Absent, `null`, and `""` all count as missing.
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// How an unrecognised `type` is quoted back in the error message.
#[must_use]
pub fn describe_type(kind: Option<&Value>) -> String {
    match kind {
        None => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn dialogue_defaults() {
        let req = DialogueRequest::parse(&object(json!({"type": "dialogue", "npc": {"id": "n1"}})))
            .expect("valid");
        assert_eq!(req.npc_id, "n1");
        assert_eq!(req.player_message, "");
        assert!(req.game_state.is_empty());
        assert!(req.memory.is_none());
        assert_eq!(req.npc_ref(), NpcRef { id: "n1".into(), name: String::new() });
    }

    #[test]
    fn dialogue_reads_seed_fields() {
        let req = DialogueRequest::parse(&object(json!({
            "npc": {"id": "n1", "name": "Ajira", "race": "Khajiit", "class": "Alchemist"},
            "playerMessage": "Hello",
            "gameState": {"location": "Balmora"},
            "memory": {"disposition": 70},
        })))
        .expect("valid");
        assert_eq!(req.npc.name.as_deref(), Some("Ajira"));
        assert_eq!(req.npc.class.as_deref(), Some("Alchemist"));
        assert_eq!(req.player_message, "Hello");
        assert_eq!(req.game_state["location"], "Balmora");
        assert_eq!(req.memory.expect("memory")["disposition"], 70);
    }

    #[test]
    fn missing_id_wins_over_type_errors() {
        for body in [
            json!({"npc": {}}),
            json!({"npc": {"id": ""}}),
            json!({"npc": {"id": null}, "playerMessage": 5}),
            json!({"playerMessage": 5}),
        ] {
            let err = DialogueRequest::parse(&object(body)).expect_err("missing id");
            assert_eq!(err.to_string(), "Missing NPC ID");
        }
    }

    #[test]
    fn wrong_field_types_are_bad_requests() {
        let err = DialogueRequest::parse(&object(json!({"npc": {"id": "n1"}, "playerMessage": 5})))
            .expect_err("wrong type");
        assert_eq!(err.code(), 400);
        assert!(err.to_string().starts_with("Invalid dialogue request: "));

        let err = DialogueRequest::parse(&object(json!({"npc": {"id": 7}}))).expect_err("numeric id");
        assert!(err.to_string().starts_with("Invalid dialogue request: "));
    }

    #[test]
    fn event_checks_id_then_type() {
        let err = EventRequest::parse(&object(json!({"eventType": "combat"}))).expect_err("no id");
        assert_eq!(err.to_string(), "Missing NPC ID");
        let err = EventRequest::parse(&object(json!({"npcId": "n1"}))).expect_err("no type");
        assert_eq!(err.to_string(), "Missing event type");

        let req = EventRequest::parse(&object(json!({"npcId": "n1", "eventType": "combat"})))
            .expect("valid");
        assert_eq!(req.description, Value::Null);
    }

    #[test]
    fn outbound_shapes() {
        let ack = serde_json::to_value(OutboundMessage::event_ack("n1", "theft")).expect("serialize");
        assert_eq!(
            ack,
            json!({"type": "event_ack", "npcId": "n1", "eventType": "theft", "status": "success"})
        );

        let dialogue = OutboundMessage::Dialogue {
            npc: NpcRef { id: "n1".into(), name: String::new() },
            text: "Hello!".into(),
            actions: vec![Action::new("GREET")],
            voice: None,
        };
        assert_eq!(
            serde_json::to_value(dialogue).expect("serialize"),
            json!({"type": "dialogue", "npc": {"id": "n1", "name": ""}, "text": "Hello!", "actions": [{"type": "GREET", "params": {}}]})
        );
    }

    #[test]
    fn unknown_type_rendering() {
        assert_eq!(describe_type(None), "null");
        assert_eq!(describe_type(Some(&json!("ping"))), "ping");
        assert_eq!(describe_type(Some(&json!(3))), "3");
        assert_eq!(describe_type(Some(&json!(["a"]))), "[\"a\"]");
    }
}
