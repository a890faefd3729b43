//! Per-NPC session context: descriptive fields plus bounded conversation and
//! event memory.
//!
//! Both histories behave as FIFO rings. New entries are appended at the back
//! and, once the bound is exceeded, the oldest entry is dropped from the
//! front. Nothing is summarised on the way out.
//!
//! ```text
//! conversations: [t1 t2 … t10] + t11  →  [t2 … t11]
//! events:        [e1 e2 … e20] + e21  →  [e2 … e21]
//! ```

use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ParleyError, Result};
use crate::types::{
    self, DEFAULT_DISPOSITION, MAX_CONVERSATION_HISTORY, MAX_EVENT_HISTORY, NO_FACTION, NpcSeed,
    Timestamp, UNKNOWN,
};

// ---------------------------------------------------------------------------
// History entries
// ---------------------------------------------------------------------------

/// One exchange between the player and the NPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// When the exchange happened.
    #[serde(default)]
    pub timestamp: Timestamp,
    /// What the player said.
    #[serde(rename = "player", alias = "player_text", default)]
    pub player_text: String,
    /// What the NPC answered (already stripped of action markup).
    #[serde(rename = "npc", alias = "npc_text", default)]
    pub npc_text: String,
}

/// A world event the NPC was told about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    /// When the event was recorded.
    #[serde(default)]
    pub timestamp: Timestamp,
    /// Symbolic event kind, e.g. `"combat"`.
    #[serde(rename = "type", alias = "event_type", default)]
    pub event_type: String,
    /// Free-form description as sent by the client.
    #[serde(default)]
    pub description: Value,
}

// ---------------------------------------------------------------------------
// NpcContext
// ---------------------------------------------------------------------------

fn default_unknown() -> String {
    UNKNOWN.to_string()
}

fn default_faction() -> String {
    NO_FACTION.to_string()
}

fn default_disposition() -> i32 {
    DEFAULT_DISPOSITION
}

/// The full session state for one NPC.
///
/// The serialized form is the on-disk record format for both the memory and
/// the profile tiers. Every key is optional when reading so hand-written
/// profiles only need the fields they care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcContext {
    /// Stable key; never changes after creation.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Race.
    #[serde(default = "default_unknown")]
    pub race: String,
    /// Gender.
    #[serde(default = "default_unknown")]
    pub gender: String,
    /// Class.
    #[serde(rename = "class", default = "default_unknown")]
    pub class: String,
    /// Faction.
    #[serde(default = "default_faction")]
    pub faction: String,
    /// Personality notes for prompt composition.
    #[serde(default)]
    pub personality: String,
    /// Backstory for prompt composition.
    #[serde(default)]
    pub background: String,
    /// Goals for prompt composition.
    #[serde(default)]
    pub goals: String,
    /// Most recent exchanges, oldest first.
    #[serde(rename = "conversations", alias = "conversation_history", default)]
    pub conversation_history: VecDeque<ConversationEntry>,
    /// Most recent events, oldest first.
    #[serde(rename = "events", alias = "event_history", default)]
    pub event_history: VecDeque<EventEntry>,
    /// Attitude towards the player; 50 is neutral.
    #[serde(default = "default_disposition")]
    pub disposition: i32,
    /// Timestamp of the last conversation or event.
    #[serde(default = "types::now")]
    pub last_interaction: Timestamp,
}

impl NpcContext {
    /// Minimal context: `id` and `name` both set to `id`, everything else default.
    #[must_use]
    pub fn skeleton(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            ..Self::blank(id)
        }
    }

    /// Context built from caller-supplied seed data.
    ///
    /// A seed without a name yields an empty name, not the id.
    #[must_use]
    pub fn from_seed(id: impl Into<String>, seed: &NpcSeed) -> Self {
        Self {
            name: seed.name.clone().unwrap_or_default(),
            race: seed.race_or_default().to_string(),
            gender: seed.gender_or_default().to_string(),
            class: seed.class_or_default().to_string(),
            faction: seed.faction_or_default().to_string(),
            ..Self::blank(id)
        }
    }

    fn blank(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            race: default_unknown(),
            gender: default_unknown(),
            class: default_unknown(),
            faction: default_faction(),
            personality: String::new(),
            background: String::new(),
            goals: String::new(),
            conversation_history: VecDeque::new(),
            event_history: VecDeque::new(),
            disposition: DEFAULT_DISPOSITION,
            last_interaction: types::now(),
        }
    }

    /// Record one player/NPC exchange, evicting the oldest beyond the bound.
    pub fn add_conversation(&mut self, player_text: impl Into<String>, npc_text: impl Into<String>) {
        self.add_conversation_at(types::now(), player_text, npc_text);
    }

    /// [`add_conversation`](Self::add_conversation) with an explicit timestamp.
    pub fn add_conversation_at(
        &mut self,
        timestamp: Timestamp,
        player_text: impl Into<String>,
        npc_text: impl Into<String>,
    ) {
        self.conversation_history.push_back(ConversationEntry {
            timestamp,
            player_text: player_text.into(),
            npc_text: npc_text.into(),
        });
        self.last_interaction = timestamp;
        truncate_front(&mut self.conversation_history, MAX_CONVERSATION_HISTORY);
    }

    /// Record one world event, evicting the oldest beyond the bound.
    pub fn add_event(&mut self, event_type: impl Into<String>, description: Value) {
        self.add_event_at(types::now(), event_type, description);
    }

    /// [`add_event`](Self::add_event) with an explicit timestamp.
    pub fn add_event_at(&mut self, timestamp: Timestamp, event_type: impl Into<String>, description: Value) {
        self.event_history.push_back(EventEntry {
            timestamp,
            event_type: event_type.into(),
            description,
        });
        self.last_interaction = timestamp;
        truncate_front(&mut self.event_history, MAX_EVENT_HISTORY);
    }

    /// Restore externally held state into this context.
    ///
    /// Recognised keys: `conversations` (or `conversation_history`), `events`
    /// (or `event_history`), `disposition`, `last_interaction`. Absent keys
    /// are left untouched. All present keys are decoded before anything is
    /// assigned, so a rejected override leaves the context unchanged.
    /// Histories longer than their bound keep only the most recent entries.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::InvalidOverride`] if a present key has the
    /// wrong shape.
    pub fn apply_memory_override(&mut self, overrides: &Map<String, Value>) -> Result<()> {
        let conversations: Option<VecDeque<ConversationEntry>> =
            decode_override(overrides, &["conversations", "conversation_history"])?;
        let events: Option<VecDeque<EventEntry>> =
            decode_override(overrides, &["events", "event_history"])?;
        let disposition: Option<i32> = decode_override(overrides, &["disposition"])?;
        let last_interaction: Option<Timestamp> = decode_override(overrides, &["last_interaction"])?;

        if let Some(mut history) = conversations {
            truncate_front(&mut history, MAX_CONVERSATION_HISTORY);
            self.conversation_history = history;
        }
        if let Some(mut history) = events {
            truncate_front(&mut history, MAX_EVENT_HISTORY);
            self.event_history = history;
        }
        if let Some(disposition) = disposition {
            self.disposition = disposition;
        }
        if let Some(last_interaction) = last_interaction {
            self.last_interaction = last_interaction;
        }
        Ok(())
    }
}

/// Drop entries from the front until at most `limit` remain.
fn truncate_front<T>(ring: &mut VecDeque<T>, limit: usize) {
    while ring.len() > limit {
        ring.pop_front();
    }
}

/// Decode the first present key among `keys`.
fn decode_override<T: DeserializeOwned>(
    overrides: &Map<String, Value>,
    keys: &[&str],
) -> Result<Option<T>> {
    let Some((key, value)) = keys
        .iter()
        .find_map(|key| overrides.get(*key).map(|value| (*key, value)))
    else {
        return Ok(None);
    };

    serde_json::from_value(value.clone())
        .map(Some)
        .map_err(|e| ParleyError::InvalidOverride {
            field: key.to_string(),
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
