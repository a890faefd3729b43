//! Core type definitions shared across the Parley workspace.
//!
//! Everything here is serializable; field names follow the JSON records the
//! game client and the on-disk profiles already use.

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Limits & defaults
// ---------------------------------------------------------------------------

/// Most recent conversation turns retained per NPC.
pub const MAX_CONVERSATION_HISTORY: usize = 10;

/// Most recent world events retained per NPC.
pub const MAX_EVENT_HISTORY: usize = 20;

/// Starting disposition for a newly created NPC context.
pub const DEFAULT_DISPOSITION: i32 = 50;

/// Sentinel used for unknown race / gender / class.
pub const UNKNOWN: &str = "Unknown";

/// Sentinel used for an NPC without a faction.
pub const NO_FACTION: &str = "None";

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Unix timestamp in whole seconds.
pub type Timestamp = i64;

/// Current wall-clock time as a [`Timestamp`].
#[must_use]
pub fn now() -> Timestamp {
    Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

/// Descriptive NPC data supplied by a caller (usually the `npc` object of a
/// dialogue request).
///
/// Every field is optional; absent fields fall back to the context defaults
/// when a new context is built from the seed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcSeed {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Race, e.g. "Dunmer".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    /// Gender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Class, e.g. "Spellsword".
    #[serde(rename = "class", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Faction membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faction: Option<String>,
}

impl NpcSeed {
    /// Seed with only a name set.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Race, or the unknown sentinel.
    #[must_use]
    pub fn race_or_default(&self) -> &str {
        self.race.as_deref().unwrap_or(UNKNOWN)
    }

    /// Gender, or the unknown sentinel.
    #[must_use]
    pub fn gender_or_default(&self) -> &str {
        self.gender.as_deref().unwrap_or(UNKNOWN)
    }

    /// Class, or the unknown sentinel.
    #[must_use]
    pub fn class_or_default(&self) -> &str {
        self.class.as_deref().unwrap_or(UNKNOWN)
    }

    /// Faction, or the no-faction sentinel.
    #[must_use]
    pub fn faction_or_default(&self) -> &str {
        self.faction.as_deref().unwrap_or(NO_FACTION)
    }
}
