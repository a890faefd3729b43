//! Prompt templates and the static world data they draw on.
//!
//! Templates are plain text with `{placeholder}` slots. They are loaded from
//! `*.txt` files in the templates directory, keyed by file stem. Static data
//! (`factions.json`, `locations.json`, `lore.json`, …) is loaded from the
//! static-data directory, keyed the same way.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Template name used for dialogue prompts.
pub const DIALOGUE_TEMPLATE: &str = "dialogue_template";

/// Template name used for the system prompt.
pub const SYSTEM_TEMPLATE: &str = "system_template";

/// Built-in dialogue template, used when no `dialogue_template.txt` exists.
pub const DEFAULT_DIALOGUE_TEMPLATE: &str = r"You are {npc_name}, a {npc_gender} {npc_race} {npc_class} of the {npc_faction} faction.
Faction: {npc_faction_info}
Personality: {npc_personality}
Background: {npc_background}
Goals: {npc_goals}

You are speaking with {player_name}, a {player_gender} {player_race} {player_class} ({player_faction}).
Location: {location}. {location_info}
It is {time_of_day}; the weather is {weather}.

Recent conversation:
{conversation_history}

Recent events:
{events}

Stay in character and answer in a few sentences. To act, add a directive such as
[GIVE_ITEM:item=name,amount=1] or *EMOTE: description* after your reply.

{player_name}: {player_message}
{npc_name}:";

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value. Unknown placeholders are
/// left untouched.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// PromptLibrary
// ---------------------------------------------------------------------------

/// Loaded templates and static data.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: HashMap<String, String>,
    static_data: HashMap<String, Value>,
}

impl PromptLibrary {
    /// Library holding only the built-in dialogue template.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(DIALOGUE_TEMPLATE.to_string(), DEFAULT_DIALOGUE_TEMPLATE.to_string());
        Self {
            templates,
            static_data: HashMap::new(),
        }
    }

    /// Load templates and static data from disk.
    ///
    /// Missing directories and unreadable files are logged and skipped; the
    /// built-in dialogue template fills in when no file overrides it.
    #[must_use]
    pub fn load(templates_dir: &Path, static_dir: &Path) -> Self {
        let mut library = Self::builtin();

        for (name, text) in read_dir_files(templates_dir, "txt") {
            debug!(template = %name, "Loaded prompt template");
            library.templates.insert(name, text);
        }
        for (name, text) in read_dir_files(static_dir, "json") {
            match serde_json::from_str(&text) {
                Ok(value) => {
                    debug!(data = %name, "Loaded static data");
                    library.static_data.insert(name, value);
                }
                Err(e) => error!(data = %name, error = %e, "Invalid static data file"),
            }
        }

        info!(
            templates = library.templates.len(),
            static_data = library.static_data.len(),
            "Prompt library ready"
        );
        library
    }

    /// Add or replace a template.
    pub fn insert_template(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    /// Add or replace a static data set.
    pub fn insert_static(&mut self, name: impl Into<String>, value: Value) {
        self.static_data.insert(name.into(), value);
    }

    /// Template text by name.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    /// Static data set by name.
    #[must_use]
    pub fn static_data(&self, name: &str) -> Option<&Value> {
        self.static_data.get(name)
    }

    /// Description of `faction` from `factions.json`.
    #[must_use]
    pub fn faction_info(&self, faction: &str) -> String {
        self.describe("factions", "faction", faction)
    }

    /// Description of `location` from `locations.json`.
    #[must_use]
    pub fn location_info(&self, location: &str) -> String {
        self.describe("locations", "location", location)
    }

    fn describe(&self, set: &str, kind: &str, name: &str) -> String {
        match self.static_data(set).and_then(|data| data.get(name)) {
            Some(entry) => entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            None => format!("No information available for {kind}: {name}"),
        }
    }

    /// Pretty-printed `lore.json`, or a placeholder sentence.
    #[must_use]
    pub fn lore_text(&self) -> String {
        self.static_data("lore")
            .filter(|lore| !is_empty_value(lore))
            .and_then(|lore| serde_json::to_string_pretty(lore).ok())
            .unwrap_or_else(|| "No lore information available.".to_string())
    }

    /// System prompt from `system_template`, or `fallback` when absent.
    #[must_use]
    pub fn system_prompt(&self, fallback: &str) -> String {
        match self.template(SYSTEM_TEMPLATE) {
            Some(template) => {
                let lore = self.lore_text();
                render_template(template, &[("lore", lore.as_str())])
            }
            None => fallback.to_string(),
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// `(stem, contents)` for every `*.ext` file directly under `dir`.
fn read_dir_files(dir: &Path, ext: &str) -> Vec<(String, String)> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Prompt data directory not readable");
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => files.push((stem.to_string(), text)),
            Err(e) => error!(path = %path.display(), error = %e, "Failed to read prompt data file"),
        }
    }
    files
}
