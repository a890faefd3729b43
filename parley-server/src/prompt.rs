//! Dialogue prompt composition.

use parley_core::{NpcContext, NpcSeed};
use parley_llm::PromptLibrary;
use parley_llm::prompt::{DIALOGUE_TEMPLATE, DEFAULT_DIALOGUE_TEMPLATE};
use parley_llm::render_template;
use serde_json::{Map, Value};

/// Renders the dialogue template for one request.
#[derive(Debug, Clone)]
pub struct DialoguePromptBuilder {
    library: PromptLibrary,
}

impl Default for DialoguePromptBuilder {
    fn default() -> Self {
        Self::new(PromptLibrary::builtin())
    }
}

impl DialoguePromptBuilder {
    /// Builder over a loaded template library.
    #[must_use]
    pub fn new(library: PromptLibrary) -> Self {
        Self { library }
    }

    /// The underlying library.
    #[must_use]
    pub fn library(&self) -> &PromptLibrary {
        &self.library
    }

    /// System prompt, falling back to `fallback` without a system template.
    #[must_use]
    pub fn system_prompt(&self, fallback: &str) -> String {
        self.library.system_prompt(fallback)
    }

    /// Fill the dialogue template.
    ///
    /// NPC descriptors come from the request first and the stored context
    /// second; personality, background, goals and history always come from
    /// the context.
    #[must_use]
    pub fn dialogue_prompt(
        &self,
        npc: &NpcSeed,
        player_message: &str,
        game_state: &Map<String, Value>,
        context: &NpcContext,
    ) -> String {
        let name = npc.name.as_deref().unwrap_or(&context.name);
        let race = npc.race.as_deref().unwrap_or(&context.race);
        let gender = npc.gender.as_deref().unwrap_or(&context.gender);
        let class = npc.class.as_deref().unwrap_or(&context.class);
        let faction = npc.faction.as_deref().unwrap_or(&context.faction);
        let location = state_str(game_state, "location", "Unknown");

        let faction_info = self.library.faction_info(faction);
        let location_info = self.library.location_info(&location);
        let history = format_conversations(context);
        let events = format_events(context);
        let lore = self.library.lore_text();
        let player_name = state_str(game_state, "player_name", "Outlander");
        let player_race = state_str(game_state, "player_race", "Unknown");
        let player_gender = state_str(game_state, "player_gender", "Unknown");
        let player_class = state_str(game_state, "player_class", "Unknown");
        let player_faction = state_str(game_state, "player_faction", "None");
        let time_of_day = state_str(game_state, "time_of_day", "Unknown");
        let weather = state_str(game_state, "weather", "Unknown");

        let template = self
            .library
            .template(DIALOGUE_TEMPLATE)
            .unwrap_or(DEFAULT_DIALOGUE_TEMPLATE);

        render_template(
            template,
            &[
                ("npc_name", name),
                ("npc_race", race),
                ("npc_gender", gender),
                ("npc_class", class),
                ("npc_faction", faction),
                ("npc_faction_info", faction_info.as_str()),
                ("npc_personality", context.personality.as_str()),
                ("npc_background", context.background.as_str()),
                ("npc_goals", context.goals.as_str()),
                ("player_name", player_name.as_str()),
                ("player_race", player_race.as_str()),
                ("player_gender", player_gender.as_str()),
                ("player_class", player_class.as_str()),
                ("player_faction", player_faction.as_str()),
                ("location", location.as_str()),
                ("location_info", location_info.as_str()),
                ("time_of_day", time_of_day.as_str()),
                ("weather", weather.as_str()),
                ("conversation_history", history.as_str()),
                ("events", events.as_str()),
                ("lore", lore.as_str()),
                // Last, so braces typed by the player are never expanded.
                ("player_message", player_message),
            ],
        )
    }
}

/// A game-state entry as text; non-string values are rendered as JSON.
fn state_str(state: &Map<String, Value>, key: &str, default: &str) -> String {
    match state.get(key) {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn format_conversations(context: &NpcContext) -> String {
    if context.conversation_history.is_empty() {
        return "No previous conversations.".to_string();
    }
    context
        .conversation_history
        .iter()
        .map(|turn| format!("Player: {}\nNPC: {}", turn.player_text, turn.npc_text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_events(context: &NpcContext) -> String {
    if context.event_history.is_empty() {
        return "No notable events.".to_string();
    }
    context
        .event_history
        .iter()
        .map(|event| {
            let description = match &event.description {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("Event: {}\nDescription: {description}", event.event_type)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn fresh_npc_prompt_uses_defaults() {
        let builder = DialoguePromptBuilder::default();
        let ctx = NpcContext::skeleton("n1");
        let prompt = builder.dialogue_prompt(&NpcSeed::default(), "Hello there", &Map::new(), &ctx);

        assert!(prompt.contains("You are n1"));
        assert!(prompt.contains("Outlander"));
        assert!(prompt.contains("No previous conversations."));
        assert!(prompt.contains("No notable events."));
        assert!(prompt.ends_with("Outlander: Hello there\nn1:"));
    }

    #[test]
    fn request_fields_override_context() {
        let builder = DialoguePromptBuilder::default();
        let mut ctx = NpcContext::skeleton("n1");
        ctx.personality = "curious".into();
        let seed = NpcSeed {
            name: Some("Ajira".into()),
            race: Some("Khajiit".into()),
            ..NpcSeed::default()
        };
        let prompt = builder.dialogue_prompt(
            &seed,
            "What are you brewing?",
            &state(json!({"location": "Balmora", "player_name": "Nerevar", "time_of_day": 14})),
            &ctx,
        );
        assert!(prompt.contains("You are Ajira"));
        assert!(prompt.contains("Khajiit"));
        assert!(prompt.contains("Personality: curious"));
        assert!(prompt.contains("Location: Balmora"));
        assert!(prompt.contains("It is 14"));
        assert!(prompt.contains("Nerevar: What are you brewing?"));
    }

    #[test]
    fn history_and_events_are_listed() {
        let builder = DialoguePromptBuilder::default();
        let mut ctx = NpcContext::skeleton("n1");
        ctx.add_conversation("Hi", "Hello, friend.");
        ctx.add_event("theft", json!("Someone took the silverware"));
        ctx.add_event("weather", json!({"kind": "ash storm"}));

        let prompt = builder.dialogue_prompt(&NpcSeed::default(), "Again?", &Map::new(), &ctx);
        assert!(prompt.contains("Player: Hi\nNPC: Hello, friend."));
        assert!(prompt.contains("Event: theft\nDescription: Someone took the silverware"));
        assert!(prompt.contains("Description: {\"kind\":\"ash storm\"}"));
    }

    #[test]
    fn custom_template_and_static_data() {
        let mut library = PromptLibrary::builtin();
        library.insert_template(DIALOGUE_TEMPLATE, "{npc_name}|{npc_faction_info}|{location_info}|{player_message}");
        library.insert_static("factions", json!({"Blades": {"description": "Spies of the Emperor"}}));
        let builder = DialoguePromptBuilder::new(library);

        let seed = NpcSeed {
            name: Some("Caius".into()),
            faction: Some("Blades".into()),
            ..NpcSeed::default()
        };
        let prompt = builder.dialogue_prompt(&seed, "{npc_name}", &Map::new(), &NpcContext::skeleton("caius"));
        assert_eq!(
            prompt,
            "Caius|Spies of the Emperor|No information available for location: Unknown|{npc_name}"
        );
    }
}
