//! Extraction of machine-actionable directives from generated dialogue.
//!
//! Models are prompted to embed actions in their reply. Four encodings are
//! recognised and stripped, in this order:
//!
//! | Format        | Example                                   |
//! |---------------|-------------------------------------------|
//! | Fenced JSON   | ```` ```json {"type":"ATTACK"} ``` ````   |
//! | Bracketed     | `[GIVE_ITEM:item=gold,amount=50]`         |
//! | Asterisk      | `*SMILES: warmly*`                        |
//! | Paired tag    | `<WHISPER>the vault is open</WHISPER>`    |
//!
//! Each pass scans the output of the previous one. A directive that fails to
//! decode is logged and left in the text; it never aborts the extraction.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A parameter value: text, or a flag for bare bracketed segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Textual value.
    Text(String),
    /// Boolean value.
    Flag(bool),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// One structured directive found in generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Uppercase symbolic tag, e.g. `GIVE_ITEM`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Named parameters.
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl Action {
    /// Action with no parameters.
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insertion.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn described(action_type: &str, description: &str) -> Self {
        Self::new(action_type).with_param("description", description.trim())
    }
}

/// Result of [`ActionExtractor::extract`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// The input with every decoded directive removed and whitespace tidied.
    pub text: String,
    /// Decoded directives in discovery order.
    pub actions: Vec<Action>,
}

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid regex"));
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?P<action_type>[A-Z_]+)(?P<params>:[^\]]*?)?\]").expect("valid regex")
});
static ASTERISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([A-Z_]+):\s*([^*]+)\*").expect("valid regex"));
static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([A-Z_]+)>").expect("valid regex"));
static EXTRA_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static EXTRA_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").expect("valid regex"));

/// One directive encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionFormat {
    /// ```` ```json … ``` ```` holding an object or an array of objects.
    FencedJson,
    /// `[TYPE]` or `[TYPE:key=value,flag]`.
    Bracketed,
    /// `*TYPE: free text*`.
    Asterisk,
    /// `<TYPE>free text</TYPE>` on a single line.
    PairedTag,
}

impl ActionFormat {
    /// All formats in extraction order.
    pub const ALL: [Self; 4] = [Self::FencedJson, Self::Bracketed, Self::Asterisk, Self::PairedTag];

    /// Decode every occurrence of this format in `text`.
    ///
    /// Returns the text with decoded occurrences removed and the actions in
    /// order of appearance.
    #[must_use]
    pub fn scan(self, text: &str) -> (String, Vec<Action>) {
        match self {
            Self::FencedJson => scan_regex(&FENCED_JSON, text, fenced_json),
            Self::Bracketed => scan_regex(&BRACKETED, text, bracketed),
            Self::Asterisk => scan_regex(&ASTERISK, text, |caps| {
                Some(vec![Action::described(&caps[1], &caps[2])])
            }),
            Self::PairedTag => scan_paired_tags(text),
        }
    }
}

/// Run `decode` on every match of `re`; successful matches are cut out.
fn scan_regex(
    re: &Regex,
    text: &str,
    decode: impl Fn(&Captures<'_>) -> Option<Vec<Action>>,
) -> (String, Vec<Action>) {
    let mut out = String::with_capacity(text.len());
    let mut actions = Vec::new();
    let mut last = 0;

    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if let Some(found) = decode(&caps) {
            out.push_str(&text[last..whole.start()]);
            last = whole.end();
            actions.extend(found);
        }
    }
    out.push_str(&text[last..]);
    (out, actions)
}

/// Paired tags need the closing name to equal the opening one, which a
/// single regex without backreferences cannot express.
fn scan_paired_tags(text: &str) -> (String, Vec<Action>) {
    let mut out = String::with_capacity(text.len());
    let mut actions = Vec::new();
    let mut last = 0;
    let mut cursor = 0;

    while let Some(caps) = OPEN_TAG.captures_at(text, cursor) {
        let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let closing = format!("</{}>", name.as_str());
        let line_end = text[open.end()..]
            .find('\n')
            .map_or(text.len(), |i| open.end() + i);

        match text[open.end()..line_end].find(&closing) {
            Some(rel) => {
                let body_end = open.end() + rel;
                actions.push(Action::described(name.as_str(), &text[open.end()..body_end]));
                out.push_str(&text[last..open.start()]);
                last = body_end + closing.len();
                cursor = last;
            }
            None => cursor = open.end(),
        }
    }
    out.push_str(&text[last..]);
    (out, actions)
}

fn fenced_json(caps: &Captures<'_>) -> Option<Vec<Action>> {
    let body = &caps[1];
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => Some(items.iter().filter_map(json_action).collect()),
        Ok(value) => Some(json_action(&value).into_iter().collect()),
        Err(e) => {
            warn!(block = %body, error = %e, "Failed to parse JSON action block");
            None
        }
    }
}

/// Map a JSON object with a `type` key onto an [`Action`].
///
/// A number or boolean `type` is used as its JSON text. Parameters come
/// from top-level keys and the `params` object, the latter winning on
/// conflict. `null` values are dropped; numbers, arrays and
/// objects are kept as compact JSON text.
fn json_action(value: &Value) -> Option<Action> {
    let object = value.as_object()?;
    let action_type = match object.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(scalar @ (Value::Number(_) | Value::Bool(_))) => scalar.to_string(),
        _ => {
            debug!(item = %value, "Skipping JSON item without a usable type");
            return None;
        }
    };

    let mut action = Action::new(action_type);
    let nested = object.get("params").and_then(Value::as_object);
    let top_level = object
        .iter()
        .filter(|(key, _)| key.as_str() != "type" && key.as_str() != "params");

    for (key, value) in top_level.chain(nested.into_iter().flatten()) {
        let param = match value {
            Value::Null => continue,
            Value::String(s) => ParamValue::Text(s.clone()),
            Value::Bool(b) => ParamValue::Flag(*b),
            other => ParamValue::Text(other.to_string()),
        };
        action.params.insert(key.clone(), param);
    }
    Some(action)
}

fn bracketed(caps: &Captures<'_>) -> Option<Vec<Action>> {
    let mut action = Action::new(&caps["action_type"]);
    let Some(params) = caps.name("params") else {
        return Some(vec![action]);
    };

    for segment in params.as_str()[1..].split(',') {
        match segment.split_once('=') {
            Some((key, value)) => {
                action.params.insert(key.trim().to_string(), value.trim().into());
            }
            None => {
                action.params.insert(segment.trim().to_string(), true.into());
            }
        }
    }
    Some(vec![action])
}

fn tidy(text: &str) -> String {
    let text = EXTRA_NEWLINES.replace_all(text, "\n\n");
    let text = EXTRA_SPACES.replace_all(&text, " ");
    text.trim().to_string()
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Ordered list of [`ActionFormat`]s applied to generated text.
#[derive(Debug, Clone)]
pub struct ActionExtractor {
    enabled: bool,
    formats: Vec<ActionFormat>,
}

impl Default for ActionExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ActionExtractor {
    /// Extractor using every format. When `enabled` is false,
    /// [`extract`](Self::extract) returns its input untouched.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            formats: ActionFormat::ALL.to_vec(),
        }
    }

    /// Extractor using only `formats`, in the given order.
    #[must_use]
    pub fn with_formats(formats: impl IntoIterator<Item = ActionFormat>) -> Self {
        Self {
            enabled: true,
            formats: formats.into_iter().collect(),
        }
    }

    /// Whether extraction is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Remove every recognised directive from `text` and return the
    /// remaining prose together with the decoded actions.
    #[must_use]
    pub fn extract(&self, text: &str) -> Extraction {
        if !self.enabled {
            return Extraction {
                text: text.to_string(),
                actions: Vec::new(),
            };
        }

        let mut remaining = text.to_string();
        let mut actions = Vec::new();
        for format in &self.formats {
            let (rest, found) = format.scan(&remaining);
            remaining = rest;
            actions.extend(found);
        }

        debug!(actions = actions.len(), "Extracted actions from generated text");
        Extraction {
            text: tidy(&remaining),
            actions,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
