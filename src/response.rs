//! Repair of model responses.
//!
//! A response is reduced to a JSON object through a short chain of attempts
//! (fenced block, whole text, outermost braces) and then classified into a
//! [`ParsedShape`]. Fields are read leniently into a [`PartialRecord`];
//! anything missing is left for the heuristics.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Field names of an analysis record, in output order.
pub(crate) const FIELD_NAMES: [&str; 4] = ["description", "steps", "functions_dependencies", "usage"];

const DEPENDENCY_ALIASES: [&str; 2] = ["functions_dependencies", "dependencies"];

/// How a model response was laid out.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedShape {
    /// Record fields at the top level
    Flat(Map<String, Value>),
    /// Record fields nested one level down under `key`
    NestedUnderKey {
        /// Wrapper key (normally the record key)
        key: String,
        /// The nested object
        fields: Map<String, Value>,
    },
    /// No usable object; carries the reason
    Malformed(String),
}

impl ParsedShape {
    /// Returns the object holding the record fields, if any.
    #[must_use]
    pub fn fields(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Flat(fields) | Self::NestedUnderKey { fields, .. } => Some(fields),
            Self::Malformed(_) => None,
        }
    }

    /// Returns true if nothing could be parsed.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Takes the record fields out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unparseable`] for a malformed response.
    pub fn into_fields(self) -> Result<Map<String, Value>> {
        match self {
            Self::Flat(fields) | Self::NestedUnderKey { fields, .. } => Ok(fields),
            Self::Malformed(reason) => Err(Error::unparseable(reason)),
        }
    }
}

/// Record fields recovered from a response; `None` means absent or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRecord {
    /// What the test verifies
    pub description: Option<String>,
    /// Ordered steps
    pub steps: Option<Vec<String>>,
    /// Called functions, de-duplicated
    pub functions_dependencies: Option<Vec<String>>,
    /// How the test is used
    pub usage: Option<String>,
}

impl PartialRecord {
    /// Reads the record fields out of a parsed shape.
    #[must_use]
    pub fn from_shape(shape: &ParsedShape) -> Self {
        let Some(fields) = shape.fields() else {
            return Self::default();
        };

        let dependencies = DEPENDENCY_ALIASES
            .iter()
            .find_map(|key| fields.get(*key))
            .map(value_list)
            .map(dedupe)
            .filter(|deps| !deps.is_empty());

        Self {
            description: fields.get("description").and_then(value_text),
            steps: fields
                .get("steps")
                .map(value_list)
                .filter(|steps| !steps.is_empty()),
            functions_dependencies: dependencies,
            usage: fields.get("usage").and_then(value_text),
        }
    }

    /// Returns true if every field is present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.description.is_some()
            && self.steps.is_some()
            && self.functions_dependencies.is_some()
            && self.usage.is_some()
    }

    /// Returns true if no field is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.steps.is_none()
            && self.functions_dependencies.is_none()
            && self.usage.is_none()
    }

    /// Names of the fields that still need filling.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let present = [
            self.description.is_some(),
            self.steps.is_some(),
            self.functions_dependencies.is_some(),
            self.usage.is_some(),
        ];
        FIELD_NAMES
            .iter()
            .zip(present)
            .filter(|(_, p)| !p)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Parses a raw model response into a [`ParsedShape`].
#[must_use]
pub fn parse_response(text: &str, record_key: &str) -> ParsedShape {
    let candidates = [Some(strip_fences(text)), outer_braces(text)];

    let mut last_error = String::from("empty response");
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(object)) => return classify(object, record_key),
            Ok(other) => last_error = format!("expected a JSON object, found {}", kind_of(&other)),
            Err(e) => last_error = e.to_string(),
        }
    }

    ParsedShape::Malformed(last_error)
}

/// Returns the contents of the first fenced code block, or the trimmed text.
///
/// A language tag after the opening fence is skipped; an unterminated block
/// runs to the end of the text.
#[must_use]
pub fn strip_fences(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text.trim();
    };

    let after_fence = &text[open + 3..];
    let content_start = match after_fence.find('\n') {
        Some(nl) if after_fence[..nl].trim().chars().all(char::is_alphanumeric) => nl + 1,
        _ => 0,
    };
    let content = &after_fence[content_start..];

    content
        .find("```")
        .map_or(content, |close| &content[..close])
        .trim()
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn classify(object: Map<String, Value>, record_key: &str) -> ParsedShape {
    if let Some(Value::Object(inner)) = object.get(record_key) {
        return ParsedShape::NestedUnderKey {
            key: record_key.to_string(),
            fields: inner.clone(),
        };
    }

    if has_record_field(&object) {
        return ParsedShape::Flat(object);
    }

    if object.len() == 1 {
        if let Some((key, Value::Object(inner))) = object.iter().next() {
            if has_record_field(inner) {
                return ParsedShape::NestedUnderKey {
                    key: key.clone(),
                    fields: inner.clone(),
                };
            }
        }
    }

    ParsedShape::Malformed("no analysis fields in response".to_string())
}

fn has_record_field(object: &Map<String, Value>) -> bool {
    FIELD_NAMES
        .iter()
        .chain(DEPENDENCY_ALIASES.iter())
        .any(|key| object.contains_key(*key))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Reads a value as prose; blank strings count as absent.
fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(map) => {
            let strings: Vec<&str> = map.values().filter_map(Value::as_str).collect();
            match strings.as_slice() {
                [single] => single.trim().to_string(),
                _ => value.to_string(),
            }
        }
    };

    (!text.is_empty()).then_some(text)
}

/// Reads a value as a list of strings; a lone string becomes one item.
fn value_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        other => value_text(other).into_iter().collect(),
    }
}

/// Removes repeated entries, keeping the first occurrence.
pub(crate) fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
