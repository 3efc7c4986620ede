use crate::response::PartialRecord;
use crate::source::SourceUnit;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Four-field summary of one test function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// What the test verifies
    pub description: String,

    /// Ordered steps the test performs
    pub steps: Vec<String>,

    /// Functions the test calls, without repeats
    pub functions_dependencies: Vec<String>,

    /// How the test is used
    pub usage: String,
}

impl AnalysisRecord {
    /// Minimal record built from the function name alone.
    #[must_use]
    pub fn generic(unit: &SourceUnit) -> Self {
        let words = unit.subject_words();
        Self {
            description: format!("This test verifies the behavior of {words}."),
            steps: vec![
                "Set up test prerequisites".to_string(),
                format!("Execute operations related to {words}"),
                "Verify expected results".to_string(),
                "Clean up test resources".to_string(),
            ],
            functions_dependencies: Vec::new(),
            usage: format!("This test ensures that the system correctly handles {words} scenarios."),
        }
    }

    /// Takes every field present in `partial`, the rest from `fill`.
    #[must_use]
    pub fn merge(partial: PartialRecord, fill: Self) -> Self {
        Self {
            description: partial.description.unwrap_or(fill.description),
            steps: partial.steps.unwrap_or(fill.steps),
            functions_dependencies: partial
                .functions_dependencies
                .unwrap_or(fill.functions_dependencies),
            usage: partial.usage.unwrap_or(fill.usage),
        }
    }

    /// Returns true if every prose field and the step list are non-empty.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.description.trim().is_empty()
            && !self.usage.trim().is_empty()
            && !self.steps.is_empty()
            && self.steps.iter().all(|s| !s.trim().is_empty())
    }

    /// Wraps the record as a stored document: `{ "<record_key>": { ... } }`.
    #[must_use]
    pub fn to_document(&self, record_key: &str) -> Value {
        let mut document = Map::new();
        document.insert(
            record_key.to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        Value::Object(document)
    }

    /// Reads a record back out of a stored document.
    #[must_use]
    pub fn from_document(document: &Value, record_key: &str) -> Option<Self> {
        document
            .get(record_key)
            .and_then(|inner| serde_json::from_value(inner.clone()).ok())
    }
}
