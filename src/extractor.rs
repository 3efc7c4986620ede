//! Test-function extraction.
//!
//! Function boundaries come from a pattern match over definition headers,
//! not from a parse. A body runs from its `def` line up to the next line
//! that starts a `def` or `class` at any indentation, so a nested helper
//! function cuts the enclosing body short. Callers must tolerate truncated
//! bodies.

use crate::{
    error::Result,
    source::{read_source, SourceUnit},
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, error, info};

static NEXT_DEFINITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:def|class)[ \t]+").expect("static pattern"));

/// Finds prefixed function definitions in source text.
#[derive(Debug, Clone)]
pub struct Extractor {
    prefix: String,
    header: Regex,
}

impl Extractor {
    /// Creates an extractor for functions whose name starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the header pattern cannot be built.
    pub fn new(prefix: &str) -> Result<Self> {
        let pattern = format!(
            r"(?m)^[ \t]*def[ \t]+({}[A-Za-z0-9_]*)[ \t]*\(",
            regex::escape(prefix)
        );

        Ok(Self {
            prefix: prefix.to_string(),
            header: Regex::new(&pattern)?,
        })
    }

    /// Returns the configured name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Extracts every matching function, in order of first appearance.
    ///
    /// A name defined twice keeps its first position but takes the later body.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<SourceUnit> {
        let mut units: Vec<SourceUnit> = Vec::new();

        for caps in self.header.captures_iter(text) {
            let (Some(header), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };

            let end = NEXT_DEFINITION
                .find_at(text, header.end())
                .map_or(text.len(), |m| m.start());

            let body = text[header.start()..end].trim();
            let unit = SourceUnit::new(name.as_str(), body, &self.prefix);

            debug!("Found function: {} ({} lines)", unit.name, unit.line_count());

            match units.iter_mut().find(|u| u.name == unit.name) {
                Some(existing) => *existing = unit,
                None => units.push(unit),
            }
        }

        info!(
            "Extracted {} test functions: {:?}",
            units.len(),
            units.iter().map(|u| u.name.as_str()).collect::<Vec<_>>()
        );

        units
    }

    /// Reads `path` and extracts its functions.
    ///
    /// An unreadable file is logged and yields no functions.
    #[must_use]
    pub fn extract_file(&self, path: &Path) -> Vec<SourceUnit> {
        match read_source(path) {
            Ok(text) => self.extract(&text),
            Err(e) => {
                error!("Error extracting functions: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn extractor() -> Extractor {
        Extractor::new("test_").unwrap()
    }

    #[test]
    fn test_no_matching_definitions() {
        let text = "def helper():\n    return 1\n\nclass Suite:\n    pass\n";
        assert!(extractor().extract(text).is_empty());
        assert!(extractor().extract("").is_empty());
    }

    #[test]
    fn test_single_function() {
        let text = "def test_add(self):\n    self.setup()\n    result = self.add(1,2)\n    self.assertEqual(result, 3)\n    self.cleanup()";
        let units = extractor().extract(text);

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "test_add");
        assert_eq!(units[0].subject, "add");
        assert_eq!(units[0].body, text);
    }

    #[test]
    fn test_body_stops_before_next_header() {
        let text = "def test_one(self):\n    self.a()\n\ndef test_two(self):\n    self.b()\n";
        let units = extractor().extract(text);

        assert_eq!(units.len(), 2);
        assert!(!units[0].body.contains("def test_two"));
        assert!(units[0].body.ends_with("self.a()"));
        assert!(units[1].body.starts_with("def test_two"));
    }

    #[test]
    fn test_body_stops_before_class() {
        let text = "    def test_one(self):\n        self.a()\nclass Other:\n    pass\n";
        let units = extractor().extract(text);

        assert_eq!(units[0].body, "def test_one(self):\n        self.a()");
    }

    #[test]
    fn test_nested_helper_truncates_body() {
        let text = "def test_outer():\n    x = 1\n    def inner():\n        return x\n    assert inner() == 1\n";
        let units = extractor().extract(text);

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].body, "def test_outer():\n    x = 1");
    }

    #[test]
    fn test_non_matching_functions_end_bodies() {
        let text = "def test_a():\n    pass\ndef helper():\n    pass\n";
        let units = extractor().extract(text);

        assert_eq!(units.len(), 1);
        assert!(!units[0].body.contains("helper"));
    }

    #[test]
    fn test_duplicate_name_takes_last_body() {
        let text = "def test_a():\n    first()\ndef test_b():\n    pass\ndef test_a():\n    second()\n";
        let units = extractor().extract(text);

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "test_a");
        assert!(units[0].body.contains("second"));
    }

    #[test]
    fn test_custom_prefix_is_escaped() {
        let extractor = Extractor::new("check.").unwrap();
        let text = "def check.x():\n    pass\ndef checkAx():\n    pass\n";
        let units = extractor.extract(text);

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "check.x");
    }

    #[test]
    fn test_extract_file_missing_is_empty() {
        let units = extractor().extract_file(Path::new("/nonexistent/test_file.py"));
        assert!(units.is_empty());
    }

    #[test]
    fn test_extract_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("test_file.py");
        file.write_str(include_str!("../fixtures/test_file.py")).unwrap();

        let units = extractor().extract_file(file.path());
        let names: Vec<_> = units.iter().map(|u| u.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "test_rebalance_in_during_index_building",
                "test_rebalance_out_during_index_building",
                "test_eventing_swap_rebalance_when_existing_eventing_node_is_processing_mutations",
            ]
        );
    }
}
