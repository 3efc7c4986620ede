//! Local reconstruction of analysis fields from a function body.
//!
//! The scanning helpers are pure functions over text so they can be tested
//! without any model or store. [`Heuristics`] combines them into a full
//! [`AnalysisRecord`].

use crate::{
    error::{Error, Result},
    record::AnalysisRecord,
    response::dedupe,
    source::SourceUnit,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b(self)\s*\.\s*)?\b([A-Za-z_][A-Za-z0-9_]*)\(").expect("static pattern")
});

static ASSERT_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:self\.)?(assert[A-Za-z_]*)\s*\(").expect("static pattern"));

static ASSERT_STATEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^assert\s+(.+)$").expect("static pattern"));

static PYTHON_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "and", "as", "assert", "async", "await", "def", "class", "del", "elif", "else", "except",
        "for", "from", "if", "import", "in", "is", "lambda", "not", "or", "raise", "return",
        "while", "with", "yield",
    ]
    .into_iter()
    .collect()
});

const DEFAULT_BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "list", "dict", "set", "tuple", "min", "max", "range",
    "enumerate", "zip", "map", "filter", "sorted", "reversed", "any", "all", "sum", "isinstance",
    "getattr", "setattr", "hasattr", "open", "super", "type",
];

const DEFAULT_SETUP_SYNONYMS: &[&str] =
    &["setup", "setUp", "initialize", "init", "create", "load", "prepare"];

const DEFAULT_CLEANUP_SYNONYMS: &[&str] = &["tearDown", "cleanup", "clean_up", "delete", "remove"];

/// Calls that never become execute steps on their own.
const NON_STEP_CALLS: &[&str] = &["fail", "skipTest"];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// Tuning for heuristic reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeuristicConfig {
    /// Call-name prefixes that mark initialization (case-insensitive)
    pub setup_synonyms: Vec<String>,

    /// Call-name prefixes that mark cleanup (case-insensitive)
    pub cleanup_synonyms: Vec<String>,

    /// Calls never reported as dependencies or steps
    pub builtins: Vec<String>,

    /// Maximum number of execute steps
    pub max_execute_steps: usize,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            setup_synonyms: owned(DEFAULT_SETUP_SYNONYMS),
            cleanup_synonyms: owned(DEFAULT_CLEANUP_SYNONYMS),
            builtins: owned(DEFAULT_BUILTINS),
            max_execute_steps: 5,
        }
    }
}

/// A call site found in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Called identifier
    pub name: String,
    /// Called directly on `self`
    pub on_self: bool,
}

/// One source line split into code and comment.
///
/// String literals stay in `code`; triple-quoted blocks are dropped, so
/// docstrings yield neither calls nor comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ScannedLine {
    code: String,
    comment: Option<String>,
}

fn triple_quote_at(chars: &[char], i: usize, quote: char) -> bool {
    chars.len() >= i + 3 && chars[i..i + 3].iter().all(|&c| c == quote)
}

/// Splits a body into code and comment parts.
///
/// Backslash escapes inside strings are honoured and triple-quoted strings
/// are tracked across lines.
fn scan_lines(body: &str) -> Vec<ScannedLine> {
    let mut in_triple: Option<char> = None;
    let mut lines = Vec::new();

    for line in body.lines() {
        let chars: Vec<char> = line.chars().collect();
        let mut scanned = ScannedLine::default();
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if let Some(q) = in_triple {
                if c == '\\' {
                    i += 2;
                } else if triple_quote_at(&chars, i, q) {
                    in_triple = None;
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }

            if let Some(q) = quote {
                scanned.code.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        scanned.code.push(next);
                    }
                    i += 2;
                    continue;
                }
                if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }

            match c {
                '#' => {
                    let text: String = chars[i + 1..].iter().collect();
                    scanned.comment = Some(text.trim().to_string());
                    break;
                }
                '"' | '\'' if triple_quote_at(&chars, i, c) => {
                    in_triple = Some(c);
                    i += 3;
                    continue;
                }
                '"' | '\'' => {
                    quote = Some(c);
                    scanned.code.push(c);
                }
                _ => scanned.code.push(c),
            }
            i += 1;
        }

        lines.push(scanned);
    }

    lines
}

/// Finds every `identifier(` call, in order, ignoring comments and docstrings.
#[must_use]
pub fn find_calls(body: &str) -> Vec<Call> {
    scan_lines(body)
        .iter()
        .flat_map(|line| {
            CALL.captures_iter(&line.code)
                .filter_map(|caps| {
                    caps.get(2).map(|name| Call {
                        name: name.as_str().to_string(),
                        on_self: caps.get(1).is_some(),
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Returns the assertion expressions of the body, in order.
///
/// Covers `assert expr` statements and `assertX(...)` calls anywhere on a
/// line, including `with self.assertRaises(...)`.
#[must_use]
pub fn assertion_statements(body: &str) -> Vec<String> {
    let mut statements = Vec::new();

    for line in scan_lines(body) {
        let code = line.code.trim();
        if let Some(caps) = ASSERT_STATEMENT.captures(code) {
            if let Some(m) = caps.get(1) {
                statements.push(leading_expression(m.as_str()).to_string());
                continue;
            }
        }

        for caps in ASSERT_CALL.captures_iter(code) {
            let (Some(call), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let args = call_arguments(&code[call.end()..]);
            statements.push(format!("{}({})", name.as_str(), args));
        }
    }

    statements.retain(|s| !s.is_empty());
    statements
}

/// Counts assertion-like calls (`assertX(`, `self.assertX(`, `assert(`).
#[must_use]
pub fn assertion_call_count(body: &str) -> usize {
    scan_lines(body)
        .iter()
        .map(|line| ASSERT_CALL.find_iter(&line.code).count())
        .sum()
}

/// Returns the text of every non-empty `#` comment, in order.
#[must_use]
pub fn comments(body: &str) -> Vec<String> {
    scan_lines(body)
        .into_iter()
        .filter_map(|line| line.comment)
        .filter(|text| !text.is_empty())
        .collect()
}

/// Walks `text` outside brackets and quotes, stopping where `stop` says so.
///
/// Returns the byte index of the stopping character, if any.
fn top_level_position(text: &str, stop: impl Fn(char, usize) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if stop(c, depth) {
            return Some(i);
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Cuts an expression at its first `,` or `;` outside brackets and quotes.
fn leading_expression(expr: &str) -> &str {
    top_level_position(expr, |c, depth| depth == 0 && matches!(c, ',' | ';'))
        .map_or(expr, |i| &expr[..i])
        .trim()
}

/// Arguments of a call whose opening parenthesis has been consumed.
///
/// A call continuing on the next line is cut at the end of this one.
fn call_arguments(rest: &str) -> &str {
    top_level_position(rest, |c, depth| depth == 0 && c == ')')
        .map_or(rest, |i| &rest[..i])
        .trim()
        .trim_end_matches(',')
        .trim()
}

fn is_assertion(name: &str) -> bool {
    name.to_ascii_lowercase().starts_with("assert")
}

fn words(name: &str) -> String {
    name.replace('_', " ")
}

fn matches_any(name: &str, synonyms: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    synonyms
        .iter()
        .any(|s| !s.is_empty() && lower.starts_with(&s.to_ascii_lowercase()))
}

/// Builds analysis fields from a function body.
#[derive(Debug, Clone, Default)]
pub struct Heuristics {
    config: HeuristicConfig,
}

impl Heuristics {
    /// Creates heuristics with the given tuning.
    #[must_use]
    pub const fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    fn is_builtin(&self, name: &str) -> bool {
        self.config.builtins.iter().any(|b| b == name)
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.is_builtin(name) || name.starts_with("__") || PYTHON_KEYWORDS.contains(name)
    }

    /// Functions the body calls, minus built-ins, dunders, keywords and the
    /// function's own name and subject.
    #[must_use]
    pub fn dependencies(&self, body: &str, name: &str, subject: &str) -> Vec<String> {
        let calls = find_calls(body)
            .into_iter()
            .map(|c| c.name)
            .filter(|c| !self.is_ignored(c) && c != name && c != subject)
            .collect();
        dedupe(calls)
    }

    /// Sentence describing what the test verifies.
    #[must_use]
    pub fn description(&self, unit: &SourceUnit) -> String {
        let purpose = unit.subject_words();
        let asserts = assertion_statements(&unit.body);

        if asserts.is_empty() {
            format!("This test verifies the behavior of {purpose}.")
        } else {
            let listed = asserts.iter().take(2).cloned().collect::<Vec<_>>().join(", ");
            format!("This test verifies {purpose} by asserting {listed}.")
        }
    }

    /// Ordered steps: initialization, execution, verification, cleanup.
    #[must_use]
    pub fn steps(&self, unit: &SourceUnit) -> Vec<String> {
        let calls = find_calls(&unit.body);
        let on_self: Vec<&Call> = calls.iter().filter(|c| c.on_self).collect();
        let candidates: Vec<&str> = if on_self.is_empty() {
            calls.iter().map(|c| c.name.as_str()).collect()
        } else {
            on_self.iter().map(|c| c.name.as_str()).collect()
        };
        let candidates: Vec<String> = dedupe(
            candidates
                .into_iter()
                .filter(|c| !self.is_ignored(c) && *c != unit.name)
                .map(ToString::to_string)
                .collect(),
        );

        let setup: Vec<&str> = candidates
            .iter()
            .filter(|c| matches_any(c, &self.config.setup_synonyms))
            .map(String::as_str)
            .collect();
        let cleanup: Vec<&str> = candidates
            .iter()
            .filter(|c| !setup.contains(&c.as_str()))
            .filter(|c| matches_any(c, &self.config.cleanup_synonyms))
            .map(String::as_str)
            .collect();
        let execute = candidates
            .iter()
            .filter(|c| !setup.contains(&c.as_str()) && !cleanup.contains(&c.as_str()))
            .filter(|c| !is_assertion(c) && !NON_STEP_CALLS.contains(&c.as_str()))
            .take(self.config.max_execute_steps);

        let mut steps = Vec::new();

        if setup.is_empty() {
            steps.push("Set up test prerequisites and environment.".to_string());
        } else {
            steps.push(format!("Initialize test by calling {}.", setup.join(", ")));
        }

        steps.extend(execute.map(|c| format!("Execute {}.", words(c))));

        match assertion_call_count(&unit.body) {
            0 => {}
            1 => steps.push("Verify results using 1 assertion.".to_string()),
            n => steps.push(format!("Verify results using {n} assertions.")),
        }

        if !cleanup.is_empty() {
            steps.push(format!("Clean up resources by calling {}.", cleanup.join(", ")));
        }

        steps
    }

    /// Sentence describing how the test is used.
    #[must_use]
    pub fn usage(&self, unit: &SourceUnit) -> String {
        match comments(&unit.body).first() {
            Some(comment) => {
                let comment = comment.trim_end_matches('.').to_lowercase();
                format!("This test is used to {comment}.")
            }
            None => format!(
                "This test ensures correct behavior when {}.",
                unit.subject_words()
            ),
        }
    }

    /// Builds every field from the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Heuristic`] if the body is blank.
    pub fn reconstruct(&self, unit: &SourceUnit) -> Result<AnalysisRecord> {
        if unit.is_blank() {
            return Err(Error::heuristic(&unit.name, "function body is empty"));
        }

        Ok(AnalysisRecord {
            description: self.description(unit),
            steps: self.steps(unit),
            functions_dependencies: self.dependencies(&unit.body, &unit.name, &unit.subject),
            usage: self.usage(unit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ADD: &str = "def test_add(self):\n    self.setup()\n    result = self.add(1,2)\n    self.assertEqual(result, 3)\n    self.cleanup()";

    fn unit(name: &str, body: &str) -> SourceUnit {
        SourceUnit::new(name, body, "test_")
    }

    #[test]
    fn test_find_calls() {
        let calls = find_calls("x = self.add(1)\nprint(helper(x))  # note(y)");

        assert_eq!(
            calls,
            vec![
                Call { name: "add".into(), on_self: true },
                Call { name: "print".into(), on_self: false },
                Call { name: "helper".into(), on_self: false },
            ]
        );
    }

    #[test]
    fn test_find_calls_chained_receiver() {
        let names: Vec<_> = find_calls("self.log.info(x)\nRestConnection(self.master).modify()")
            .into_iter()
            .map(|c| (c.name, c.on_self))
            .collect();

        assert_eq!(
            names,
            vec![
                ("info".to_string(), false),
                ("RestConnection".to_string(), false),
                ("modify".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_builtins_only_has_no_dependencies() {
        let heuristics = Heuristics::default();
        assert!(heuristics.dependencies("print(x)", "test_x", "x").is_empty());
    }

    #[test]
    fn test_dependencies_exclusions() {
        let heuristics = Heuristics::default();
        let body = "def test_add(self):\n    self.add(1)\n    self.__init__()\n    len(x)\n    helper()\n    helper()\n    if(x): pass";
        let deps = heuristics.dependencies(body, "test_add", "add");

        assert_eq!(deps, vec!["helper"]);
    }

    #[test]
    fn test_assertion_statements() {
        let body = "assert a == 1, 'msg'\nself.assertEqual(result, 3)\nself.assertTrue(ok,\n    'x')\n# assert ignored";
        let asserts = assertion_statements(body);

        assert_eq!(
            asserts,
            vec!["a == 1", "assertEqual(result, 3)", "assertTrue(ok)"]
        );
    }

    #[test]
    fn test_assertion_call_count() {
        assert_eq!(assertion_call_count(TEST_ADD), 1);
        assert_eq!(assertion_call_count("assertTrue(a)\nself.assertIn(b, c)\nmy_assert(d)"), 2);
        assert_eq!(assertion_call_count("assert a == b"), 0);
    }

    #[test]
    fn test_comments() {
        let body = "x = '#not a comment'\n# Load data\ny()  #   trailing  \n#\n";
        assert_eq!(comments(body), vec!["Load data", "trailing"]);
    }

    #[test]
    fn test_assert_raises_context_manager() {
        let body = "def test_div(self):\n    with self.assertRaises(ZeroDivisionError):\n        self.divide(1, 0)";
        let heuristics = Heuristics::default();
        let unit = unit("test_div", body);

        assert_eq!(assertion_statements(body), vec!["assertRaises(ZeroDivisionError)"]);
        assert_eq!(
            heuristics.description(&unit),
            "This test verifies div by asserting assertRaises(ZeroDivisionError)."
        );
        assert_eq!(
            heuristics.steps(&unit).last().unwrap(),
            "Verify results using 1 assertion."
        );
    }

    #[test]
    fn test_assertions_listed_whenever_counted() {
        let bodies = [
            TEST_ADD,
            "x = check(self.assertIn(a, b))",
            "assert(x)\nif ok: self.assertTrue(y)",
        ];

        for body in bodies {
            assert_eq!(
                assertion_call_count(body) > 0,
                !assertion_statements(body).is_empty(),
                "{body}"
            );
        }
    }

    #[test]
    fn test_comment_after_escaped_quote() {
        let body = "def test_q(self):\n    x = \"a \\\" b\"  # Check escaping\n    self.q(x)";

        assert_eq!(comments(body), vec!["Check escaping"]);
        assert_eq!(
            Heuristics::default().usage(&unit("test_q", body)),
            "This test is used to check escaping."
        );
    }

    #[test]
    fn test_docstring_is_not_scanned() {
        let body = "def test_q(self):\n    \"\"\"\n    It's the user's data # really\n    Calls fake(x) here.\n    \"\"\"\n    self.q()";

        assert!(comments(body).is_empty());
        assert_eq!(
            find_calls(body),
            vec![
                Call { name: "test_q".into(), on_self: false },
                Call { name: "q".into(), on_self: true },
            ]
        );
        assert_eq!(
            Heuristics::default().usage(&unit("test_q", body)),
            "This test ensures correct behavior when q."
        );
    }

    #[test]
    fn test_single_line_docstring() {
        let body = "def test_q(self):\n    '''Runs q() # twice'''\n    self.q()  # once";
        assert_eq!(comments(body), vec!["once"]);
        assert_eq!(find_calls(body).len(), 2);
    }

    #[test]
    fn test_synthesized_steps_for_test_add() {
        let steps = Heuristics::default().steps(&unit("test_add", TEST_ADD));

        assert_eq!(
            steps,
            vec![
                "Initialize test by calling setup.",
                "Execute add.",
                "Verify results using 1 assertion.",
                "Clean up resources by calling cleanup.",
            ]
        );
    }

    #[test]
    fn test_steps_without_setup() {
        let body = "def test_sum():\n    total = compute_total([1, 2])\n    assert total == 3";
        let steps = Heuristics::default().steps(&unit("test_sum", body));

        assert_eq!(
            steps,
            vec!["Set up test prerequisites and environment.", "Execute compute total."]
        );
    }

    #[test]
    fn test_steps_limit_execute_calls() {
        let body = "def test_many(self):\n    self.a()\n    self.b()\n    self.c()\n    self.d()";
        let heuristics = Heuristics::new(HeuristicConfig {
            max_execute_steps: 2,
            ..HeuristicConfig::default()
        });

        let steps = heuristics.steps(&unit("test_many", body));
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2], "Execute b.");
    }

    #[test]
    fn test_setup_synonym_case_insensitive() {
        let body = "def test_x(self):\n    self.setUp()\n    self.tearDown()";
        let steps = Heuristics::default().steps(&unit("test_x", body));

        assert_eq!(steps[0], "Initialize test by calling setUp.");
        assert_eq!(steps.last().unwrap(), "Clean up resources by calling tearDown.");
    }

    #[test]
    fn test_description_with_assertions() {
        let body = "def test_add(self):\n    assert add(1, 2) == 3\n    assert add(0, 0) == 0\n    assert add(-1, 1) == 0";
        let description = Heuristics::default().description(&unit("test_add", body));

        assert_eq!(
            description,
            "This test verifies add by asserting add(1, 2) == 3, add(0, 0) == 0."
        );
    }

    #[test]
    fn test_description_without_assertions() {
        let body = "def test_rebalance_out(self):\n    self.rebalance()";
        let description = Heuristics::default().description(&unit("test_rebalance_out", body));

        assert_eq!(description, "This test verifies the behavior of rebalance out.");
    }

    #[test]
    fn test_usage_from_comment() {
        let body = "def test_load(self):\n    # Load data into the bucket.\n    self.load()";
        let usage = Heuristics::default().usage(&unit("test_load", body));

        assert_eq!(usage, "This test is used to load data into the bucket.");
    }

    #[test]
    fn test_usage_without_comment() {
        let usage = Heuristics::default().usage(&unit("test_add", TEST_ADD));
        assert_eq!(usage, "This test ensures correct behavior when add.");
    }

    #[test]
    fn test_reconstruct_blank_body_fails() {
        let result = Heuristics::default().reconstruct(&unit("test_empty", "  \n"));
        assert!(matches!(result, Err(Error::Heuristic { .. })));
    }

    #[test]
    fn test_reconstruct_is_valid() {
        let record = Heuristics::default()
            .reconstruct(&unit("test_add", TEST_ADD))
            .unwrap();

        assert!(record.is_valid());
        assert_eq!(record.functions_dependencies, vec!["setup", "assertEqual", "cleanup"]);
    }
}
