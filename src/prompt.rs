use crate::{
    error::{Error, Result},
    source::SourceUnit,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tera::{Context, Tera, Value};

const BUILTIN_TEMPLATE: &str = "analysis";
const CUSTOM_TEMPLATE: &str = "custom";
const DEFAULT_LANGUAGE: &str = "python";

/// Maximum template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Variables a custom template must reference.
const REQUIRED_VARIABLES: &[&str] = &["function_code"];

/// Variables a custom template usually references.
const OPTIONAL_VARIABLES: &[&str] = &["function_name", "language", "record_key"];

#[derive(Serialize)]
struct PromptContext<'a> {
    function_name: &'a str,
    function_code: &'a str,
    language: &'a str,
    record_key: &'a str,
}

/// Renders the analysis instruction for a single function.
pub(crate) struct PromptEngine {
    tera: Tera,
    template_name: &'static str,
    record_key: String,
}

impl PromptEngine {
    /// Creates an engine using the built-in prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in template fails to compile.
    pub(crate) fn new(record_key: impl Into<String>) -> Result<Self> {
        let mut tera = Tera::default();

        tera.add_raw_template(BUILTIN_TEMPLATE, include_str!("../templates/analysis.tera"))
            .map_err(|e| Error::template(BUILTIN_TEMPLATE, e))?;

        Self::register_filters(&mut tera);

        Ok(Self {
            tera,
            template_name: BUILTIN_TEMPLATE,
            record_key: record_key.into(),
        })
    }

    /// Creates an engine that renders a user-supplied template instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is invalid or cannot be read.
    pub(crate) fn with_template(record_key: impl Into<String>, path: &Path) -> Result<Self> {
        validate_template(path)?;

        let mut engine = Self::new(record_key)?;
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        engine
            .tera
            .add_raw_template(CUSTOM_TEMPLATE, &content)
            .map_err(|e| Error::template(CUSTOM_TEMPLATE, e))?;
        engine.template_name = CUSTOM_TEMPLATE;

        Ok(engine)
    }

    fn register_filters(tera: &mut Tera) {
        tera.register_filter("truncate_lines", Self::truncate_lines_filter);
    }

    /// Truncate lines filter implementation.
    fn truncate_lines_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let max_lines = args
            .get("max")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1000) as usize;

        if let Some(s) = value.as_str() {
            let lines: Vec<&str> = s.lines().collect();
            if lines.len() > max_lines {
                let truncated = lines[..max_lines].join("\n");
                Ok(Value::String(format!(
                    "{}\n... ({} more lines omitted)",
                    truncated,
                    lines.len() - max_lines
                )))
            } else {
                Ok(value.clone())
            }
        } else {
            Ok(value.clone())
        }
    }

    /// Renders the prompt for `unit`.
    ///
    /// # Errors
    ///
    /// Returns an error if template rendering fails.
    pub(crate) fn render(&self, unit: &SourceUnit) -> Result<String> {
        let context = PromptContext {
            function_name: &unit.name,
            function_code: &unit.body,
            language: DEFAULT_LANGUAGE,
            record_key: &self.record_key,
        };

        let mut tera_context = Context::new();
        tera_context.insert("ctx", &context);

        self.tera
            .render(self.template_name, &tera_context)
            .map_err(|e| Error::template(self.template_name, e))
    }
}

/// Validates a custom prompt template file.
///
/// Checks that the file exists, is within the size limit, compiles, and
/// references the function body.
///
/// # Errors
///
/// Returns an error describing the first failed check.
pub(crate) fn validate_template(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "Template file not found"),
        ));
    }

    if !path.is_file() {
        return Err(Error::template_validation(
            path.to_string_lossy(),
            "Path is not a file",
        ));
    }

    let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if metadata.len() > MAX_TEMPLATE_SIZE {
        return Err(Error::template_validation(
            path.to_string_lossy(),
            format!(
                "Template file too large: {} bytes (max: {} bytes)",
                metadata.len(),
                MAX_TEMPLATE_SIZE
            ),
        ));
    }

    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    if content.trim().is_empty() {
        return Err(Error::template_validation(
            path.to_string_lossy(),
            "Template file is empty",
        ));
    }

    let mut scratch = Tera::default();
    PromptEngine::register_filters(&mut scratch);
    scratch.add_raw_template("validation", &content).map_err(|e| {
        Error::template_validation(
            path.to_string_lossy(),
            format!("Template syntax error: {e}"),
        )
    })?;

    let missing: Vec<&str> = REQUIRED_VARIABLES
        .iter()
        .filter(|var| !references(&content, var))
        .copied()
        .collect();

    if !missing.is_empty() {
        return Err(Error::template_validation(
            path.to_string_lossy(),
            format!(
                "Template may be missing required variables: {}. \
                 Prompts should embed ctx.function_code.",
                missing.join(", ")
            ),
        ));
    }

    for var in OPTIONAL_VARIABLES {
        if !references(&content, var) {
            tracing::debug!("Template does not use optional variable: {}", var);
        }
    }

    Ok(())
}

fn references(content: &str, var: &str) -> bool {
    [
        format!("ctx.{var}"),
        format!("{{{{{var} "),
        format!("{{{{ {var}"),
    ]
    .iter()
    .any(|pattern| content.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn unit() -> SourceUnit {
        SourceUnit::new(
            "test_add",
            "def test_add(self):\n    self.assertEqual(self.add(1, 2), 3)",
            "test_",
        )
    }

    #[test]
    fn test_render_builtin() {
        let engine = PromptEngine::new("test").unwrap();
        let prompt = engine.render(&unit()).unwrap();

        assert!(prompt.contains("```python\ndef test_add(self):"));
        assert!(prompt.contains("\"functions_dependencies\""));
        assert!(prompt.contains("Do not wrap the JSON in a \"test\" object"));
        assert!(prompt.contains("Python test analyzer"));
    }

    #[test]
    fn test_render_does_not_escape_code() {
        let engine = PromptEngine::new("test").unwrap();
        let unit = SourceUnit::new("test_lt", "def test_lt():\n    assert a < b & c", "test_");
        let prompt = engine.render(&unit).unwrap();

        assert!(prompt.contains("assert a < b & c"));
    }

    #[test]
    fn test_render_custom_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("prompt.tera");
        template
            .write_str("Summarise {{ ctx.function_name }}:\n{{ ctx.function_code }}")
            .unwrap();

        let engine = PromptEngine::with_template("test", template.path()).unwrap();
        let prompt = engine.render(&unit()).unwrap();

        assert!(prompt.starts_with("Summarise test_add:"));
    }

    #[test]
    fn test_truncate_lines_filter() {
        let content = (0..100).map(|i| format!("Line {i}")).collect::<Vec<_>>().join("\n");
        let mut args = HashMap::new();
        args.insert("max".to_string(), Value::Number(10.into()));

        let result = PromptEngine::truncate_lines_filter(&Value::String(content), &args).unwrap();
        assert!(result.as_str().unwrap().contains("90 more lines omitted"));
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let err = validate_template(Path::new("/nonexistent/prompt.tera")).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_validate_empty_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("empty.tera");
        template.write_str("   \n  ").unwrap();

        let err = validate_template(template.path()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_validate_syntax_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("invalid.tera");
        template.write_str("{% if ctx.function_code %}\nUnclosed if").unwrap();

        let err = validate_template(template.path()).unwrap_err();
        assert!(err.to_string().contains("Template syntax error"));
    }

    #[test]
    fn test_validate_missing_function_code() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("incomplete.tera");
        template.write_str("Describe {{ ctx.function_name }}").unwrap();

        let err = validate_template(template.path()).unwrap_err();
        assert!(err.to_string().contains("missing required variables"));
    }

    #[test]
    fn test_validate_file_too_large() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("large.tera");
        template
            .write_str(&"x".repeat((MAX_TEMPLATE_SIZE + 1) as usize))
            .unwrap();

        let err = validate_template(template.path()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
