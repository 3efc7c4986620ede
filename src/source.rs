use crate::error::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// A named function body extracted from a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceUnit {
    /// Function name, including the naming prefix
    pub name: String,

    /// Name with the naming prefix removed (`test_add` -> `add`)
    pub subject: String,

    /// Raw function text, starting at its `def` header
    pub body: String,
}

impl SourceUnit {
    /// Creates a unit, deriving the subject by stripping `prefix` from `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl Into<String>, prefix: &str) -> Self {
        let name = name.into();
        let subject = name.strip_prefix(prefix).unwrap_or(&name).to_string();
        Self {
            name,
            subject,
            body: body.into(),
        }
    }

    /// Subject with underscores turned into spaces, for generated prose.
    #[must_use]
    pub fn subject_words(&self) -> String {
        self.subject
            .split('_')
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns the number of lines in the body.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.body.lines().count()
    }

    /// Returns true if the body holds nothing but whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Reads a source file wholesale.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file is missing, unreadable or not UTF-8.
pub fn read_source(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    String::from_utf8(bytes).map_err(|_| {
        Error::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "invalid UTF-8; file may be binary or use an unsupported encoding",
            ),
        )
    })
}
