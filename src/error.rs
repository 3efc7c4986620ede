use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the testlens library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Source file (or any other input) could not be read.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Text-generation backend unreachable or answered with an unexpected shape.
    #[error("Text generation unavailable ({backend}): {message}")]
    Generation {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// Generated text is not valid JSON, even after removing code fences.
    #[error("Response could not be parsed: {message}")]
    Unparseable {
        /// Error message
        message: String,
    },

    /// Document store connection or write failure.
    #[error("Document store '{store}' failed for key '{key}': {message}")]
    Store {
        /// Store name
        store: String,
        /// Document key
        key: String,
        /// Error message
        message: String,
    },

    /// Heuristic reconstruction had nothing to work with.
    #[error("Cannot analyze '{function}': {message}")]
    Heuristic {
        /// Function name
        function: String,
        /// Error message
        message: String,
    },

    /// Prompt template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// Custom prompt template failed validation.
    #[error("Template validation failed for '{path}': {reason}")]
    TemplateValidation {
        /// Template path
        path: String,
        /// Reason why it was rejected
        reason: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// XML/YAML conversion failure.
    #[error("Conversion of '{path}' failed: {message}")]
    Conversion {
        /// Input file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a generation error for the named backend.
    #[must_use]
    pub fn generation(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generation {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates an unparseable-response error.
    #[must_use]
    pub fn unparseable(message: impl Into<String>) -> Self {
        Self::Unparseable {
            message: message.into(),
        }
    }

    /// Creates a store error for a single document.
    #[must_use]
    pub fn store(
        store: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Store {
            store: store.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a heuristic reconstruction error.
    #[must_use]
    pub fn heuristic(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Heuristic {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        Self::Template {
            template: template.into(),
            message: source.to_string(),
        }
    }

    /// Creates a template validation error.
    #[must_use]
    pub fn template_validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TemplateValidation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a conversion error.
    #[must_use]
    pub fn conversion(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Conversion {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if the text-generation backend failed.
    #[must_use]
    pub const fn is_generation(&self) -> bool {
        matches!(self, Self::Generation { .. })
    }

    /// Returns true if this is a document store error.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::Template {
            template: "unknown".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Self::Config {
            message: format!("invalid pattern: {e}"),
        }
    }
}
