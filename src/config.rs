use crate::error::{Error, Result};
use crate::generation::GeneratorKind;
use crate::heuristics::HeuristicConfig;
use crate::store::StoreKind;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_FUNCTION_PREFIX: &str = "test_";
const DEFAULT_RECORD_KEY: &str = "test";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "qwq";
const DEFAULT_COUCHBASE_URL: &str = "http://localhost:8091";
const DEFAULT_BUCKET: &str = "test";
const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for the text-generation backend.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Backend implementation
    pub kind: GeneratorKind,

    /// Base URL of the Ollama-compatible API
    pub endpoint: String,

    /// Model name passed with every request
    pub model: String,

    /// Request timeout
    pub timeout: Duration,

    /// Optional Tera template replacing the built-in prompt
    pub template_path: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::Ollama,
            endpoint: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_GENERATION_TIMEOUT,
            template_path: None,
        }
    }
}

/// Settings for the document store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store implementation
    pub kind: StoreKind,

    /// Couchbase REST endpoint (scheme, host and management port)
    pub endpoint: String,

    /// Couchbase user
    pub username: String,

    /// Couchbase password
    pub password: String,

    /// Bucket the documents are written to
    pub bucket: String,

    /// Directory used by [`StoreKind::Directory`]
    pub output_dir: PathBuf,

    /// Keep a timestamped copy of a document before replacing it
    pub backup_existing: bool,

    /// Request timeout for network stores
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Couchbase,
            endpoint: DEFAULT_COUCHBASE_URL.to_string(),
            username: "Administrator".to_string(),
            password: String::new(),
            bucket: DEFAULT_BUCKET.to_string(),
            output_dir: PathBuf::from("out"),
            backup_existing: true,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Configuration for the analysis pipeline.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Source file scanned for test functions
    pub source_file: PathBuf,

    /// Name prefix a function must carry to be extracted
    pub function_prefix: String,

    /// Key the analysis record is nested under in stored documents
    pub record_key: String,

    /// Text-generation settings
    pub generation: GenerationConfig,

    /// Document store settings
    pub store: StoreConfig,

    /// Local fallback heuristics
    pub heuristics: HeuristicConfig,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use testlens::{Config, GeneratorKind, StoreKind};
    ///
    /// let config = Config::builder()
    ///     .source_file("test_file.py")
    ///     .generator(GeneratorKind::Offline)
    ///     .store_kind(StoreKind::Memory)
    ///     .build()
    ///     .expect("valid configuration");
    /// assert_eq!(config.function_prefix, "test_");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// The source file itself is not checked here; a missing source is
    /// reported when the pipeline runs.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The function prefix or record key is empty
    /// - A network backend has no endpoint
    /// - The custom template is missing or invalid
    pub fn validate(&self) -> Result<()> {
        if self.function_prefix.trim().is_empty() {
            return Err(Error::config("function_prefix must not be empty"));
        }

        if self.record_key.trim().is_empty() {
            return Err(Error::config("record_key must not be empty"));
        }

        if matches!(self.generation.kind, GeneratorKind::Ollama) {
            if self.generation.endpoint.trim().is_empty() {
                return Err(Error::config("generation endpoint must not be empty"));
            }
            if self.generation.model.trim().is_empty() {
                return Err(Error::config("generation model must not be empty"));
            }
        }

        match self.store.kind {
            StoreKind::Couchbase => {
                if self.store.endpoint.trim().is_empty() {
                    return Err(Error::config("store endpoint must not be empty"));
                }
                if self.store.bucket.trim().is_empty() {
                    return Err(Error::config("store bucket must not be empty"));
                }
                if self.store.password.is_empty() {
                    tracing::warn!(
                        "No Couchbase password configured for user '{}'",
                        self.store.username
                    );
                }
            }
            StoreKind::Directory => {
                if self.store.output_dir.as_os_str().is_empty() {
                    return Err(Error::config("store output_dir must not be empty"));
                }
            }
            StoreKind::Memory => {}
        }

        if self.heuristics.max_execute_steps == 0 {
            tracing::warn!("max_execute_steps is 0; synthesized steps will not list calls");
        }

        if let Some(ref template_path) = self.generation.template_path {
            crate::prompt::validate_template(template_path)?;
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_file: PathBuf::from("test_file.py"),
            function_prefix: DEFAULT_FUNCTION_PREFIX.to_string(),
            record_key: DEFAULT_RECORD_KEY.to_string(),
            generation: GenerationConfig::default(),
            store: StoreConfig::default(),
            heuristics: HeuristicConfig::default(),
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    source_file: Option<PathBuf>,
    function_prefix: Option<String>,
    record_key: Option<String>,
    generator: Option<GeneratorKind>,
    ollama_url: Option<String>,
    model: Option<String>,
    generation_timeout: Option<Duration>,
    template_path: Option<PathBuf>,
    store_kind: Option<StoreKind>,
    couchbase_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    bucket: Option<String>,
    output_dir: Option<PathBuf>,
    backup_existing: Option<bool>,
    store_timeout: Option<Duration>,
    heuristics: Option<HeuristicConfig>,
    max_execute_steps: Option<usize>,
}

impl ConfigBuilder {
    /// Sets the source file to scan.
    #[must_use]
    pub fn source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    /// Sets the function name prefix (default `test_`).
    #[must_use]
    pub fn function_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.function_prefix = Some(prefix.into());
        self
    }

    /// Sets the key records are nested under (default `test`).
    #[must_use]
    pub fn record_key(mut self, key: impl Into<String>) -> Self {
        self.record_key = Some(key.into());
        self
    }

    /// Sets the text-generation backend.
    #[must_use]
    pub fn generator(mut self, kind: GeneratorKind) -> Self {
        self.generator = Some(kind);
        self
    }

    /// Sets the Ollama base URL.
    #[must_use]
    pub fn ollama_url(mut self, url: impl Into<String>) -> Self {
        self.ollama_url = Some(url.into());
        self
    }

    /// Sets the model name.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the generation request timeout.
    #[must_use]
    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = Some(timeout);
        self
    }

    /// Sets a custom prompt template file.
    #[must_use]
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Sets the document store backend.
    #[must_use]
    pub fn store_kind(mut self, kind: StoreKind) -> Self {
        self.store_kind = Some(kind);
        self
    }

    /// Sets the Couchbase REST endpoint.
    #[must_use]
    pub fn couchbase_url(mut self, url: impl Into<String>) -> Self {
        self.couchbase_url = Some(url.into());
        self
    }

    /// Sets the store credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the bucket documents are written to.
    #[must_use]
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Sets the output directory used by the directory store.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Enables or disables backups of replaced documents.
    #[must_use]
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.backup_existing = Some(enabled);
        self
    }

    /// Sets the store request timeout.
    #[must_use]
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// Replaces the heuristic configuration.
    #[must_use]
    pub fn heuristics(mut self, config: HeuristicConfig) -> Self {
        self.heuristics = Some(config);
        self
    }

    /// Limits how many execute steps the heuristics synthesize.
    #[must_use]
    pub fn max_execute_steps(mut self, steps: usize) -> Self {
        self.max_execute_steps = Some(steps);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();

        let generation = GenerationConfig {
            kind: self.generator.unwrap_or(defaults.generation.kind),
            endpoint: self.ollama_url.unwrap_or(defaults.generation.endpoint),
            model: self.model.unwrap_or(defaults.generation.model),
            timeout: self.generation_timeout.unwrap_or(defaults.generation.timeout),
            template_path: self.template_path,
        };

        let store = StoreConfig {
            kind: self.store_kind.unwrap_or(defaults.store.kind),
            endpoint: self.couchbase_url.unwrap_or(defaults.store.endpoint),
            username: self.username.unwrap_or(defaults.store.username),
            password: self.password.unwrap_or(defaults.store.password),
            bucket: self.bucket.unwrap_or(defaults.store.bucket),
            output_dir: self.output_dir.unwrap_or(defaults.store.output_dir),
            backup_existing: self.backup_existing.unwrap_or(defaults.store.backup_existing),
            timeout: self.store_timeout.unwrap_or(defaults.store.timeout),
        };

        let mut heuristics = self.heuristics.unwrap_or(defaults.heuristics);
        if let Some(steps) = self.max_execute_steps {
            heuristics.max_execute_steps = steps;
        }

        let config = Config {
            source_file: self.source_file.unwrap_or(defaults.source_file),
            function_prefix: self.function_prefix.unwrap_or(defaults.function_prefix),
            record_key: self.record_key.unwrap_or(defaults.record_key),
            generation,
            store,
            heuristics,
        };

        config.validate()?;
        Ok(config)
    }
}
