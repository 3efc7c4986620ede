//! # testlens
//!
//! Summarises Python test functions with a language model and stores one
//! structured analysis document per test.
//!
//! ## Features
//!
//! - Extraction of `test_`-prefixed functions from a single source file
//! - Ollama-compatible generation with chat and completion endpoints
//! - Repair of loosely formatted model output
//! - Local heuristics when the model is unreachable or unhelpful
//! - Couchbase, directory and in-memory document stores
//! - XML and YAML conversion of prompt files
//!
//! ## Quick Start
//!
//! ```no_run
//! use testlens::{Config, Pipeline, StoreKind};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .source_file("test_file.py")
//!     .model("qwq")
//!     .store_kind(StoreKind::Directory)
//!     .output_dir("./analysis")
//!     .build()?;
//!
//! Pipeline::new(config)?.run()?.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Extractor**: finds test functions and their bodies
//! 2. **Analyzer**: prompts the model and repairs the answer
//! 3. **Heuristics**: fill whatever the model did not deliver
//! 4. **Store**: upserts `{ "test": { ... } }` keyed by function name

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod analyzer;
mod config;
mod error;
mod extractor;
mod generation;
mod pipeline;
mod prompt;
mod record;
mod response;
mod source;
mod store;

pub mod convert;
pub mod heuristics;

pub use analyzer::{Analysis, AnalysisOrigin, Analyzer};
pub use config::{Config, ConfigBuilder, GenerationConfig, StoreConfig};
pub use convert::{Direction, convert_directory, convert_file, xml_to_yaml, yaml_to_xml};
pub use error::{Error, Result};
pub use extractor::Extractor;
pub use generation::{GeneratorKind, OfflineGenerator, OllamaGenerator, TextGenerator};
pub use heuristics::{HeuristicConfig, Heuristics};
pub use pipeline::{Pipeline, PipelineStats};
pub use record::AnalysisRecord;
pub use response::{ParsedShape, PartialRecord, parse_response, strip_fences};
pub use source::{SourceUnit, read_source};
pub use store::{CouchbaseStore, DirectoryStore, DocumentStore, MemoryStore, StoreKind};

/// Runs the analysis pipeline with the given configuration.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The generator or store cannot be created
/// - The source file cannot be read
///
/// # Examples
///
/// ```no_run
/// use testlens::{Config, GeneratorKind, StoreKind, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder()
///     .source_file("test_file.py")
///     .generator(GeneratorKind::Offline)
///     .store_kind(StoreKind::Memory)
///     .build()?;
///
/// let stats = run(config)?;
/// assert_eq!(stats.stored, stats.functions_found - stats.store_failures);
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<PipelineStats> {
    Pipeline::new(config)?.run()
}
