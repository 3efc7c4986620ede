use crate::{
    config::Config,
    error::Result,
    generation::TextGenerator,
    heuristics::Heuristics,
    prompt::PromptEngine,
    record::AnalysisRecord,
    response::{parse_response, ParsedShape, PartialRecord},
    source::SourceUnit,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How an [`AnalysisRecord`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalysisOrigin {
    /// Model response used as-is
    Model,
    /// Model response parsed, missing fields synthesized
    Repaired,
    /// No usable response; every field synthesized from the body
    Synthesized,
    /// Heuristics failed too; generic record
    Fallback,
}

/// Result of analyzing one function.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// The record to store
    pub record: AnalysisRecord,
    /// Where the record came from
    pub origin: AnalysisOrigin,
}

/// Turns one [`SourceUnit`] into one [`AnalysisRecord`].
pub struct Analyzer {
    prompt: PromptEngine,
    generator: Box<dyn TextGenerator>,
    heuristics: Heuristics,
    record_key: String,
}

impl Analyzer {
    /// Creates an analyzer from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt template or generator cannot be set up.
    pub fn new(config: &Config) -> Result<Self> {
        let prompt = match config.generation.template_path {
            Some(ref path) => PromptEngine::with_template(&config.record_key, path)?,
            None => PromptEngine::new(&config.record_key)?,
        };

        Ok(Self {
            prompt,
            generator: config.generation.kind.create(&config.generation)?,
            heuristics: Heuristics::new(config.heuristics.clone()),
            record_key: config.record_key.clone(),
        })
    }

    /// Creates an analyzer around an existing generator.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in prompt cannot be compiled.
    pub fn with_generator(
        generator: Box<dyn TextGenerator>,
        heuristics: Heuristics,
        record_key: impl Into<String>,
    ) -> Result<Self> {
        let record_key = record_key.into();
        Ok(Self {
            prompt: PromptEngine::new(&record_key)?,
            generator,
            heuristics,
            record_key,
        })
    }

    /// Analyzes `unit`. Never fails: generation and parse problems are
    /// recovered with heuristics, and heuristic failure with a generic record.
    #[must_use]
    pub fn analyze(&self, unit: &SourceUnit) -> Analysis {
        let partial = match self.ask_model(unit) {
            Some(response) => {
                let shape = parse_response(&response, &self.record_key);
                let partial = PartialRecord::from_shape(&shape);
                if let ParsedShape::NestedUnderKey { key, .. } = &shape {
                    debug!("Response is nested under '{}'", key);
                }
                match shape.into_fields() {
                    Ok(fields) => debug!("Response carries {} field(s)", fields.len()),
                    Err(e) => warn!(
                        "{} for {}; creating a structured analysis",
                        e, unit.name
                    ),
                }
                partial
            }
            None => PartialRecord::default(),
        };

        if partial.is_complete() {
            let record = AnalysisRecord::merge(partial, AnalysisRecord::generic(unit));
            return Analysis {
                record,
                origin: AnalysisOrigin::Model,
            };
        }

        let missing = partial.missing_fields();
        let origin_if_ok = if partial.is_empty() {
            AnalysisOrigin::Synthesized
        } else {
            AnalysisOrigin::Repaired
        };

        match self.heuristics.reconstruct(unit) {
            Ok(fill) => {
                debug!("Synthesized {:?} for {}", missing, unit.name);
                Analysis {
                    record: AnalysisRecord::merge(partial, fill),
                    origin: origin_if_ok,
                }
            }
            Err(e) => {
                warn!("Heuristic reconstruction failed: {}", e);
                Analysis {
                    record: AnalysisRecord::merge(partial, AnalysisRecord::generic(unit)),
                    origin: AnalysisOrigin::Fallback,
                }
            }
        }
    }

    fn ask_model(&self, unit: &SourceUnit) -> Option<String> {
        let prompt = match self.prompt.render(unit) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Prompt rendering failed for {}: {}", unit.name, e);
                return None;
            }
        };
        debug!("Prompt: {}", prompt);

        match self.generator.generate(&prompt) {
            Ok(response) => {
                debug!("Response for {}: {}", unit.name, response);
                Some(response)
            }
            Err(e) => {
                info!("Falling back to local analysis for {}: {}", unit.name, e);
                None
            }
        }
    }
}
