use crate::{
    analyzer::{AnalysisOrigin, Analyzer},
    config::Config,
    error::Result,
    extractor::Extractor,
    record::AnalysisRecord,
    source::read_source,
    store::DocumentStore,
};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Test functions extracted from the source file
    pub functions_found: usize,

    /// Records taken verbatim from the model
    pub from_model: usize,

    /// Records with some fields synthesized
    pub repaired: usize,

    /// Records synthesized entirely from the function body
    pub synthesized: usize,

    /// Generic records
    pub fallback: usize,

    /// Documents written to the store
    pub stored: usize,

    /// Documents the store rejected
    pub store_failures: usize,

    /// Total execution time
    pub duration: Duration,

    /// Time spent reading and extracting
    pub extract_duration: Duration,

    /// Time spent generating and repairing
    pub analyze_duration: Duration,

    /// Time spent writing
    pub store_duration: Duration,

    /// Store the documents went to
    pub store_name: String,
}

impl PipelineStats {
    fn count(&mut self, origin: AnalysisOrigin) {
        match origin {
            AnalysisOrigin::Model => self.from_model += 1,
            AnalysisOrigin::Repaired => self.repaired += 1,
            AnalysisOrigin::Synthesized => self.synthesized += 1,
            AnalysisOrigin::Fallback => self.fallback += 1,
        }
    }

    /// Number of records produced, whatever their origin.
    #[must_use]
    pub const fn analyzed(&self) -> usize {
        self.from_model + self.repaired + self.synthesized + self.fallback
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║            Test Analysis Summary                      ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Functions Found:      {:>8}                        ║",
            self.functions_found
        );
        println!(
            "║   - From model:       {:>8}                        ║",
            self.from_model
        );
        println!(
            "║   - Repaired:         {:>8}                        ║",
            self.repaired
        );
        println!(
            "║   - Synthesized:      {:>8}                        ║",
            self.synthesized
        );
        println!(
            "║   - Generic:          {:>8}                        ║",
            self.fallback
        );
        println!("║                                                       ║");
        println!(
            "║ Documents Stored:     {:>8}  ({:<10})          ║",
            self.stored, self.store_name
        );
        println!(
            "║ Store Failures:       {:>8}                        ║",
            self.store_failures
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Extracting:       {:>8.2}s                     ║",
            self.extract_duration.as_secs_f64()
        );
        println!(
            "║   - Analyzing:        {:>8.2}s                     ║",
            self.analyze_duration.as_secs_f64()
        );
        println!(
            "║   - Storing:          {:>8.2}s                     ║",
            self.store_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Runs extraction, analysis and storage over one source file.
pub struct Pipeline {
    config: Config,
    extractor: Extractor,
    analyzer: Analyzer,
    store: Box<dyn DocumentStore>,
}

impl Pipeline {
    /// Creates a pipeline with the generator and store named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The generator or store cannot be created
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let analyzer = Analyzer::new(&config)?;
        let store = config.store.kind.create(&config.store)?;
        Self::with_parts(config, analyzer, store)
    }

    /// Creates a pipeline around an existing analyzer and store.
    ///
    /// # Errors
    ///
    /// Returns an error if the function prefix cannot form a pattern.
    pub fn with_parts(
        config: Config,
        analyzer: Analyzer,
        store: Box<dyn DocumentStore>,
    ) -> Result<Self> {
        let extractor = Extractor::new(&config.function_prefix)?;
        Ok(Self {
            config,
            extractor,
            analyzer,
            store,
        })
    }

    /// Executes the pipeline and returns statistics.
    ///
    /// # Process
    ///
    /// 1. **Extract**: reads the source file and splits out test functions
    /// 2. **Analyze**: asks the model, repairing or synthesizing as needed
    /// 3. **Store**: upserts one document per function, keyed by name
    ///
    /// Documents are written as soon as each function is analyzed, so a
    /// failure part way through keeps the earlier ones.
    ///
    /// # Errors
    ///
    /// Returns an error only if the source file cannot be read. Store
    /// failures are logged and counted.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use testlens::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .source_file("test_file.py")
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run()?;
    /// stats.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(source = %self.config.source_file.display()))]
    pub fn run(mut self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let mut stats = PipelineStats {
            store_name: self.store.name().to_string(),
            ..PipelineStats::default()
        };

        info!("Stage 1/3: Extracting test functions...");
        let extract_start = Instant::now();
        let text = read_source(&self.config.source_file)?;
        let units = self.extractor.extract(&text);
        stats.extract_duration = extract_start.elapsed();
        stats.functions_found = units.len();

        if units.is_empty() {
            warn!("No test functions found in the file.");
            stats.duration = start_time.elapsed();
            return Ok(stats);
        }

        info!(
            "✓ Found {} test function(s) in {:.2}s",
            units.len(),
            stats.extract_duration.as_secs_f64()
        );

        info!("Stage 2/3 and 3/3: Analyzing and storing...");
        for unit in &units {
            info!("Analyzing function: {}", unit.name);

            let analyze_start = Instant::now();
            let analysis = self.analyzer.analyze(unit);
            stats.analyze_duration += analyze_start.elapsed();
            stats.count(analysis.origin);
            debug!("{} analyzed ({:?})", unit.name, analysis.origin);

            let document = analysis.record.to_document(&self.config.record_key);

            let store_start = Instant::now();
            let written = self.store.upsert(&unit.name, &document);
            stats.store_duration += store_start.elapsed();

            match written {
                Ok(()) => {
                    stats.stored += 1;
                    info!("Successfully stored analysis for {}", unit.name);
                    log_preview(&analysis.record);
                }
                Err(e) => {
                    stats.store_failures += 1;
                    error!("Failed to store analysis for {}: {}", unit.name, e);
                }
            }
        }

        stats.duration = start_time.elapsed();

        info!(
            "✓ Stored {}/{} document(s) in {:.2}s",
            stats.stored,
            stats.functions_found,
            stats.duration.as_secs_f64()
        );

        Ok(stats)
    }
}

fn log_preview(record: &AnalysisRecord) {
    info!("  Description: {}", preview(&record.description, 100));
    info!("  Steps: {} step(s) identified", record.steps.len());
    info!(
        "  Dependencies: {}",
        if record.functions_dependencies.is_empty() {
            "none".to_string()
        } else {
            record.functions_dependencies.join(", ")
        }
    );
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}
