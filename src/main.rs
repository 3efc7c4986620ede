use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use testlens::{
    Config, Direction, Extractor, GeneratorKind, Pipeline, StoreKind, convert_directory,
    convert_file,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "testlens",
    version,
    author,
    about = "Summarise Python test functions with an LLM and store the analysis",
    long_about = "Extract test functions from a Python file, ask an Ollama model to describe \
    each one, and store a structured analysis document per test in Couchbase, a directory \
    or memory. When the model is unreachable the analysis is built from the function body.\n\n\
    USAGE EXAMPLES:\n  \
      # Analyze and store in a local Couchbase\n  \
      testlens analyze tests/test_rebalance.py --password secret\n\n  \
      # Offline run writing JSON files\n  \
      testlens analyze tests/test_rebalance.py --offline --store dir --out-dir ./analysis\n\n  \
      # List the functions that would be analyzed\n  \
      testlens extract tests/test_rebalance.py\n\n  \
      # Convert every XML prompt in a directory to YAML\n  \
      testlens convert ./prompts --direction xml-to-yaml"
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze every test function in a file and store the results
    Analyze(AnalyzeArgs),

    /// List the test functions found in a file
    Extract {
        /// Python source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Function name prefix
        #[arg(long, default_value = "test_")]
        prefix: String,

        /// Print the functions with their bodies as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert XML prompt files to YAML or back
    Convert {
        /// File or directory to convert
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Direction for directories; files are converted by extension
        #[arg(long, value_enum)]
        direction: Option<CliDirection>,
    },
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    /// Python source file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Function name prefix
    #[arg(long, default_value = "test_")]
    prefix: String,

    /// Model name
    #[arg(long, env = "OLLAMA_MODEL", default_value = "qwq")]
    model: String,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Skip the model and build every analysis locally
    #[arg(long)]
    offline: bool,

    /// Where documents are written
    #[arg(long, value_enum, default_value = "couchbase")]
    store: CliStore,

    /// Couchbase REST endpoint
    #[arg(long, env = "COUCHBASE_URL", default_value = "http://localhost:8091")]
    couchbase_url: String,

    /// Couchbase user
    #[arg(long, env = "COUCHBASE_USERNAME", default_value = "Administrator")]
    username: String,

    /// Couchbase password
    #[arg(long, env = "COUCHBASE_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Couchbase bucket
    #[arg(long, env = "COUCHBASE_BUCKET", default_value = "test")]
    bucket: String,

    /// Output directory for the directory store
    #[arg(long, default_value = "out", value_name = "PATH")]
    out_dir: PathBuf,

    /// Key the analysis is nested under in each document
    #[arg(long, default_value = "test")]
    record_key: String,

    /// Path to a custom Tera prompt template
    ///
    /// The template receives `ctx.function_name`, `ctx.function_code`,
    /// `ctx.language` and `ctx.record_key`.
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Maximum number of execute steps in locally built analyses
    #[arg(long, default_value_t = 5)]
    max_execute_steps: usize,

    /// Do not keep backups of replaced documents (directory store)
    #[arg(long)]
    no_backup: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliStore {
    Couchbase,
    Dir,
    Memory,
}

impl From<CliStore> for StoreKind {
    fn from(s: CliStore) -> Self {
        match s {
            CliStore::Couchbase => Self::Couchbase,
            CliStore::Dir => Self::Directory,
            CliStore::Memory => Self::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliDirection {
    XmlToYaml,
    YamlToXml,
}

impl From<CliDirection> for Direction {
    fn from(d: CliDirection) -> Self {
        match d {
            CliDirection::XmlToYaml => Self::XmlToYaml,
            CliDirection::YamlToXml => Self::YamlToXml,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    match cli.command {
        Command::Analyze(args) => analyze(args),
        Command::Extract { file, prefix, json } => extract(&file, &prefix, json),
        Command::Convert { path, direction } => convert(&path, direction.map(Into::into)),
    }
}

fn analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let generator = if args.offline {
        GeneratorKind::Offline
    } else {
        GeneratorKind::Ollama
    };

    let mut builder = Config::builder()
        .source_file(args.file)
        .function_prefix(args.prefix)
        .record_key(args.record_key)
        .generator(generator)
        .ollama_url(args.ollama_url)
        .model(args.model)
        .store_kind(args.store.into())
        .couchbase_url(args.couchbase_url)
        .credentials(args.username, args.password)
        .bucket(args.bucket)
        .output_dir(args.out_dir)
        .backup_existing(!args.no_backup)
        .max_execute_steps(args.max_execute_steps);

    if let Some(template_path) = args.template {
        builder = builder.template_path(template_path);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let stats = Pipeline::new(config)
        .context("Failed to create pipeline")?
        .run()
        .context("Pipeline execution failed")?;

    stats.print_summary();
    Ok(())
}

fn extract(file: &std::path::Path, prefix: &str, json: bool) -> anyhow::Result<()> {
    let extractor = Extractor::new(prefix).context("Invalid function prefix")?;
    let text = testlens::read_source(file).context("Failed to read source file")?;
    let units = extractor.extract(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&units)?);
        return Ok(());
    }

    if units.is_empty() {
        println!("No test functions found in the file.");
        return Ok(());
    }

    println!("Found {} test function(s):", units.len());
    for unit in &units {
        println!("  {:<60} {:>5} lines", unit.name, unit.line_count());
    }
    Ok(())
}

fn convert(path: &std::path::Path, direction: Option<Direction>) -> anyhow::Result<()> {
    if path.is_dir() {
        let direction = direction.unwrap_or(Direction::XmlToYaml);
        let converted = convert_directory(path, direction)
            .with_context(|| format!("Failed to convert {}", path.display()))?;

        let label = match direction {
            Direction::XmlToYaml => "XML files to YAML",
            Direction::YamlToXml => "YAML files to XML",
        };
        println!("Converted {} {}.", converted.len(), label);
        return Ok(());
    }

    if let Some(expected) = direction {
        if Direction::for_path(path) != Some(expected) {
            anyhow::bail!(
                "{} does not match the requested direction {:?}",
                path.display(),
                expected
            );
        }
    }

    let output = convert_file(path).with_context(|| format!("Failed to convert {}", path.display()))?;
    println!("Converted {} to {}", path.display(), output.display());
    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("testlens=info"),
        1 => EnvFilter::new("testlens=debug"),
        _ => EnvFilter::new("testlens=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
