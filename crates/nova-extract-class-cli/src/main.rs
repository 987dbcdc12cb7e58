use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nova_extract_class::{
    init_tracing, json_schema, ClassExtractor, DependencyFacts, ExtractClassConfig,
    ExtractClassRequest, GeneratedArtifact,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "nova-extract-class",
    version,
    about = "Extract Class refactoring for Java sources"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a request and generate the new class plus the rewritten original
    Extract(RequestArgs),
    /// Validate (and auto-repair) a request without generating anything
    Plan(RequestArgs),
    /// Print the JSON schema of the config file
    Schema,
}

#[derive(Args)]
struct RequestArgs {
    /// JSON request: `{ newClassName, sourceFilePath, methodSignatures, fieldNames }`
    #[arg(long)]
    request: PathBuf,
    /// JSON dependency facts; computed from the source when omitted
    #[arg(long)]
    facts: Option<PathBuf>,
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read the original class from here instead of the request's `sourceFilePath`
    #[arg(long)]
    source: Option<PathBuf>,
    /// Write both generated files (only when extraction succeeds)
    #[arg(long)]
    write: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Extract(args) => {
            let input = Input::load(&args)?;
            let extractor = ClassExtractor::new(input.config);
            let artifact = extractor
                .extract(&input.request, &input.source, input.facts.as_ref())
                .context("extract class failed")?;
            if args.write {
                write_artifact(&artifact, &input.source_path)?;
            }
            print_json(&artifact)?;
            Ok(if artifact.success { 0 } else { 1 })
        }
        Command::Plan(args) => {
            let input = Input::load(&args)?;
            let extractor = ClassExtractor::new(input.config);
            let plan = extractor
                .plan(&input.request, &input.source, input.facts.as_ref())
                .with_context(|| format!("failed to parse {}", input.source_path.display()))?;
            print_json(&plan)?;
            Ok(if plan.is_approved() { 0 } else { 1 })
        }
        Command::Schema => {
            print_json(&json_schema())?;
            Ok(0)
        }
    }
}

struct Input {
    request: ExtractClassRequest,
    facts: Option<DependencyFacts>,
    config: ExtractClassConfig,
    source_path: PathBuf,
    source: String,
}

impl Input {
    fn load(args: &RequestArgs) -> Result<Self> {
        let config = match &args.config {
            Some(path) => ExtractClassConfig::load_from_path(path)?,
            None => ExtractClassConfig::default(),
        };
        init_tracing(&config.logging);

        let request: ExtractClassRequest = read_json(&args.request)?;
        let facts = args.facts.as_deref().map(read_json).transpose()?;
        let source_path = args
            .source
            .clone()
            .unwrap_or_else(|| request.source_file_path.clone());
        let source = std::fs::read_to_string(&source_path)
            .with_context(|| format!("failed to read {}", source_path.display()))?;

        tracing::debug!(
            target: "nova.extract_class",
            request = %args.request.display(),
            source = %source_path.display(),
            "loaded request"
        );

        Ok(Self {
            request,
            facts,
            config,
            source_path,
            source,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Writes the new class next to the original and overwrites the original. Nothing is
/// written for a failed artifact.
fn write_artifact(artifact: &GeneratedArtifact, original: &Path) -> Result<()> {
    let (Some(new_source), Some(modified), Some(new_path)) = (
        artifact.new_class_source.as_deref(),
        artifact.modified_original_source.as_deref(),
        artifact.new_class_path.as_deref(),
    ) else {
        return Ok(());
    };

    // The artifact path is relative to the request's path; keep it next to the file read.
    let new_path = match (new_path.file_name(), original.parent()) {
        (Some(name), Some(dir)) => dir.join(name),
        _ => new_path.to_path_buf(),
    };
    if new_path.exists() {
        anyhow::bail!("refusing to overwrite existing {}", new_path.display());
    }

    std::fs::write(&new_path, new_source)
        .with_context(|| format!("failed to write {}", new_path.display()))?;
    if let Err(err) = std::fs::write(original, modified) {
        // Both files or neither.
        if let Err(cleanup) = std::fs::remove_file(&new_path) {
            tracing::warn!(
                target: "nova.extract_class",
                path = %new_path.display(),
                error = %cleanup,
                "failed to remove new class after write failure"
            );
        }
        return Err(err).with_context(|| format!("failed to write {}", original.display()));
    }
    tracing::info!(
        target: "nova.extract_class",
        new_class = %new_path.display(),
        original = %original.display(),
        "wrote extracted class"
    );
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
