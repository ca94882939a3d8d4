//! # tripmap-cli
//!
//! Command-line front end for mapping vendor travel payloads into canonical
//! documents and for checking mapping files.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tripmap_mapping::{
    ActionSpec, CONFIG_SCOPE, EngineConfig, INSTANCE_SCOPE, MappingDsl, Providers, Severity,
    TransformEngine,
};

#[derive(Parser)]
#[command(name = "tripmap")]
#[command(about = "Declarative mapping of vendor travel payloads")]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform one or more JSON payloads with a mapping
    Transform(TransformArgs),

    /// Load a mapping and report its shape and actions
    Check {
        /// Mapping file path (YAML or JSON)
        mapping: PathBuf,
    },
}

#[derive(Args)]
struct TransformArgs {
    /// Input payload files (JSON)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Mapping file path (YAML or JSON)
    #[arg(short, long)]
    mapping: PathBuf,

    /// Output file path; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Attributes served under `$config`
    #[arg(long)]
    config: Option<PathBuf>,

    /// Attributes served under `$self` and other reserved scopes
    #[arg(long)]
    instance: Option<PathBuf>,

    /// Fail on the first action error instead of writing null
    #[arg(long)]
    strict: bool,

    /// Emit unique ids and diagnostics next to each document
    #[arg(long)]
    report: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Transform(args) => transform(args).await,
        Commands::Check { mapping } => check(&mapping),
    }
}

async fn transform(args: TransformArgs) -> Result<()> {
    let spec = MappingDsl::parse_file(&args.mapping)
        .with_context(|| format!("failed to load mapping {}", args.mapping.display()))?;
    info!(
        "Using mapping {} ({} rules)",
        args.mapping.display(),
        spec.rule_count()
    );

    let mut providers = Providers::new();
    if let Some(path) = &args.config {
        providers.insert(CONFIG_SCOPE, load_attributes(path).await?);
    }
    if let Some(path) = &args.instance {
        providers.insert(INSTANCE_SCOPE, load_attributes(path).await?);
    }

    let engine = Arc::new(
        TransformEngine::with_providers(providers)
            .with_config(EngineConfig::new().fail_on_action_error(args.strict)),
    );
    let spec = Arc::new(spec);

    let mut tasks = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let raw = tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("failed to read {}", input.display()))?;
        let source: Value = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", input.display()))?;

        let engine = Arc::clone(&engine);
        let spec = Arc::clone(&spec);
        tasks.push((
            input,
            tokio::task::spawn_blocking(move || engine.run(&source, &spec)),
        ));
    }

    let mut documents = Vec::with_capacity(tasks.len());
    for (input, task) in tasks {
        let outcome = task
            .await
            .context("transform task aborted")?
            .with_context(|| format!("failed to transform {}", input.display()))?;

        let warnings = outcome
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        if warnings > 0 {
            warn!("{}: {} field(s) downgraded to null", input.display(), warnings);
        }
        info!("Transformed {}", input.display());

        documents.push(if args.report {
            serde_json::to_value(&outcome)?
        } else {
            outcome.document
        });
    }

    let output = if documents.len() == 1 {
        documents.remove(0)
    } else {
        Value::Array(documents)
    };
    let rendered = serde_json::to_string_pretty(&output)?;

    match &args.output {
        Some(path) => tokio::fs::write(path, format!("{rendered}\n"))
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }

    Ok(())
}

fn check(mapping: &Path) -> Result<()> {
    let spec = MappingDsl::parse_file(mapping)
        .with_context(|| format!("failed to load mapping {}", mapping.display()))?;

    let actions = spec.actions();
    let mut names: Vec<&str> = actions.iter().map(|action| action.name()).collect();
    names.sort_unstable();
    names.dedup();

    println!("mapping: {}", spec.name.as_deref().unwrap_or("<unnamed>"));
    println!("rules: {}", spec.rule_count());
    println!("depth: {}", spec.max_depth());
    println!("actions: {}", names.join(", "));

    let mut unimplemented: Vec<&str> = actions
        .iter()
        .filter(|action| !matches!(action, ActionSpec::Chain { .. }) && !action.is_implemented())
        .map(|action| action.name())
        .collect();
    unimplemented.sort_unstable();
    unimplemented.dedup();

    if !unimplemented.is_empty() {
        bail!(
            "mapping uses unimplemented actions: {}",
            unimplemented.join(", ")
        );
    }
    Ok(())
}

/// Read provider attributes from a YAML or JSON object file
async fn load_attributes(path: &Path) -> Result<Map<String, Value>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let attributes = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&raw).map_err(anyhow::Error::from)
    } else {
        serde_yaml::from_str(&raw).map_err(anyhow::Error::from)
    };
    attributes.with_context(|| format!("{} is not an attribute mapping", path.display()))
}
