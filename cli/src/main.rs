//! IntelGraph CLI: import threat-intelligence documents into an in-memory
//! knowledge base and report what happened.

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use intelgraph::{
    DocumentParser, GraphKnowledgeBase, ImportConfig, ImportRequest, ImportRun, Importer,
    JsonDocumentParser, StitchReport,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "intelgraph", version, about = "Threat-intelligence import engine")]
struct Cli {
    /// YAML import configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one or more documents into a shared knowledge base
    Import(ImportArgs),
    /// Parse documents without importing them
    Validate {
        files: Vec<PathBuf>,
    },
}

#[derive(clap::Args)]
struct ImportArgs {
    /// Document files (JSON)
    files: Vec<PathBuf>,

    /// Attribute data to this source instead of the declared one
    #[arg(long)]
    source: Option<String>,

    /// Additional source names the knowledge base recognizes
    #[arg(long = "known-source")]
    known_sources: Vec<String>,

    /// Analyst recorded on every source instance
    #[arg(long)]
    analyst: Option<String>,

    /// Acquisition method recorded on every source instance
    #[arg(long)]
    method: Option<String>,

    /// Free-form reference recorded on every source instance
    #[arg(long)]
    reference: Option<String>,

    /// Create an Event for each document
    #[arg(long)]
    event: bool,

    /// Leave relationships unstitched
    #[arg(long)]
    no_stitch: bool,

    /// Write the resulting knowledge base as JSON
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Import(args) => run_import(args, cli.config.as_deref(), &cli.format),
        Commands::Validate { files } => run_validate(files, &cli.format),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ImportConfig> {
    match path {
        Some(path) => ImportConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ImportConfig::default()),
    }
}

fn run_import(args: &ImportArgs, config: Option<&Path>, format: &OutputFormat) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let mut kb = GraphKnowledgeBase::with_sources(
        config.known_sources.iter().chain(args.known_sources.iter()).cloned(),
    );

    let mut request = ImportRequest::from_config(&config);
    if let Some(analyst) = &args.analyst {
        request.analyst = analyst.clone();
    }
    if let Some(method) = &args.method {
        request.method = method.clone();
    }
    if let Some(reference) = &args.reference {
        request = request.with_reference(reference.clone());
    }
    if let Some(source) = &args.source {
        request = request.with_source(source.clone());
    }
    if args.event {
        request = request.with_event(true);
    }

    let mut outcomes = Vec::new();
    {
        let mut importer = Importer::new(&mut kb).with_config(config);
        for path in &args.files {
            let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let mut run = importer
                .import(&data, &request)
                .with_context(|| format!("importing {}", path.display()))?;
            let report = if args.no_stitch { None } else { Some(importer.stitch(&mut run)) };
            outcomes.push((path.clone(), run, report));
        }
    }

    print_outcomes(&outcomes, format)?;

    if let Some(snapshot) = &args.snapshot {
        let json = serde_json::to_string_pretty(&kb.store().snapshot())?;
        std::fs::write(snapshot, json).with_context(|| format!("writing {}", snapshot.display()))?;
        eprintln!("Snapshot written to {}", snapshot.display());
    }
    Ok(())
}

type Outcome = (PathBuf, ImportRun, Option<StitchReport>);

fn print_outcomes(outcomes: &[Outcome], format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let json: Vec<_> = outcomes
                .iter()
                .map(|(path, run, report)| {
                    serde_json::json!({
                        "file": path.display().to_string(),
                        "run": run,
                        "stitch": report,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            for (path, run, report) in outcomes {
                println!("{} ({}, source {})", path.display(), run.package_id, run.attribution.name());

                let mut imported = Table::new();
                imported.set_content_arrangement(ContentArrangement::Dynamic);
                imported.set_header(vec!["Node", "Kind", "Entity"]);
                for entry in run.ledger.iter() {
                    imported.add_row(vec![
                        entry.source_node_id.clone(),
                        entry.kind.to_string(),
                        entry.entity.to_string(),
                    ]);
                }
                println!("{}", imported);
                println!("{} imported", run.ledger.len());

                if !run.failures.is_empty() {
                    let mut failed = Table::new();
                    failed.set_content_arrangement(ContentArrangement::Dynamic);
                    failed.set_header(vec!["Node", "Type", "Reason"]);
                    for record in run.failures.iter() {
                        failed.add_row(vec![
                            record.node_id.clone(),
                            record.node_type.clone(),
                            record.message.clone(),
                        ]);
                    }
                    println!("{}", failed);
                    println!("{} failed", run.failures.len());
                }

                match report {
                    Some(report) => println!(
                        "Stitched {} relationship(s), dropped {}, saved {}\n",
                        report.edges_created(),
                        report.dropped.len(),
                        report.saved
                    ),
                    None => println!("{} deferred relationship(s) left unstitched\n", run.deferred.len()),
                }
            }
        }
    }
    Ok(())
}

fn run_validate(files: &[PathBuf], format: &OutputFormat) -> anyhow::Result<()> {
    let parser = JsonDocumentParser::new();
    let mut rows = Vec::new();
    for path in files {
        let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let row = match parser.parse(&data) {
            Ok(package) => serde_json::json!({
                "file": path.display().to_string(),
                "package": package.id,
                "source": package.declared_source(),
                "nodes": package.node_count(),
                "error": null,
            }),
            Err(e) => serde_json::json!({
                "file": path.display().to_string(),
                "error": e.to_string(),
            }),
        };
        rows.push(row);
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["File", "Package", "Source", "Nodes", "Error"]);
            for row in &rows {
                let cell = |key: &str| match &row[key] {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                table.add_row(vec![cell("file"), cell("package"), cell("source"), cell("nodes"), cell("error")]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}
