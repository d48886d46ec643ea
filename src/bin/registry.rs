//! Content Registry CLI
//!
//! Validates type declarations, inspects them and ingests unit files.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use content_registry::{Catalog, IngestMode, IngestOutcome, RegistryConfig, TypeSnapshot};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "content-registry")]
#[command(about = "Validate content type declarations and ingest content units")]
struct Cli {
    /// Config file (defaults to content-registry.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Declaration file or directory (overrides config)
    #[arg(short, long)]
    types: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the declarations and report the first problem, if any
    Validate,

    /// Print one type definition as JSON
    Show {
        type_id: String,
    },

    /// Search types by id or display name
    Search {
        query: String,
    },

    /// Export the type reference graph in DOT format
    Graph {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ingest a JSON array of units and print per-unit outcomes
    Ingest {
        type_id: String,
        file: PathBuf,
        /// Merge into existing units instead of rejecting duplicates
        #[arg(long)]
        upsert: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = RegistryConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if let Some(types) = cli.types {
        config.types.dir = Some(types);
    }
    let declarations = config.declarations()?;

    match cli.command {
        Commands::Validate => {
            let count = declarations.len();
            let snapshot = TypeSnapshot::build(declarations)?;
            println!("✅ {} types valid (fingerprint {})", count, snapshot.fingerprint().short());
            for group in snapshot.mutual_reference_groups() {
                println!("  ↔ mutual references: {}", group.join(", "));
            }
            Ok(())
        }

        Commands::Show { type_id } => {
            let snapshot = TypeSnapshot::build(declarations)?;
            let def = snapshot.get(&type_id)?;
            println!("{}", serde_json::to_string_pretty(def.as_ref())?);
            let referrers = snapshot.referencing_types(&type_id);
            if !referrers.is_empty() {
                println!("Referenced by: {}", referrers.join(", "));
            }
            Ok(())
        }

        Commands::Search { query } => {
            let snapshot = TypeSnapshot::build(declarations)?;
            let results = snapshot.search(&query);
            if results.is_empty() {
                println!("No types match '{}'", query);
            }
            for (type_id, score) in results {
                println!("  {:<20} {}", type_id, score);
            }
            Ok(())
        }

        Commands::Graph { output } => {
            let dot = TypeSnapshot::build(declarations)?.to_dot();
            match output {
                Some(path) => {
                    std::fs::write(&path, &dot)?;
                    println!("✅ Exported DOT to: {:?}", path);
                }
                None => print!("{}", dot),
            }
            Ok(())
        }

        Commands::Ingest { type_id, file, upsert } => {
            let mode = if upsert { IngestMode::Upsert } else { config.ingest.mode };
            let catalog = Catalog::new(declarations)?;

            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let units = match serde_json::from_str::<serde_json::Value>(&content)? {
                serde_json::Value::Array(units) => units,
                _ => bail!("{} must contain a JSON array of units", file.display()),
            };

            let report = catalog.ingest_batch(&type_id, units, mode);
            for (i, outcome) in report.outcomes.iter().enumerate() {
                match outcome {
                    Ok(IngestOutcome::Accepted { identity }) => println!("  ✅ [{}] accepted {}", i, identity),
                    Ok(IngestOutcome::Updated { identity, .. }) => println!("  🔄 [{}] updated {}", i, identity),
                    Ok(IngestOutcome::Unchanged { identity }) => println!("  ➖ [{}] unchanged {}", i, identity),
                    Err(e) => println!("  ❌ [{}] {}", i, e),
                }
            }

            println!();
            println!(
                "{} accepted, {} updated, {} unchanged, {} duplicates, {} failed",
                report.accepted(),
                report.updated(),
                report.unchanged(),
                report.duplicates(),
                report.failed()
            );
            if report.failed() > 0 {
                std::process::exit(2);
            }
            Ok(())
        }
    }
}
