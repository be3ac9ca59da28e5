use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use tracing::warn;

use revgraph_core::config::CONFIG_FILE;
use revgraph_core::{Config, Entity, ExtractOptions, Extraction, Lifecycle, Relation};

#[derive(Parser)]
#[command(name = "revgraph")]
#[command(about = "Extract a deterministic entity graph from a JavaScript/TypeScript repository")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract entities and relations and print them
    Extract {
        /// Path to the project root
        path: PathBuf,
        /// Re-extract only this relative path (repeatable), reusing the cache for everything else
        #[arg(long)]
        only: Vec<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
        /// Do not write the cache or the profile report
        #[arg(long)]
        no_write: bool,
    },
    /// Create a default .ai/extractor.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Summary,
}

/// The graph as printed by `extract --format json`.
#[derive(Serialize)]
struct GraphOutput<'a> {
    entities: &'a [Entity],
    relations: &'a [Relation],
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Extract {
            path,
            only,
            format,
            no_write,
        } => cmd_extract(&path, only, format, no_write),
        Commands::Init { force } => cmd_init(force),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(2);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_extract(path: &Path, only: Vec<String>, format: Format, no_write: bool) -> Result<()> {
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    let mut options = if only.is_empty() {
        ExtractOptions::default()
    } else {
        ExtractOptions::incremental(only)
    };
    options.persist = !no_write;

    let extraction = revgraph_extractors::extract(path, &options)
        .context("failed to initialize extractor passes")?;
    if !extraction.diagnostics.is_empty() {
        warn!(
            count = extraction.diagnostics.len(),
            "extraction finished with diagnostics"
        );
    }

    match format {
        Format::Json => {
            let graph = GraphOutput {
                entities: &extraction.entities,
                relations: &extraction.relations,
            };
            let json = serde_json::to_string_pretty(&graph).context("failed to serialize graph")?;
            println!("{json}");
        }
        Format::Summary => print!("{}", format_summary(&extraction)),
    }
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(CONFIG_FILE);
    if target.exists() && !force {
        bail!("{CONFIG_FILE} already exists. Use --force to overwrite.");
    }
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).context("failed to create .ai directory")?;
    }
    std::fs::write(&target, Config::default_toml())
        .with_context(|| format!("failed to write {CONFIG_FILE}"))?;
    println!("Created {CONFIG_FILE} with default configuration.");
    Ok(())
}

/// One-screen count summary of an extraction.
fn format_summary(extraction: &Extraction) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n{}\n", "revgraph - Entity Extraction".bold()));
    out.push_str(&format!("{}\n\n", "=".repeat(40)));

    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_lifecycle: BTreeMap<String, usize> = BTreeMap::new();
    for entity in &extraction.entities {
        *by_type.entry(entity.kind.to_string()).or_default() += 1;
        *by_lifecycle.entry(entity.lifecycle.to_string()).or_default() += 1;
    }
    let mut by_relation: BTreeMap<&str, usize> = BTreeMap::new();
    for relation in &extraction.relations {
        *by_relation.entry(relation.kind.as_str()).or_default() += 1;
    }

    out.push_str(&format!(
        "{}: {} entities, {} relations\n",
        "Summary".bold(),
        extraction.entities.len(),
        extraction.relations.len(),
    ));
    if !by_type.is_empty() {
        out.push_str("  Entities by type:\n");
        for (kind, count) in &by_type {
            out.push_str(&format!("    {kind}: {count}\n"));
        }
    }
    if !by_relation.is_empty() {
        out.push_str("  Relations by type:\n");
        for (kind, count) in &by_relation {
            out.push_str(&format!("    {kind}: {count}\n"));
        }
    }
    if !by_lifecycle.is_empty() {
        out.push_str("  Lifecycle:\n");
        for (state, count) in &by_lifecycle {
            let line = format!("    {state}: {count}");
            let line = if *state == Lifecycle::Deprecated.to_string() {
                line.yellow().to_string()
            } else if *state == Lifecycle::Unused.to_string() {
                line.red().to_string()
            } else {
                line
            };
            out.push_str(&format!("{line}\n"));
        }
    }

    let profile = &extraction.profile;
    out.push_str(&format!(
        "\n{}: {} files, {} hits, {} misses{}, {}ms\n",
        "Cache".bold(),
        profile.files_scanned,
        profile.cache_hits,
        profile.cache_misses,
        if profile.incremental { " (incremental)" } else { "" },
        profile.elapsed_ms,
    ));

    if extraction.diagnostics.is_empty() {
        out.push_str(&format!("\n{}\n", "No diagnostics.".green().bold()));
    } else {
        out.push_str(&format!(
            "\n{} ({})\n",
            "Diagnostics".yellow().bold(),
            extraction.diagnostics.len()
        ));
        for diagnostic in &extraction.diagnostics {
            out.push_str(&format!(
                "  [{}] {}: {}\n",
                diagnostic.stage, diagnostic.path, diagnostic.message
            ));
        }
    }

    out
}
