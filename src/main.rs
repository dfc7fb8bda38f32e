//! crabdts CLI - XBRL DTS resolver and linkbase validator

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};

use crabdts::{DtsValidator, Severity, UrlMapping, ValidationConfig, ValidationResult};

/// XBRL DTS resolver and linkbase validator
#[derive(ClapParser)]
#[command(name = "crabdts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover and validate the DTS of an entry document
    Validate {
        /// Entry document
        entry: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Shorthand xpointers only, warnings fail
        #[arg(long)]
        restricted: bool,

        /// Output diagnostics as JSON
        #[arg(short, long)]
        json: bool,

        /// Map a URL prefix onto a local directory (PREFIX=DIR)
        #[arg(short, long = "map")]
        mappings: Vec<UrlMapping>,
    },

    /// Print the effective relationships of a base set
    Relationships {
        /// Entry document
        entry: PathBuf,

        /// Arcrole URI
        #[arg(short, long)]
        arcrole: String,

        /// Restrict to one extended link role
        #[arg(short, long)]
        linkrole: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Map a URL prefix onto a local directory (PREFIX=DIR)
        #[arg(short, long = "map")]
        mappings: Vec<UrlMapping>,
    },

    /// List the documents of the DTS
    Documents {
        /// Entry document
        entry: PathBuf,

        /// Map a URL prefix onto a local directory (PREFIX=DIR)
        #[arg(short, long = "map")]
        mappings: Vec<UrlMapping>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            entry,
            config,
            strict,
            restricted,
            json,
            mappings,
        } => {
            let mut config = match config {
                Some(path) => ValidationConfig::from_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None if restricted => ValidationConfig::restricted(),
                None => ValidationConfig::default(),
            };
            if strict {
                config = config.strict();
            }
            if restricted {
                config.allow_element_pointers = false;
            }
            for mapping in mappings {
                config = config.with_mapping(mapping);
            }

            let result = run(config, &entry)?;
            if json {
                let output = serde_json::json!({
                    "valid": result.is_valid(),
                    "stats": result.stats,
                    "diagnostics": result.diagnostics,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_report(&entry, &result);
            }
            if !result.is_valid() {
                std::process::exit(1);
            }
        }

        Commands::Relationships {
            entry,
            arcrole,
            linkrole,
            json,
            mappings,
        } => {
            let config = mappings
                .into_iter()
                .fold(ValidationConfig::default(), |c, m| c.with_mapping(m));
            let result = run(config, &entry)?;
            let dts = &result.dts;
            let set = dts.relationship_set(&arcrole, linkrole.as_deref());

            if json {
                let rows: Vec<_> = set
                    .relationships()
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "source": dts.describe(r.source),
                            "target": dts.describe(r.target),
                            "linkrole": r.key.linkrole,
                            "order": r.order,
                            "weight": r.weight,
                            "priority": r.priority,
                            "preferredLabel": r.preferred_label,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{} {}", arcrole.bold(), linkrole.as_deref().unwrap_or("(all link roles)"));
                for rel in set.relationships() {
                    let mut line = format!("  {} -> {}", dts.describe(rel.source), dts.describe(rel.target));
                    line.push_str(&format!("  order={}", rel.order));
                    if let Some(weight) = rel.weight {
                        line.push_str(&format!(" weight={}", weight));
                    }
                    println!("{}", line);
                }
                println!("  {} relationships, {} ineffective arcs", set.len(), set.ineffective().len());
            }
        }

        Commands::Documents { entry, mappings } => {
            let config = mappings
                .into_iter()
                .fold(ValidationConfig::default(), |c, m| c.with_mapping(m));
            let result = run(config, &entry)?;
            for doc in result.dts.documents() {
                println!("{:>16}  {}", doc.doc_type.to_string().cyan(), doc.url);
            }
            println!("  Documents: {}", result.dts.len());
        }
    }

    Ok(())
}

fn run(config: ValidationConfig, entry: &Path) -> Result<ValidationResult> {
    DtsValidator::with_config(config)
        .validate_file(entry)
        .with_context(|| format!("Failed to validate {}", entry.display()))
}

fn print_report(entry: &Path, result: &ValidationResult) {
    if result.is_valid() {
        println!("{} {} - DTS is valid", "✓".green().bold(), entry.display());
    } else {
        println!("{} {} - Validation failed", "✗".red().bold(), entry.display());
    }
    println!("  Documents: {}", result.stats.documents);
    println!("  Base sets: {}", result.stats.base_sets);
    println!("  Errors: {}", result.errors().count());
    println!("  Warnings: {}", result.warnings().count());

    for diagnostic in result.diagnostics.iter() {
        let label = match diagnostic.severity {
            Severity::Error => "ERROR:".red(),
            Severity::Warning => "WARNING:".yellow(),
            Severity::Info => "INFO:".normal(),
        };
        println!("  {} {}", label, diagnostic);
    }
    println!("  Time: {}ms", result.stats.duration_ms);
}
