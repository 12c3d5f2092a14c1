//! DIVE operator CLI.
//!
//! ```bash
//! # Explain a decision step by step
//! dive replay --request request.json
//!
//! # Which COI key would wrap a resource?
//! dive select-coi --rel USA,GBR --coi FVEY
//!
//! # Is a KAO's KAS local or foreign?
//! dive kas-locality https://kas.gbr.dive.example/kas
//!
//! # Print the merged configuration
//! dive config
//! ```

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// DIVE - coalition attribute-based access control.
#[derive(Parser)]
#[command(name = "dive")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Instance directory holding dive.toml.
    #[arg(short, long, global = true, default_value = ".")]
    dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the six ABAC checks for a request.
    Replay {
        /// JSON file with {subject, resource, action, context}.
        #[arg(short, long)]
        request: PathBuf,

        /// Print the trace as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show where each subject attribute in a token came from.
    Provenance {
        /// JSON file with decoded token claims.
        #[arg(short, long)]
        claims: PathBuf,
    },

    /// Select the COI key for a resource.
    SelectCoi {
        /// Releasability countries, comma separated.
        #[arg(long, value_delimiter = ',')]
        rel: Vec<String>,

        /// Explicit COI tags, comma separated.
        #[arg(long, value_delimiter = ',')]
        coi: Vec<String>,
    },

    /// Classify a KAS URL as local or external.
    KasLocality {
        url: String,

        /// Local KAS URL (defaults to instance.kas_url).
        #[arg(long)]
        local_kas: Option<String>,
    },

    /// Run a federated search against the configured partners.
    Search {
        /// Classification filter (e.g. SECRET).
        #[arg(long)]
        classification: Option<String>,

        #[arg(long)]
        coi: Option<String>,

        #[arg(long, default_value = "100")]
        limit: usize,

        /// Subject country of affiliation.
        #[arg(long)]
        country: String,

        /// Subject clearance.
        #[arg(long, default_value = "UNCLASSIFIED")]
        clearance: String,

        /// Only query these instances, comma separated.
        #[arg(long, value_delimiter = ',')]
        instances: Vec<String>,

        /// Overall deadline in milliseconds (defaults to federation.deadline_ms).
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Print the merged configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Replay { request, json } => commands::replay::run(&request, json),
        Commands::Provenance { claims } => commands::replay::provenance(&claims),
        Commands::SelectCoi { rel, coi } => {
            commands::coi::select(&rel, &coi);
            Ok(())
        }
        Commands::KasLocality { url, local_kas } => {
            commands::kas::locality(&cli.dir, &url, local_kas.as_deref())
        }
        Commands::Search {
            classification,
            coi,
            limit,
            country,
            clearance,
            instances,
            deadline_ms,
        } => commands::search::run(
            &cli.dir,
            &commands::search::SearchArgs {
                classification,
                coi,
                limit,
                country,
                clearance,
                instances,
                deadline_ms,
            },
        ),
        Commands::Config => commands::config::show(&cli.dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kas_locality() {
        let cli = Cli::try_parse_from([
            "dive",
            "kas-locality",
            "https://kas.gbr.dive.example/kas",
            "--local-kas",
            "https://kas.usa.dive.example",
        ])
        .unwrap();

        match cli.command {
            Commands::KasLocality { url, local_kas } => {
                assert_eq!(url, "https://kas.gbr.dive.example/kas");
                assert_eq!(local_kas.as_deref(), Some("https://kas.usa.dive.example"));
                commands::kas::locality(&cli.dir, &url, local_kas.as_deref()).unwrap();
            }
            _ => panic!("expected kas-locality"),
        }
    }

    #[test]
    fn test_parse_select_coi_lists() {
        let cli = Cli::try_parse_from(["dive", "select-coi", "--rel", "USA,GBR", "--coi", "FVEY"])
            .unwrap();
        match cli.command {
            Commands::SelectCoi { rel, coi } => {
                assert_eq!(rel, vec!["USA", "GBR"]);
                assert_eq!(coi, vec!["FVEY"]);
            }
            _ => panic!("expected select-coi"),
        }
    }
}
