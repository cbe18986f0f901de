//! Edgemanage - edge health tracking and dnet membership
//!
//! Records probe results per edge, classifies edge health and rewrites
//! the per-dnet edge lists under the shared reconcile lock.

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EdgeManageConfig;

/// Edge health control plane
#[derive(Parser)]
#[command(name = "edgemanage")]
#[command(author, version, about = "Edge health tracking and dnet membership", long_about = None)]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, short, env = "EDGEMANAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record one probe result for an edge
    Record {
        /// Edge hostname or IP
        edge: String,

        /// Fetch time in seconds, or "timeout"
        value: String,

        /// Sample time in seconds since the epoch (defaults to now)
        #[arg(long)]
        timestamp: Option<f64>,
    },

    /// Classify edge health
    Classify {
        /// Classify the edges listed in this dnet
        #[arg(long)]
        dnet: Option<String>,

        /// Edges to classify
        edges: Vec<String>,
    },

    /// List dnets
    Segments,

    /// Rewrite dnet edge lists from a JSON mapping of dnet to edges
    Apply {
        /// Path to the mapping file
        mapping: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = EdgeManageConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Record {
            edge,
            value,
            timestamp,
        } => commands::record(&config, &edge, &value, timestamp),
        Commands::Classify { dnet, edges } => commands::classify(&config, dnet.as_deref(), edges),
        Commands::Segments => commands::segments(&config),
        Commands::Apply { mapping } => commands::apply(&config, &mapping),
    }
}
