//! Command-line argument parsing for querygate

use crate::config::CredentialsConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// querygate - cost-gated BigQuery queries
#[derive(Parser, Debug)]
#[command(name = "querygate")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Emit diagnostic logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a query through the cost gate and print the result
    Query {
        /// SQL to execute
        #[arg(value_name = "SQL")]
        sql: Option<String>,

        /// Maximum rows to return
        #[arg(short = 'n', long, value_name = "N", allow_negative_numbers = true)]
        max_results: Option<i64>,

        #[command(flatten)]
        credentials: CredentialArgs,

        /// Print raw message envelopes, one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Check that the configured credentials can reach the service
    Validate {
        #[command(flatten)]
        credentials: CredentialArgs,
    },

    /// Print tool definitions as JSON
    Tools,

    /// Show recent audit records
    History {
        /// Number of records to show
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Serve the plugin protocol over stdin/stdout
    Serve,
}

/// Per-invocation credential overrides
#[derive(clap::Args, Debug, Default)]
pub struct CredentialArgs {
    /// Project to bill queries to
    #[arg(long, value_name = "ID")]
    pub project: Option<String>,

    /// Service account key file
    #[arg(long, value_name = "PATH")]
    pub key_file: Option<PathBuf>,
}

impl CredentialArgs {
    /// Layer these overrides on top of the configured credentials
    pub fn apply(self, base: &CredentialsConfig) -> CredentialsConfig {
        let mut merged = base.clone();
        if let Some(project) = self.project {
            merged.project_id = Some(project);
        }
        if let Some(key_file) = self.key_file {
            merged.key_file = Some(key_file);
        }
        merged
    }
}
