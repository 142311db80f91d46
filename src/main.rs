//! querygate - cost-gated BigQuery queries
//!
//! This is the main entry point for the querygate binary.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

mod audit;
mod auth;
mod bigquery;
mod cli;
mod config;
mod cost;
mod credentials;
mod error;
mod gateway;
mod plugins;
mod provider;
mod rows;
mod service;
#[cfg(test)]
mod testing;

use audit::JsonlAuditLog;
use bigquery::BigQueryConnector;
use cli::{Args, Command, CredentialArgs};
use config::Config;
use gateway::{OutputMessage, QueryGateway};
use plugins::{PluginHost, Toolbox};
use provider::CredentialValidator;
use service::Connector;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.debug, args.log_json);

    info!("Starting querygate v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Query {
            sql,
            max_results,
            credentials,
            json,
        } => run_query(&config, sql.as_deref(), max_results, credentials, json).await,
        Command::Validate { credentials } => run_validate(&config, credentials).await,
        Command::Tools => {
            println!("{}", serde_json::to_string_pretty(&Toolbox::definitions())?);
            Ok(())
        }
        Command::History { limit } => print_history(&config, limit),
        Command::Serve => serve(&config).await,
    }
}

fn connector(config: &Config) -> Result<Arc<dyn Connector>> {
    let connector =
        BigQueryConnector::new(config.service.clone()).context("Failed to create HTTP client")?;
    Ok(Arc::new(connector))
}

fn gateway(config: &Config, connector: Arc<dyn Connector>) -> QueryGateway {
    QueryGateway::new(
        connector,
        Arc::new(JsonlAuditLog::new(config.audit.clone())),
        config.policy.clone(),
    )
}

async fn run_query(
    config: &Config,
    sql: Option<&str>,
    max_results: Option<i64>,
    credentials: CredentialArgs,
    json: bool,
) -> Result<()> {
    let store = credentials.apply(&config.credentials);
    let gateway = gateway(config, connector(config)?);

    for message in gateway.run(sql, max_results, &store).await {
        if json {
            println!("{}", serde_json::to_string(&message)?);
            continue;
        }
        match message {
            OutputMessage::Text { text } => println!("{}", text),
            OutputMessage::Json { payload } => {
                println!("{}", serde_json::to_string_pretty(&payload)?)
            }
        }
    }
    Ok(())
}

async fn run_validate(config: &Config, credentials: CredentialArgs) -> Result<()> {
    let store = credentials.apply(&config.credentials);
    let validator = CredentialValidator::new(connector(config)?);

    if let Err(e) = validator.validate(&store).await {
        bail!(e);
    }
    println!("Credentials are valid");
    Ok(())
}

fn print_history(config: &Config, limit: usize) -> Result<()> {
    let path = &config.audit.log_path;
    if !path.exists() {
        println!("No audit records at {}", path.display());
        return Ok(());
    }

    let records = audit::read_records(path)
        .with_context(|| format!("Failed to read audit log {}", path.display()))?;
    let start = records.len().saturating_sub(limit);
    for record in &records[start..] {
        println!(
            "{} {:<4} {:>14} bytes ~${:.2} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if record.success { "ok" } else { "FAIL" },
            record.bytes_processed,
            record.estimated_cost_usd,
            record.query.replace('\n', " "),
        );
        if let Some(error) = &record.error {
            println!("    {}", error);
        }
    }
    Ok(())
}

async fn serve(config: &Config) -> Result<()> {
    let connector = connector(config)?;
    let toolbox = Toolbox::new(
        gateway(config, Arc::clone(&connector)),
        CredentialValidator::new(connector),
        Arc::new(config.credentials.clone()),
    );

    let host = PluginHost::new(toolbox);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let handled = host.serve(stdin, tokio::io::stdout()).await?;

    info!("querygate served {} requests", handled);
    Ok(())
}

/// Initialize the logging/tracing subsystem
fn init_logging(debug: bool, json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
