// ABOUTME: Entry point for the phoenix binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs list/append against the alert ledger.

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use phoenix_core::record::{Record, Severity};
use phoenix_store::{AlertLedger, AppendOutcome, LedgerConfig, LedgerError, LedgerErrorKind};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "phoenix=info,phoenix_store=info";

#[derive(Debug, Parser)]
#[command(name = "phoenix", version, about = "Append-only alert ledger on a remote CSV document")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print stored alerts, one JSON object per line.
    List {
        /// Only show alerts whose location contains this text.
        #[arg(long)]
        location: Option<String>,
    },
    /// Record a new alert.
    Append {
        #[arg(long)]
        location: String,
        /// One of low, medium, high, critical.
        #[arg(long)]
        severity: Severity,
        #[arg(long)]
        description: String,
        #[arg(long)]
        contact: Option<String>,
        /// Store the alert even if an equivalent one already exists.
        #[arg(long)]
        allow_duplicate: bool,
    },
}

fn guidance(err: &LedgerError) -> &'static str {
    match err.kind() {
        LedgerErrorKind::NotConfigured => {
            "The alert store is not configured. Set PHOENIX_GITHUB_TOKEN to enable sending alerts."
        }
        LedgerErrorKind::Conflict => {
            "Other alerts were being recorded at the same time and this one was NOT saved. Try again."
        }
        LedgerErrorKind::Transport => {
            "The alert store is temporarily unavailable. Try again shortly."
        }
        LedgerErrorKind::MalformedDocument => {
            "The stored alert file is not in the expected format. Nothing was changed."
        }
        LedgerErrorKind::InvalidRecord => "The alert could not be stored as entered.",
    }
}

fn with_guidance(err: LedgerError) -> anyhow::Error {
    let hint = guidance(&err);
    anyhow::Error::new(err).context(hint)
}

/// Load `env_file` (or `.env` from the working directory) into the process
/// environment, then build the log filter from the result so `RUST_LOG`
/// may come from the file.
fn load_environment(env_file: Option<&Path>) -> EnvFilter {
    if let Some(path) = env_file {
        dotenvy::from_path(path).ok();
    } else {
        dotenvy::dotenv().ok();
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = load_environment(None);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();

    let config = LedgerConfig::from_env().context("invalid ledger configuration")?;
    let ledger = AlertLedger::from_config(&config).context("failed to set up content store")?;
    tracing::debug!(path = %ledger.path(), attempts = ledger.max_attempts(), "ledger ready");

    match cli.command {
        Command::List { location } => {
            let records = match location {
                Some(query) => ledger.find_by_location(&query).await,
                None => ledger.list().await,
            }
            .map_err(with_guidance)?;

            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        Command::Append {
            location,
            severity,
            description,
            contact,
            allow_duplicate,
        } => {
            let mut record = Record::new(location, severity, description);
            if let Some(contact) = contact {
                record = record.with_contact_info(contact);
            }

            let summary = if allow_duplicate {
                ledger.append(record.clone()).await.map_err(with_guidance)?;
                json!({ "status": "appended", "alert": record })
            } else {
                match ledger
                    .append_unique(record.clone())
                    .await
                    .map_err(with_guidance)?
                {
                    AppendOutcome::Appended { attempts } => {
                        json!({ "status": "appended", "attempts": attempts, "alert": record })
                    }
                    AppendOutcome::Duplicate { existing } => {
                        json!({ "status": "duplicate", "alert": existing })
                    }
                }
            };
            println!("{}", summary);
        }
    }

    Ok(())
}
