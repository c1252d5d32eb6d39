//! Verdict CLI: validate known-issue catalogs, classify failures, and replay
//! lifecycle event logs into statistics and an exit code.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use verdict::core::context::TestInfo;
use verdict::core::known_issue::KnownIssue;
use verdict::core::status::Status;
use verdict::exit_codes;
use verdict::io::config::{CONFIG_FILE, load_config};
use verdict::logging;
use verdict::session::{build_catalog, classify, replay_file};

#[derive(Parser)]
#[command(
    name = "verdict",
    version,
    about = "Known-issue aware outcome tracking for BDD test runs"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate the known-issue catalog.
    Catalog,
    /// Classify one failure message against the catalog.
    Classify {
        /// Failure message of the assertion.
        #[arg(short, long)]
        message: String,
        /// Running story name.
        #[arg(long)]
        suite: Option<String>,
        /// Running scenario title.
        #[arg(long)]
        case: Option<String>,
        /// Running step.
        #[arg(long)]
        step: Option<String>,
        /// Runtime data as `name=value` (repeatable).
        #[arg(long = "data", value_parser = parse_key_value)]
        data: Vec<(String, String)>,
    },
    /// Replay a JSON Lines event log and exit with the run exit code.
    Replay {
        events: PathBuf,
        /// Track context only; skip statistics and known-issue matching.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Classification {
    status: Status,
    known_issue: Option<KnownIssue>,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("load config {}", cli.config.display()))?;
    match cli.command {
        Command::Catalog => {
            let catalog = build_catalog(&config)?;
            for (id, identifier) in catalog.iter() {
                println!("{id}\t{}", identifier.definition.assertion_pattern);
            }
            println!("{} known issues", catalog.len());
            Ok(exit_codes::OK)
        }
        Command::Classify {
            message,
            suite,
            case,
            step,
            data,
        } => {
            let info = (suite.is_some() || case.is_some() || step.is_some())
                .then_some(TestInfo { suite, case, step });
            let data: BTreeMap<String, String> = data.into_iter().collect();
            let failure = classify(&config, &message, info.as_ref(), &data)?;
            let output = Classification {
                status: failure.status(),
                known_issue: failure.known_issue,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("serialize classification")?
            );
            Ok(exit_codes::OK)
        }
        Command::Replay { events, dry_run } => {
            let summary = replay_file(&config, &events, dry_run)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("serialize summary")?
            );
            Ok(summary.exit_code.code())
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("expected name=value, got '{raw}'");
    };
    if key.trim().is_empty() {
        bail!("runtime data name must not be empty");
    }
    Ok((key.to_string(), value.to_string()))
}
