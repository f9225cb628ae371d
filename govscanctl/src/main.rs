//! # govscanctl
//!
//! Command line front end for the govscan engine. `config` shows the resolved
//! configuration; `scan` runs a scan against a JSON inventory fixture with
//! in-memory collaborators and prints the result.

mod fixture;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use govscan_config::{ConfigLoad, ConfigLoader};
use govscan_core::ScanEngine;
use govscan_model::{AccountId, JobStatus, Region, ScanRequest, SubmitResponse};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::fixture::Fixture;

#[derive(Parser, Debug)]
#[command(name = "govscanctl", about = "Governance scans for AWS AI/ML resources")]
struct Cli {
    /// TOML configuration file (overrides GOVSCAN_CONFIG_PATH)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Env file read before the process environment is consulted
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved configuration and any warnings
    Config,
    /// Run one scan against an inventory fixture
    Scan(ScanArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// JSON inventory fixture
    #[arg(long)]
    fixture: PathBuf,
    /// Account to scan; defaults to every account in the fixture
    #[arg(long = "account")]
    accounts: Vec<AccountId>,
    /// Region to scan; defaults to the account's regions
    #[arg(long = "region")]
    regions: Vec<Region>,
    #[arg(long, default_value = "govscanctl")]
    requested_by: String,
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    config_path: Option<&'a std::path::Path>,
    env_file: Option<&'a std::path::Path>,
    config: &'a govscan_core::EngineConfig,
    warnings: Vec<WarningReport<'a>>,
}

#[derive(Serialize)]
struct WarningReport<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,govscan_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    let load = loader.load().context("failed to load configuration")?;

    match cli.command {
        Command::Config => {
            print_config(&load)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Scan(args) => {
            load.warnings.log();
            run_scan(load, args).await
        }
    }
}

fn print_config(load: &ConfigLoad) -> Result<()> {
    let report = ConfigReport {
        config_path: load.metadata.config_path.as_deref(),
        env_file: load.metadata.env_file.as_deref(),
        config: &load.config,
        warnings: load
            .warnings
            .items
            .iter()
            .map(|warning| WarningReport {
                message: &warning.message,
                hint: warning.hint.as_deref(),
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_scan(load: ConfigLoad, args: ScanArgs) -> Result<ExitCode> {
    let fixture = Fixture::from_path(&args.fixture)?;
    let account_ids = if args.accounts.is_empty() {
        fixture.account_ids()
    } else {
        args.accounts
    };

    let (parts, store) = fixture.into_parts(&load.config.aws_scanner_role_name)?;
    let engine = ScanEngine::new(load.config, parts).context("failed to start scan engine")?;

    let response = engine
        .submit(ScanRequest {
            account_ids,
            regions: args.regions,
            requested_by: args.requested_by,
        })
        .await
        .context("scan submission failed")?;
    let job_id = match response {
        SubmitResponse::Accepted { job_id, .. } => job_id,
        SubmitResponse::Rejected { reason } => bail!("scan rejected: {reason}"),
    };
    info!(job_id = %job_id, "scan started");

    let result = engine
        .wait(job_id)
        .await
        .context("scan finished without a result")?;
    match engine.persist_error(job_id) {
        Some(err) => warn!(job_id = %job_id, error = %err, "scan result was not persisted"),
        None if store.persisted(&job_id).is_some() => {
            info!(job_id = %job_id, "scan result persisted")
        }
        None => {}
    }
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    info!(
        job_id = %job_id,
        status = %result.overall_status,
        findings = result.findings.len(),
        "scan finished"
    );

    Ok(if result.overall_status == JobStatus::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
