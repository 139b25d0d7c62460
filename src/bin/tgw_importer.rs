//! tgw-importer command line
//!
//! # Usage
//!
//! ```bash
//! # Discover a region and save snapshot.json under ./output/<account>/<region>
//! tgw-importer discover --region ap-northeast-1 --profile network
//!
//! # Synthesize configuration from saved discovery output
//! tgw-importer synthesize --input-dir ./output --output-dir ./terraform
//!
//! # Generate import plans only, as import blocks
//! tgw-importer plan-reconciliation --format blocks
//!
//! # Everything, for one region
//! tgw-importer run-all --region ap-northeast-1
//! ```
//!
//! Exit status: 0 success, 2 configuration or model error, 3 transient API
//! failure, 4 authorization failure, 1 anything else.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use tgw_importer::collector::{AwsCliApi, DescribeApi};
use tgw_importer::config::{ConfigLoader, ImporterConfig, PlanFormat};
use tgw_importer::pipeline::{self, RunSummary};
use tgw_importer::ImportError;

#[derive(Parser)]
#[command(name = "tgw-importer")]
#[command(version)]
#[command(about = "Bring an existing Transit Gateway topology under Terraform management")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file (also TGW_IMPORTER_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Hub gateway to manage: id, key, or name
    #[arg(long, global = true)]
    hub: Option<String>,

    /// Reconciliation plan format
    #[arg(long, global = true, value_enum)]
    format: Option<PlanFormat>,

    /// Import spoke-side VPC routes instead of skipping them
    #[arg(long, global = true)]
    reconcile_spoke_routes: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the topology and save snapshot.json
    Discover {
        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        profile: Option<String>,

        /// Root for <account>/<region>/snapshot.json
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Write per-partition Terraform configuration
    Synthesize {
        /// snapshot.json, or a directory of discovery output
        #[arg(long)]
        input_dir: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Write per-partition import plans and skipped.json
    PlanReconciliation {
        /// snapshot.json, or a directory of discovery output
        #[arg(long)]
        input_dir: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Discover, synthesize and plan in one run
    RunAll {
        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        profile: Option<String>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Stop after synthesis
        #[arg(long)]
        skip_reconcile: bool,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            if let Some(hint) = e.downcast_ref::<ImportError>().and_then(ImportError::hint) {
                eprintln!("{}: {hint}; no partition was written", "hint".yellow().bold());
            }
            ExitCode::from(exit_code(&e))
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<ImportError>()
        .map(ImportError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ConfigLoader::from_env()
        .with_path(cli.config.clone())
        .load()
        .context("failed to load configuration")?;

    if cli.hub.is_some() {
        config.hub = cli.hub.clone();
    }
    if let Some(format) = cli.format {
        config.plan_format = format;
    }
    if cli.reconcile_spoke_routes {
        config.reconcile_spoke_routes = true;
    }

    match cli.command {
        Commands::Discover {
            account,
            region,
            profile,
            output_dir,
        } => {
            apply_scope(&mut config, account, region, profile)?;
            let root = output_dir.unwrap_or_else(|| config.input_dir.clone());
            let (snapshot, path) = pipeline::discover_to(aws_api(&config), &config, &root)
                .await
                .context("discovery failed")?;
            println!(
                "{} {} gateway(s), {} route table(s), {} attachment(s) -> {}",
                "OK".green().bold(),
                snapshot.gateways.len(),
                snapshot.route_tables.len(),
                snapshot.attachments.len(),
                path.display()
            );
            if !snapshot.excluded.is_empty() {
                println!(
                    "{} {} resource(s) excluded during discovery",
                    "WARN".yellow().bold(),
                    snapshot.excluded.len()
                );
            }
        }
        Commands::Synthesize {
            input_dir,
            output_dir,
        } => {
            apply_dirs(&mut config, input_dir, output_dir);
            let snapshot = pipeline::load_input(&config.input_dir, &config)
                .await
                .with_context(|| format!("failed to load {}", config.input_dir.display()))?;
            let summary = pipeline::process(&snapshot, &config, true, false).await?;
            report(&summary, &config);
        }
        Commands::PlanReconciliation {
            input_dir,
            output_dir,
        } => {
            apply_dirs(&mut config, input_dir, output_dir);
            let snapshot = pipeline::load_input(&config.input_dir, &config)
                .await
                .with_context(|| format!("failed to load {}", config.input_dir.display()))?;
            let summary = pipeline::process(&snapshot, &config, false, true).await?;
            report(&summary, &config);
        }
        Commands::RunAll {
            account,
            region,
            profile,
            output_dir,
            skip_reconcile,
        } => {
            apply_scope(&mut config, account, region, profile)?;
            apply_dirs(&mut config, None, output_dir);
            let summary = pipeline::run_all(aws_api(&config), &config, skip_reconcile).await?;
            report(&summary, &config);
        }
    }
    Ok(())
}

fn apply_scope(
    config: &mut ImporterConfig,
    account: Option<String>,
    region: Option<String>,
    profile: Option<String>,
) -> anyhow::Result<()> {
    if account.is_some() {
        config.account_id = account;
    }
    if let Some(region) = region {
        config.region = region;
    }
    if profile.is_some() {
        config.profile = profile;
    }
    config.validate()?;
    Ok(())
}

fn apply_dirs(config: &mut ImporterConfig, input: Option<PathBuf>, output: Option<PathBuf>) {
    if let Some(input) = input {
        config.input_dir = input;
    }
    if let Some(output) = output {
        config.output_dir = output;
    }
}

fn aws_api(config: &ImporterConfig) -> Arc<dyn DescribeApi> {
    Arc::new(AwsCliApi::new(&config.region, config.profile.clone()))
}

fn report(summary: &RunSummary, config: &ImporterConfig) {
    println!(
        "{} {} partition(s), {} file(s), {} import directive(s) -> {}",
        "OK".green().bold(),
        summary.partitions,
        summary.files,
        summary.directives,
        config.output_dir.display()
    );
    if summary.excluded > 0 {
        println!(
            "{} {} resource(s) excluded during discovery",
            "WARN".yellow().bold(),
            summary.excluded
        );
    }
    if summary.skipped > 0 {
        println!(
            "{} {} declared resource(s) not imported; see skipped.json",
            "WARN".yellow().bold(),
            summary.skipped
        );
    }
}
