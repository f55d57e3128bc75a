//! auditctl - Tariff audit tool
//!
//! Recomputes expected bills from a tariff document and flags records whose
//! billed amount differs by more than the configured tolerance.

mod eval;
mod output;
mod run;
mod tariffs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::AuditConfig;
use std::path::PathBuf;
use tariff_rules::RuleStore;

#[derive(Parser)]
#[command(name = "auditctl")]
#[command(about = "Audit utility bills against published tariffs")]
#[command(long_about = "Audit utility bills against published tariffs

Commands:
  run        Audit a file of bill records (CSV or JSON)
  tariffs    Inspect the loaded tariff document
  eval       Evaluate a tariff expression against a record

Examples:
  auditctl run --bills data/raw/user_bills.csv
  auditctl run --bills bills.json --format json --flagged-only
  auditctl tariffs show SC-3
  auditctl eval 'min(40, user.billed_demand)' --record '{\"billed_demand\": 55}'

Configuration is read from --config, then TARIFF_AUDIT_* environment variables.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (.toml, .yaml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Tariff definition document (overrides tariff_path)
    #[arg(short, long, global = true)]
    tariffs: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a file of bill records
    Run(run::RunArgs),

    /// Inspect the loaded tariff document
    #[command(about = "List or show service classifications")]
    Tariffs {
        #[command(subcommand)]
        command: tariffs::TariffCommands,
    },

    /// Evaluate an expression against a record's context
    Eval(eval::EvalArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = AuditConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(path) = cli.tariffs {
        config.tariff_path = path;
    }

    let mut log_config = config.log.to_log_config("auditctl");
    if cli.verbose {
        log_config.level = "debug".to_string();
    }
    log_config.console_ansi = !cli.no_color;
    common::logging::init_with_config(log_config).context("Failed to initialise logging")?;

    match cli.command {
        Commands::Run(args) => {
            let store = RuleStore::load_or_empty(&config.tariff_path);
            run::handle_command(args, store, &config).await?;
        },
        Commands::Tariffs { command } => {
            let store = RuleStore::load(&config.tariff_path).with_context(|| {
                format!("Failed to load tariffs from {}", config.tariff_path.display())
            })?;
            tariffs::handle_command(command, &store)?;
        },
        Commands::Eval(args) => eval::handle_command(args)?,
    }

    Ok(())
}
