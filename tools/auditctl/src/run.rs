//! Batch audit command
//!
//! Reads bill records, audits them on a pool of blocking tasks that share one
//! engine, and renders the results in input order.

use crate::output::{self, OutputFormat};
use anyhow::{bail, Context, Result};
use clap::Args;
use common::AuditConfig;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use tariff_rules::{AuditEngine, AuditResult, AuditSummary, RuleStore, UsageRecord};
use tracing::{info, warn};

#[derive(Args)]
pub struct RunArgs {
    /// Bill records (.csv or .json)
    #[arg(short, long)]
    pub bills: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Write results to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Flag variances larger than this many dollars (overrides config)
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Concurrent audit workers (overrides config)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Only output records outside the tolerance
    #[arg(long)]
    pub flagged_only: bool,

    /// Print each record's step trace (table format)
    #[arg(long)]
    pub trace: bool,
}

pub async fn handle_command(args: RunArgs, store: RuleStore, config: &AuditConfig) -> Result<()> {
    let tolerance = args.tolerance.unwrap_or(config.tolerance);
    if !tolerance.is_finite() || tolerance < 0.0 {
        bail!("--tolerance must be a non-negative amount");
    }
    let workers = args.workers.unwrap_or(config.workers).max(1);

    if store.is_empty() {
        warn!("No tariffs loaded; every record will be skipped");
    }

    let records = load_records(&args.bills)?;
    info!(
        "Auditing {} records from {} with {} workers",
        records.len(),
        args.bills.display(),
        workers
    );

    let engine = AuditEngine::new(store);
    let results = audit_concurrently(engine, records, workers).await?;
    let summary = AuditSummary::from_results(&results, tolerance);

    let shown: Vec<&AuditResult> = results
        .iter()
        .filter(|r| !args.flagged_only || r.discrepancy(tolerance).is_flagged())
        .collect();

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    match args.format {
        OutputFormat::Table => {
            output::write_table(&mut out, &shown, tolerance, args.trace)?;
            output::write_summary(&mut out, &summary, tolerance)?;
        },
        OutputFormat::Json => output::write_json(&mut out, &shown, &summary, tolerance)?,
        OutputFormat::Csv => output::write_csv(&mut out, &shown, tolerance)?,
    }
    out.flush()?;

    info!(
        "Audited {}: {} succeeded, {} skipped, {} flagged",
        summary.audited,
        summary.succeeded,
        summary.skipped,
        summary.flagged()
    );
    Ok(())
}

/// Read records from CSV or JSON (array, or one object per line)
///
/// Rows that fail to deserialize are logged and dropped.
pub fn load_records(path: &Path) -> Result<Vec<UsageRecord>> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("csv") => {
            let mut reader = csv::Reader::from_path(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let mut records = Vec::new();
            for (line, row) in reader.deserialize::<UsageRecord>().enumerate() {
                match row {
                    Ok(record) => records.push(record),
                    // header is line 1
                    Err(e) => warn!("Skipping row {} of {}: {}", line + 2, path.display(), e),
                }
            }
            Ok(records)
        },
        Some("json") | Some("jsonl") | Some("ndjson") => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let value: serde_json::Value = match serde_json::from_reader(BufReader::new(file)) {
                Ok(value) => value,
                Err(_) => return load_json_lines(path),
            };
            let rows = match value {
                serde_json::Value::Array(rows) => rows,
                serde_json::Value::Object(mut map) => match map.remove("bills") {
                    Some(serde_json::Value::Array(rows)) => rows,
                    _ => vec![serde_json::Value::Object(map)],
                },
                other => bail!("Expected a list of bill records, got {}", other),
            };
            Ok(rows
                .into_iter()
                .enumerate()
                .filter_map(|(i, row)| match serde_json::from_value(row) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Skipping record {} of {}: {}", i + 1, path.display(), e);
                        None
                    },
                })
                .collect())
        },
        _ => bail!(
            "Unsupported bills file {} (expected .csv or .json)",
            path.display()
        ),
    }
}

fn load_json_lines(path: &Path) -> Result<Vec<UsageRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping line {} of {}: {}", i + 1, path.display(), e),
        }
    }
    Ok(records)
}

/// Audit on `workers` blocking tasks; results come back in input order
///
/// Each task gets its own clone of the engine; clones share the rule store.
pub async fn audit_concurrently(
    engine: AuditEngine,
    records: Vec<UsageRecord>,
    workers: usize,
) -> Result<Vec<AuditResult>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let chunk_size = records.len().div_ceil(workers.max(1));
    let mut handles = Vec::new();
    let mut remaining = records.into_iter();
    loop {
        let chunk: Vec<UsageRecord> = remaining.by_ref().take(chunk_size).collect();
        if chunk.is_empty() {
            break;
        }
        let engine = engine.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            engine.audit_batch(&chunk)
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.extend(handle.await.context("Audit worker failed")?);
    }
    Ok(results)
}
