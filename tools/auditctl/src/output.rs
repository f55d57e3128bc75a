//! Rendering of audit results

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use serde::Serialize;
use std::io::Write;
use tariff_rules::{AuditResult, AuditStatus, AuditSummary, Discrepancy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// One flat CSV row per audited record
#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    account_id: &'a str,
    sc_code: &'a str,
    status: AuditStatus,
    actual_bill: String,
    expected_bill: String,
    variance: String,
    discrepancy: String,
    reason: &'a str,
    trace: String,
}

impl<'a> ReportRow<'a> {
    fn new(result: &'a AuditResult, tolerance: f64) -> Self {
        Self {
            account_id: result.account_id.as_deref().unwrap_or_default(),
            sc_code: &result.sc_code,
            status: result.status,
            actual_bill: format!("{:.2}", result.actual_bill),
            expected_bill: format!("{:.2}", result.expected_bill),
            variance: format!("{:.2}", result.variance),
            discrepancy: result.discrepancy(tolerance).to_string(),
            reason: result.reason.as_deref().unwrap_or_default(),
            trace: result.trace.join(" | "),
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    tolerance: f64,
    summary: &'a AuditSummary,
    results: Vec<JsonResult<'a>>,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    #[serde(flatten)]
    result: &'a AuditResult,
    discrepancy: Discrepancy,
}

pub fn write_table(
    out: &mut dyn Write,
    results: &[&AuditResult],
    tolerance: f64,
    show_trace: bool,
) -> Result<()> {
    writeln!(
        out,
        "{:<14} {:<8} {:<8} {:>12} {:>12} {:>10}  {}",
        "Account".bold(),
        "SC".bold(),
        "Status".bold(),
        "Billed".bold(),
        "Expected".bold(),
        "Variance".bold(),
        "Result".bold()
    )?;
    writeln!(out, "{}", "─".repeat(80).dimmed())?;

    for result in results {
        let discrepancy = result.discrepancy(tolerance);
        let verdict = match discrepancy {
            Discrepancy::Overcharge => discrepancy.to_string().red(),
            Discrepancy::Undercharge => discrepancy.to_string().yellow(),
            Discrepancy::WithinTolerance if result.status == AuditStatus::Skipped => {
                "-".dimmed()
            },
            Discrepancy::WithinTolerance => discrepancy.to_string().green(),
        };
        let status = match result.status {
            AuditStatus::Success => result.status.to_string().normal(),
            AuditStatus::Skipped => result.status.to_string().dimmed(),
        };

        writeln!(
            out,
            "{:<14} {:<8} {:<8} {:>12.2} {:>12.2} {:>10.2}  {}",
            result.account_id.as_deref().unwrap_or("-"),
            result.sc_code,
            status,
            result.actual_bill,
            result.expected_bill,
            result.variance,
            verdict
        )?;

        if let Some(reason) = &result.reason {
            writeln!(out, "  {} {}", "→".cyan(), reason.dimmed())?;
        } else if show_trace {
            for line in &result.trace {
                writeln!(out, "  {} {}", "·".cyan(), line)?;
            }
        }
    }
    Ok(())
}

pub fn write_summary(out: &mut dyn Write, summary: &AuditSummary, tolerance: f64) -> Result<()> {
    writeln!(out, "{}", "─".repeat(80).dimmed())?;
    writeln!(
        out,
        "{} audited, {} succeeded, {} skipped",
        summary.audited, summary.succeeded, summary.skipped
    )?;

    let flagged = format!(
        "{} flagged (tolerance ${:.2}): {} overcharged, {} undercharged",
        summary.flagged(),
        tolerance,
        summary.overcharged,
        summary.undercharged
    );
    if summary.flagged() == 0 {
        writeln!(out, "{}", flagged.green())?;
    } else {
        writeln!(out, "{}", flagged.yellow())?;
    }
    writeln!(out, "Net variance: ${:.2}", summary.total_variance)?;
    Ok(())
}

pub fn write_json(
    out: &mut dyn Write,
    results: &[&AuditResult],
    summary: &AuditSummary,
    tolerance: f64,
) -> Result<()> {
    let report = JsonReport {
        tolerance,
        summary,
        results: results
            .iter()
            .map(|result| JsonResult {
                result,
                discrepancy: result.discrepancy(tolerance),
            })
            .collect(),
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

pub fn write_csv(out: &mut dyn Write, results: &[&AuditResult], tolerance: f64) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for result in results {
        writer.serialize(ReportRow::new(result, tolerance))?;
    }
    writer.flush()?;
    Ok(())
}
