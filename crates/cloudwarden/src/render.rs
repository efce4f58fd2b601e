//! Output rendering: colored tables, CSV and JSON
//!
//! Everything printed to stdout goes through here. The core crates never
//! format human-readable text.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use cloudwarden_cloud::{
    ActionRequest, Disposition, GateDecision, GateKind, OnboardReport, OutcomeResult,
    ResourceDescriptor, RunReport, RunSummary,
};
use colored::{ColoredString, Colorize};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

/// Columns whose cells are colored by value
const STATE_COLUMNS: &[&str] = &["STATE", "STATUS", "RESULT"];

pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cells: Vec<String>) {
        debug_assert_eq!(cells.len(), self.headers.len());
        self.rows.push(cells);
    }

    pub fn to_csv(&self) -> anyhow::Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e))?;
        Ok(String::from_utf8(bytes)?)
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                self.rows
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(h.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn print(&self) {
        if self.rows.is_empty() {
            println!("{}", "No matching resources".dimmed());
            return;
        }

        let widths = self.widths();
        let header: Vec<String> = self
            .headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:<w$}", h, w = w))
            .collect();
        println!("{}", header.join("  ").bold());
        let total: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        println!("{}", "─".repeat(total).dimmed());

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&widths)
                .zip(&self.headers)
                .map(|((cell, w), header)| {
                    let padded = format!("{:<w$}", cell, w = w);
                    if STATE_COLUMNS.contains(header) {
                        colorize_state(&padded).to_string()
                    } else {
                        padded
                    }
                })
                .collect();
            println!("{}", cells.join("  ").trim_end());
        }
    }
}

fn colorize_state(padded: &str) -> ColoredString {
    match padded.trim() {
        "running" | "available" | "completed" | "Active" | "active" | "success" => padded.green(),
        "stopped" | "stopping" | "pending" | "Inactive" | "skipped" => padded.yellow(),
        "terminated" | "error" | "failed (transient)" | "failed (permanent)" => padded.red(),
        _ => padded.normal(),
    }
}

/// Print `value` as JSON, or `table` as a table or CSV
pub fn emit<T: Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    table: &Table,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Csv => print!("{}", table.to_csv()?),
        OutputFormat::Table => table.print(),
    }
    Ok(())
}

pub fn timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}

pub fn age_days(descriptor: &ResourceDescriptor, now: DateTime<Utc>) -> String {
    descriptor.age(now).num_days().to_string()
}

/// `k=v` pairs sorted by key
pub fn tags(descriptor: &ResourceDescriptor) -> String {
    let mut pairs: Vec<String> = descriptor
        .tags()
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();
    pairs.join(",")
}

/// Metadata field as display text; absent or null is `-`
pub fn meta(descriptor: &ResourceDescriptor, key: &str) -> String {
    match descriptor.metadata().get(key) {
        None | Some(serde_json::Value::Null) => "-".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) if items.is_empty() => "-".to_string(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

fn result_label(result: OutcomeResult) -> &'static str {
    match result {
        OutcomeResult::Success => "success",
        OutcomeResult::SkippedAlreadyInTargetState => "skipped",
        OutcomeResult::FailedTransient => "failed (transient)",
        OutcomeResult::FailedPermanent => "failed (permanent)",
    }
}

#[derive(Serialize)]
struct ReportView<'a> {
    request: &'a ActionRequest,
    decision: GateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    bulk_cap: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requested: Option<usize>,
    candidates: &'a [ResourceDescriptor],
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a RunSummary>,
}

/// Render a gated run
///
/// `candidate_table` lays out the candidates for a dry-run preview.
pub fn report(
    format: OutputFormat,
    report: &RunReport,
    candidate_table: impl FnOnce(&[ResourceDescriptor]) -> Table,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let view = match report {
            RunReport::Halted {
                request,
                decision,
                candidates,
            } => ReportView {
                request,
                decision: decision.kind(),
                bulk_cap: match decision {
                    GateDecision::BlockedBulkCapExceeded { cap, .. } => Some(*cap),
                    _ => None,
                },
                requested: match decision {
                    GateDecision::BlockedBulkCapExceeded { requested, .. } => Some(*requested),
                    _ => None,
                },
                candidates,
                summary: None,
            },
            RunReport::Completed {
                request,
                candidates,
                summary,
            } => ReportView {
                request,
                decision: GateKind::Proceed,
                bulk_cap: None,
                requested: None,
                candidates,
                summary: Some(summary),
            },
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    match report {
        RunReport::Halted {
            request,
            decision: GateDecision::BlockedBulkCapExceeded { cap, requested },
            ..
        } => {
            eprintln!(
                "{} {} would touch {} {}(s), above the bulk cap of {}",
                "Refused:".red().bold(),
                request.action(),
                requested,
                request.kind(),
                cap
            );
            eprintln!(
                "{}",
                "Narrow the selection or raise --bulk-cap to proceed.".yellow()
            );
        }
        RunReport::Halted {
            request,
            candidates,
            ..
        } => {
            let table = candidate_table(candidates);
            emit(format, candidates, &table)?;
            dry_run_note(
                format,
                &format!(
                    "Dry run: {} {}(s) would be affected by {}. Re-run with --apply to execute.",
                    candidates.len(),
                    request.kind(),
                    request.action()
                ),
            );
        }
        RunReport::Completed { summary, .. } => print_summary(format, summary)?,
    }
    Ok(())
}

/// Below the table in table mode; on stderr otherwise so stdout stays parseable
pub fn dry_run_note(format: OutputFormat, note: &str) {
    if format == OutputFormat::Table {
        println!();
        println!("{}", note.cyan());
    } else {
        eprintln!("{}", note);
    }
}

/// Onboarding result; secrets appear here and nowhere else
pub fn onboard_report(format: OutputFormat, report: &OnboardReport) -> anyhow::Result<()> {
    let mut table = Table::new(&["FIELD", "VALUE"]);
    table.row(vec!["user".into(), report.user.id().to_string()]);
    table.row(vec!["arn".into(), meta(&report.user, "arn")]);
    table.row(vec![
        "created".into(),
        if report.created { "yes" } else { "already existed" }.to_string(),
    ]);
    table.row(vec!["policies".into(), report.policies.join(",")]);
    if let Some(password) = &report.password {
        table.row(vec!["console password".into(), password.clone()]);
        table.row(vec![
            "password reset required".into(),
            report.password_reset_required.to_string(),
        ]);
    }
    if let Some(key) = &report.access_key {
        table.row(vec!["access key id".into(), key.access_key_id.clone()]);
        table.row(vec!["secret access key".into(), key.secret_access_key.clone()]);
    }
    emit(format, report, &table)?;

    if format == OutputFormat::Table && (report.password.is_some() || report.access_key.is_some()) {
        println!();
        println!(
            "{}",
            "Store these credentials now; they cannot be retrieved again.".yellow()
        );
    }
    Ok(())
}

/// Per-resource outcomes followed by the totals line
pub fn print_summary(format: OutputFormat, summary: &RunSummary) -> anyhow::Result<()> {
    let mut table = Table::new(&["ID", "RESULT", "DETAIL", "ELAPSED", "OPERATION"]);
    for outcome in &summary.outcomes {
        table.row(vec![
            outcome.id.clone(),
            result_label(outcome.result).to_string(),
            outcome.detail.clone().unwrap_or_default(),
            format!("{:.1}s", outcome.elapsed.as_secs_f64()),
            outcome.operation_id.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    emit(format, summary, &table)?;

    if format != OutputFormat::Table {
        return Ok(());
    }

    let totals = &summary.totals;
    let line = format!(
        "{} succeeded, {} skipped, {} failed ({})",
        totals.succeeded,
        totals.skipped,
        totals.failed(),
        summary.disposition
    );
    println!();
    match summary.disposition {
        Disposition::Success => println!("{}", format!("✓ {}", line).green().bold()),
        Disposition::PartialFailure => println!("{}", format!("! {}", line).yellow().bold()),
        Disposition::TotalFailure => println!("{}", format!("✗ {}", line).red().bold()),
    }
    if summary.interrupted {
        println!(
            "{}",
            "Interrupted: remaining resources were not processed".yellow()
        );
    }
    Ok(())
}
