//! Table and JSON rendering of analysis results.

use crate::aggregate::{Mode, Summary};
use crate::dbops::{Consolidation, OperationKind, ALL_DBS, ALL_OPERATIONS};
use crate::pipeline::{Analysis, LineStats};
use crate::record::Record;
use chrono::{DateTime, Utc};
use comfy_table::{presets::ASCII_FULL_CONDENSED, ContentArrangement, Table};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Marker appended to truncated cells.
const ELLIPSIS: &str = "...";

/// Cell for an absent value.
const EMPTY_CELL: &str = "-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Statistic a report is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    Key,
    Count,
    Average,
    Median,
    Min,
    Max,
    Total,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    /// Maximum rows; 0 prints everything.
    pub limit: usize,
    /// Width of the key column.
    pub width: usize,
    pub descending: bool,
    pub sort_by: SortKey,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            limit: 0,
            width: 100,
            descending: true,
            sort_by: SortKey::Count,
        }
    }
}

impl ReportOptions {
    fn take<T>(&self, rows: Vec<T>) -> Vec<T> {
        if self.limit == 0 {
            rows
        } else {
            rows.into_iter().take(self.limit).collect()
        }
    }
}

fn cmp_stat(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn stat(summary: &Summary, key: SortKey) -> Option<f64> {
    match key {
        SortKey::Key => None,
        SortKey::Count => Some(summary.count as f64),
        SortKey::Average => summary.average,
        SortKey::Median => summary.median,
        SortKey::Min => summary.min,
        SortKey::Max => summary.max,
        SortKey::Total => Some(summary.sum),
    }
}

/// Groups ordered by the chosen statistic, ties broken by key (ascending),
/// then cut to the row limit.
pub fn sorted_groups<'a>(
    groups: &'a HashMap<String, Summary>,
    opts: &ReportOptions,
) -> Vec<(&'a str, &'a Summary)> {
    let mut rows: Vec<(&str, &Summary)> = groups.iter().map(|(k, s)| (k.as_str(), s)).collect();
    rows.sort_by(|(ka, a), (kb, b)| {
        let primary = match opts.sort_by {
            SortKey::Key => ka.cmp(kb),
            key => cmp_stat(stat(a, key), stat(b, key)),
        };
        let primary = if opts.descending {
            primary.reverse()
        } else {
            primary
        };
        primary.then_with(|| ka.cmp(kb))
    });
    opts.take(rows)
}

/// Shorten `text` to at most `width` characters, marking the cut with `...`.
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    if width <= ELLIPSIS.len() {
        return text.chars().take(width).collect();
    }
    let mut out: String = text.chars().take(width - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

fn seconds(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.3}"),
        None => EMPTY_CELL.to_string(),
    }
}

/// Render a bordered table. Cells are not wrapped; long keys are cut with
/// [`truncate`] before they get here.
pub fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut table = Table::new();
    table
        .load_preset(ASCII_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Disabled)
        .set_header(headers.to_vec());
    for row in rows {
        table.add_row(row);
    }
    format!("{table}\n")
}

/// Two-column table of occurrence counts.
pub fn count_table(analysis: &Analysis, opts: &ReportOptions, key_header: &str) -> String {
    let rows: Vec<Vec<String>> = sorted_groups(&analysis.groups, opts)
        .into_iter()
        .map(|(key, s)| vec![truncate(key, opts.width), s.count.to_string()])
        .collect();
    render_table(&[key_header, "Counter"], rows)
}

/// Per-key duration statistics.
pub fn stats_table(analysis: &Analysis, opts: &ReportOptions, key_header: &str) -> String {
    let rows: Vec<Vec<String>> = sorted_groups(&analysis.groups, opts)
        .into_iter()
        .map(|(key, s)| {
            vec![
                truncate(key, opts.width),
                s.count.to_string(),
                seconds(s.average),
                seconds(s.median),
                seconds(s.min),
                seconds(s.max),
                seconds(Some(s.sum)),
            ]
        })
        .collect();
    render_table(
        &[key_header, "Count", "Average", "Median", "Min", "Max", "Total"],
        rows,
    )
}

/// Test runs ordered by duration. Anything other than test records is
/// ignored.
fn sorted_runs<'a>(records: &'a [Record], opts: &ReportOptions) -> Vec<&'a Record> {
    let mut runs: Vec<&Record> = records
        .iter()
        .filter(|r| matches!(r, Record::Test { .. }))
        .collect();
    runs.sort_by(|a, b| {
        let primary = match opts.sort_by {
            SortKey::Key => a.group_key().cmp(&b.group_key()),
            _ => cmp_stat(a.sample(), b.sample()),
        };
        let primary = if opts.descending {
            primary.reverse()
        } else {
            primary
        };
        primary.then_with(|| a.group_key().cmp(&b.group_key()))
    });
    opts.take(runs)
}

/// One row per test run.
pub fn runs_table(records: &[Record], opts: &ReportOptions) -> String {
    let rows: Vec<Vec<String>> = sorted_runs(records, opts)
        .into_iter()
        .filter_map(|r| match r {
            Record::Test {
                test_name,
                worker_id,
                result,
                duration_seconds,
                ..
            } => Some(vec![
                truncate(test_name, opts.width),
                worker_id.to_string(),
                result.clone(),
                seconds(Some(*duration_seconds)),
            ]),
            _ => None,
        })
        .collect();
    render_table(&["Test name", "Test worker", "Test result", "Test time"], rows)
}

fn db_columns() -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = OperationKind::ALL.iter().map(|k| k.as_str()).collect();
    columns.push(ALL_OPERATIONS);
    columns
}

/// Database by operation-kind matrix, closed by the all-databases row.
pub fn db_table(consolidation: &Consolidation) -> String {
    let columns = db_columns();
    let row_for = |label: &str, db: &str| -> Vec<String> {
        std::iter::once(label.to_string())
            .chain(columns.iter().map(|col| match consolidation.count(db, col) {
                Some(n) => n.to_string(),
                None => EMPTY_CELL.to_string(),
            }))
            .collect()
    };

    let mut rows: Vec<Vec<String>> = consolidation
        .databases()
        .into_iter()
        .map(|db| row_for(db, db))
        .collect();
    rows.push(row_for("All databases", ALL_DBS));

    let headers: Vec<&str> = std::iter::once("db").chain(columns.iter().copied()).collect();
    render_table(&headers, rows)
}

#[derive(Serialize)]
struct GroupEntry<'a> {
    key: &'a str,
    #[serde(flatten)]
    summary: &'a Summary,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    report: &'a str,
    mode: Mode,
    lines: LineStats,
    total: u64,
    groups: Vec<GroupEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    runs: Option<Vec<&'a Record>>,
}

/// Pretty JSON document for a log analysis. `runs` adds the individual test
/// runs next to the groups.
pub fn render_json(
    report: &str,
    analysis: &Analysis,
    opts: &ReportOptions,
    runs: bool,
) -> Result<String, serde_json::Error> {
    let doc = JsonReport {
        generated_at: Utc::now(),
        report,
        mode: analysis.mode,
        lines: analysis.lines,
        total: analysis.total_count(),
        groups: sorted_groups(&analysis.groups, opts)
            .into_iter()
            .map(|(key, summary)| GroupEntry { key, summary })
            .collect(),
        runs: runs.then(|| sorted_runs(&analysis.records, opts)),
    };
    serde_json::to_string_pretty(&doc)
}

#[derive(Serialize)]
struct DbJsonReport {
    generated_at: DateTime<Utc>,
    rejected: u64,
    databases: BTreeMap<String, BTreeMap<String, u64>>,
}

pub fn render_db_json(consolidation: &Consolidation) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&DbJsonReport {
        generated_at: Utc::now(),
        rejected: consolidation.rejected(),
        databases: consolidation.table(),
    })
}
