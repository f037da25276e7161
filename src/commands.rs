//! Subcommand handlers: resolve config and flags, run the analysis, render.

use crate::aggregate::Mode;
use crate::config::LogtallyConfig;
use crate::dbops;
use crate::ingest;
use crate::pipeline::{Analysis, Analyzer};
use crate::record::Domain;
use crate::report::{self, OutputFormat, ReportOptions, SortKey};
use std::path::Path;

/// SQL statements can be numerous; the table stops here unless told otherwise.
const SQL_DEFAULT_ROWS: usize = 30;

/// Report flags shared by every log subcommand.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ReportArgs {
    /// Print at most N rows (0 = all)
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Truncate the key column to N characters
    #[arg(long, value_name = "N")]
    pub width: Option<usize>,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub asc: bool,
}

/// The log-driven reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogReport {
    Requests,
    RequestTimes,
    Sql,
    Tests { runs: bool },
    Levels,
    Services,
}

impl LogReport {
    pub fn name(self) -> &'static str {
        match self {
            LogReport::Requests => "requests",
            LogReport::RequestTimes => "request-times",
            LogReport::Sql => "sql",
            LogReport::Tests { .. } => "tests",
            LogReport::Levels => "levels",
            LogReport::Services => "services",
        }
    }

    pub fn domain(self) -> Domain {
        match self {
            LogReport::Requests | LogReport::RequestTimes => Domain::Http,
            LogReport::Sql => Domain::Sql,
            LogReport::Tests { .. } => Domain::Test,
            LogReport::Levels => Domain::Severity,
            LogReport::Services => Domain::Service,
        }
    }

    pub fn mode(self) -> Mode {
        match self {
            LogReport::RequestTimes | LogReport::Tests { .. } => Mode::Statistical,
            _ => Mode::Counting,
        }
    }

    fn key_header(self) -> &'static str {
        match self {
            LogReport::Requests => "Request",
            LogReport::RequestTimes => "Requests",
            LogReport::Sql => "SQL Query",
            LogReport::Tests { .. } => "Test name",
            LogReport::Levels => "Level",
            LogReport::Services => "Service",
        }
    }

    fn default_sort(self) -> SortKey {
        match self.mode() {
            Mode::Counting => SortKey::Count,
            Mode::Statistical => SortKey::Average,
        }
    }

    /// Noun for the trailing total line of counting reports.
    fn total_noun(self) -> Option<&'static str> {
        match self {
            LogReport::Requests => Some("API requests"),
            LogReport::Sql => Some("SQL statements"),
            LogReport::Levels | LogReport::Services => Some("log lines"),
            LogReport::RequestTimes | LogReport::Tests { .. } => None,
        }
    }

    fn retains_records(self) -> bool {
        matches!(self, LogReport::Tests { runs: true })
    }
}

/// Merge CLI flags over config values. Flags win.
pub fn resolve_options(
    report: LogReport,
    config: &LogtallyConfig,
    args: &ReportArgs,
    sort_by: Option<SortKey>,
) -> ReportOptions {
    let default_rows = match report {
        LogReport::Sql => SQL_DEFAULT_ROWS,
        _ => 0,
    };
    let config_width = match report {
        LogReport::Sql => config.report.sql_max_width,
        _ => config.report.max_width,
    };
    ReportOptions {
        limit: args
            .limit
            .or(config.report.max_rows)
            .unwrap_or(default_rows),
        width: args.width.unwrap_or(config_width),
        descending: config.report.descending && !args.asc,
        sort_by: sort_by.unwrap_or_else(|| report.default_sort()),
    }
}

/// Run the analysis for `report` over `path` without printing.
pub fn analyze(report: LogReport, path: &Path, config: &LogtallyConfig) -> Result<Analysis, String> {
    let domain = report.domain();
    let pattern = config
        .patterns
        .resolve(domain.family())
        .map_err(|e| format!("Invalid {} pattern: {e}", domain.family()))?;

    let mut analyzer = Analyzer::new(&pattern, domain, report.mode());
    if report.retains_records() {
        analyzer = analyzer.retain_records();
    }
    ingest::feed_path(path, &mut analyzer).map_err(|e| e.to_string())?;
    Ok(analyzer.finish())
}

/// Render an analysis in the chosen format.
pub fn render(
    report: LogReport,
    analysis: &Analysis,
    opts: &ReportOptions,
    format: OutputFormat,
) -> Result<String, String> {
    if format == OutputFormat::Json {
        return report::render_json(report.name(), analysis, opts, report.retains_records())
            .map_err(|e| format!("Failed to serialize report: {e}"));
    }

    let mut out = match (report, report.mode()) {
        (LogReport::Tests { runs: true }, _) => report::runs_table(&analysis.records, opts),
        (_, Mode::Statistical) => report::stats_table(analysis, opts, report.key_header()),
        (_, Mode::Counting) => report::count_table(analysis, opts, report.key_header()),
    };
    if let Some(noun) = report.total_noun() {
        out.push_str(&format!("There were {} {noun} in total.\n", analysis.total_count()));
    }
    Ok(out)
}

/// Handle every log subcommand.
pub fn handle_log_report(
    report: LogReport,
    path: &Path,
    config: &LogtallyConfig,
    args: &ReportArgs,
    sort_by: Option<SortKey>,
    format: OutputFormat,
) -> Result<(), String> {
    let opts = resolve_options(report, config, args, sort_by);
    tracing::debug!(report = report.name(), ?opts, "resolved report options");

    let analysis = analyze(report, path, config)?;
    if analysis.lines.rejected > 0 {
        tracing::warn!(
            rejected = analysis.lines.rejected,
            "some matching lines could not be used (run with --verbose for details)"
        );
    }
    print!("{}", render(report, &analysis, &opts, format)?);
    Ok(())
}

/// Handle `logtally db-ops`.
pub fn handle_db_ops(path: &Path, format: OutputFormat) -> Result<(), String> {
    let rows = ingest::load_db_rows(path).map_err(|e| e.to_string())?;
    let consolidation = dbops::consolidate(&rows);
    if consolidation.rejected() > 0 {
        tracing::warn!(
            rejected = consolidation.rejected(),
            "skipped unusable database rows"
        );
    }
    let out = match format {
        OutputFormat::Table => report::db_table(&consolidation),
        OutputFormat::Json => report::render_db_json(&consolidation)
            .map_err(|e| format!("Failed to serialize report: {e}"))?,
    };
    print!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn http_line(method: &str, uri: &str, time: &str) -> String {
        format!(
            r#"Jan  1 00:00:01 host svc[123]: INFO "{method} {uri} HTTP/1.1" status: 200  len: 10 time: {time}"#
        )
    }

    #[test]
    fn options_default_per_report() {
        let cfg = LogtallyConfig::default();
        let args = ReportArgs::default();

        let sql = resolve_options(LogReport::Sql, &cfg, &args, None);
        assert_eq!(sql.limit, 30);
        assert_eq!(sql.width, 250);
        assert_eq!(sql.sort_by, SortKey::Count);
        assert!(sql.descending);

        let times = resolve_options(LogReport::RequestTimes, &cfg, &args, None);
        assert_eq!(times.limit, 0);
        assert_eq!(times.width, 100);
        assert_eq!(times.sort_by, SortKey::Average);
    }

    #[test]
    fn flags_override_config() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "logtally.toml",
            "[report]\nmax_rows = 5\nmax_width = 40\n",
        );
        let cfg = load_config(&path, true).unwrap();

        let from_config = resolve_options(LogReport::Requests, &cfg, &ReportArgs::default(), None);
        assert_eq!(from_config.limit, 5);
        assert_eq!(from_config.width, 40);
        // max_rows from config applies to sql too.
        assert_eq!(
            resolve_options(LogReport::Sql, &cfg, &ReportArgs::default(), None).limit,
            5
        );

        let args = ReportArgs {
            limit: Some(0),
            width: Some(12),
            asc: true,
        };
        let flags = resolve_options(LogReport::Requests, &cfg, &args, Some(SortKey::Key));
        assert_eq!(flags.limit, 0);
        assert_eq!(flags.width, 12);
        assert!(!flags.descending);
        assert_eq!(flags.sort_by, SortKey::Key);
    }

    #[test]
    fn requests_report_prints_total() {
        let dir = TempDir::new().unwrap();
        let lines = [
            http_line("GET", "/v1/items/550e8400-e29b-41d4-a716-446655440000", "0.1"),
            http_line("GET", "/v1/items/3fa85f64-5717-4562-b3fc-2c963f66afa6", "0.2"),
            http_line("POST", "/v1/items", "0.3"),
            "unrelated".to_string(),
        ];
        let path = write_file(dir.path(), "api.log", &lines.join("\n"));
        let cfg = LogtallyConfig::default();

        let analysis = analyze(LogReport::Requests, &path, &cfg).unwrap();
        let opts = resolve_options(LogReport::Requests, &cfg, &ReportArgs::default(), None);
        let out = render(LogReport::Requests, &analysis, &opts, OutputFormat::Table).unwrap();

        let rows: Vec<&str> = out.lines().filter(|l| l.starts_with('|')).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].starts_with("| GET /v1/items/* "));
        assert!(rows[2].starts_with("| POST /v1/items "));
        assert_eq!(
            out.lines().last(),
            Some("There were 3 API requests in total.")
        );
    }

    #[test]
    fn request_times_report_has_no_total_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "api.log", &http_line("GET", "/v1", "0.5"));
        let cfg = LogtallyConfig::default();
        let analysis = analyze(LogReport::RequestTimes, &path, &cfg).unwrap();
        let opts = resolve_options(LogReport::RequestTimes, &cfg, &ReportArgs::default(), None);
        let out = render(LogReport::RequestTimes, &analysis, &opts, OutputFormat::Table).unwrap();
        assert!(out.contains("| GET /v1 "));
        assert!(out.contains("0.500"));
        assert!(!out.contains("in total"));
    }

    #[test]
    fn tests_runs_report_lists_each_run() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "tests.log",
            "2024-05-01 12:00:00.100 | ci | {3} test_foo [1.234s] ... ok\n\
             2024-05-01 12:00:01.100 | ci | {1} test_foo [0.500s] ... FAILED\n",
        );
        let cfg = LogtallyConfig::default();
        let report = LogReport::Tests { runs: true };
        let analysis = analyze(report, &path, &cfg).unwrap();
        assert_eq!(analysis.records.len(), 2);
        assert_eq!(analysis.groups["test_foo"].count, 2);

        let opts = resolve_options(report, &cfg, &ReportArgs::default(), None);
        let out = render(report, &analysis, &opts, OutputFormat::Table).unwrap();
        assert!(out.contains("Test worker"));
        assert!(out.contains("FAILED"));
        // Header plus one row per run.
        assert_eq!(out.lines().filter(|l| l.starts_with('|')).count(), 3);
    }

    #[test]
    fn json_output_for_levels() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "service.log",
            "2024-05-01 12:00:00.123 42 ERROR nova [-] boom\n\
             2024-05-01 12:00:00.456 42 INFO nova [-] ok\n",
        );
        let cfg = LogtallyConfig::default();
        let analysis = analyze(LogReport::Levels, &path, &cfg).unwrap();
        let opts = resolve_options(LogReport::Levels, &cfg, &ReportArgs::default(), None);
        let out = render(LogReport::Levels, &analysis, &opts, OutputFormat::Json).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(doc["report"], "levels");
        assert_eq!(doc["lines"]["matched"], 2);
        assert_eq!(doc["groups"][0]["key"], "ERROR");
    }

    #[test]
    fn missing_input_is_reported() {
        let cfg = LogtallyConfig::default();
        let err = analyze(LogReport::Sql, Path::new("/nonexistent/sql.log"), &cfg).unwrap_err();
        assert!(err.contains("/nonexistent/sql.log"));
    }

    #[test]
    fn db_ops_handler_accepts_report() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "performance.json",
            r#"{"db": [{"db": "nova", "op": "INSERT", "count": 5}]}"#,
        );
        handle_db_ops(&path, OutputFormat::Table).unwrap();

        let empty = write_file(dir.path(), "empty.json", r#"{"db": []}"#);
        let err = handle_db_ops(&empty, OutputFormat::Json).unwrap_err();
        assert!(err.contains("no DB data"));
    }
}
