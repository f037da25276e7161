mod aggregate;
mod commands;
mod config;
mod dbops;
mod ingest;
mod normalize;
mod patterns;
mod pipeline;
mod record;
mod report;

use clap::{Parser, Subcommand};
use commands::{LogReport, ReportArgs};
use report::{OutputFormat, SortKey};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// A Rust CLI tool that parses operational log files and reports
/// per-endpoint, per-query and per-test statistics.
#[derive(Parser, Debug)]
#[command(name = "logtally", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Extra logging (rejected lines, resolved settings)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count HTTP requests per method and normalized path
    Requests {
        /// Log file, or - for stdin
        file: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Response time statistics per method and normalized path
    RequestTimes {
        file: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
        /// Statistic to sort by
        #[arg(long, value_enum)]
        sort_by: Option<SortKey>,
    },
    /// Count SQL statements by query text
    Sql {
        file: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Test duration statistics per test
    Tests {
        file: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
        /// List every run instead of per-test statistics
        #[arg(long)]
        runs: bool,
        /// Statistic to sort by
        #[arg(long, value_enum)]
        sort_by: Option<SortKey>,
    },
    /// Count log lines per severity level
    Levels {
        file: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Count syslog lines per service
    Services {
        file: PathBuf,
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Consolidate database operation counts from a performance report
    DbOps {
        /// Performance report (JSON), or - for stdin
        file: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn run(cli: Cli) -> Result<(), String> {
    // The config file is only required when named explicitly.
    let explicit = cli.config.as_os_str() != config::DEFAULT_CONFIG_FILE;
    let cfg = config::load_config(&cli.config, explicit).map_err(|e| e.to_string())?;
    tracing::debug!(?cfg, "loaded config");
    cfg.patterns.validate().map_err(|e| e.to_string())?;

    let format = cli.format;
    match cli.command {
        Commands::Requests { file, report } => commands::handle_log_report(
            LogReport::Requests,
            &file,
            &cfg,
            &report,
            None,
            format,
        ),
        Commands::RequestTimes {
            file,
            report,
            sort_by,
        } => commands::handle_log_report(
            LogReport::RequestTimes,
            &file,
            &cfg,
            &report,
            sort_by,
            format,
        ),
        Commands::Sql { file, report } => {
            commands::handle_log_report(LogReport::Sql, &file, &cfg, &report, None, format)
        }
        Commands::Tests {
            file,
            report,
            runs,
            sort_by,
        } => commands::handle_log_report(
            LogReport::Tests { runs },
            &file,
            &cfg,
            &report,
            sort_by,
            format,
        ),
        Commands::Levels { file, report } => {
            commands::handle_log_report(LogReport::Levels, &file, &cfg, &report, None, format)
        }
        Commands::Services { file, report } => {
            commands::handle_log_report(LogReport::Services, &file, &cfg, &report, None, format)
        }
        Commands::DbOps { file } => commands::handle_db_ops(&file, format),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "logtally",
            "request-times",
            "api.log",
            "--sort-by",
            "median",
            "--limit",
            "5",
            "--format",
            "json",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::RequestTimes {
                file,
                report,
                sort_by,
            } => {
                assert_eq!(file, PathBuf::from("api.log"));
                assert_eq!(report.limit, Some(5));
                assert_eq!(sort_by, Some(SortKey::Median));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn tests_subcommand_runs_flag() {
        let cli = Cli::try_parse_from(["logtally", "tests", "-", "--runs", "--asc"]).unwrap();
        match cli.command {
            Commands::Tests { file, report, runs, .. } => {
                assert_eq!(file, PathBuf::from("-"));
                assert!(runs);
                assert!(report.asc);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::try_parse_from(["logtally", "db-ops", "perf.json"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(config::DEFAULT_CONFIG_FILE));
        assert_eq!(cli.format, OutputFormat::Table);
    }

    #[test]
    fn broken_pattern_override_fails_before_reading_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logtally.toml");
        std::fs::write(&path, "[patterns]\nsystemd_sql = '(?P<sql_query>'\n").unwrap();
        let cli = Cli::try_parse_from([
            "logtally",
            "--config",
            path.to_str().unwrap(),
            "levels",
            "/nonexistent/service.log",
        ])
        .unwrap();
        let err = run(cli).unwrap_err();
        assert!(err.contains("systemd-sql"), "{err}");
    }

    #[test]
    fn explicit_missing_config_fails() {
        let cli = Cli::try_parse_from([
            "logtally",
            "--config",
            "/nonexistent/logtally-custom.toml",
            "db-ops",
            "perf.json",
        ])
        .unwrap();
        let err = run(cli).unwrap_err();
        assert!(err.contains("logtally-custom.toml"));
    }
}
