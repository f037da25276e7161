//! Input reading: feed a log file (or stdin) into an analyzer line by line,
//! and load database-operation rows from a performance report.

use crate::dbops::{self, DbOpRow};
use crate::pipeline::Analyzer;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};

/// Path that selects standard input.
pub const STDIN_PATH: &str = "-";

#[derive(Debug)]
pub enum IngestError {
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    Read {
        line: u64,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    NoDbData {
        path: PathBuf,
    },
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Open { path, source } => {
                write!(f, "cannot open {}: {source}", path.display())
            }
            IngestError::Read { line, source } => {
                write!(f, "read error after line {line}: {source}")
            }
            IngestError::Json { path, source } => {
                write!(f, "invalid performance report {}: {source}", path.display())
            }
            IngestError::NoDbData { path } => {
                write!(f, "no DB data found in {}", path.display())
            }
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Open { source, .. } | IngestError::Read { source, .. } => Some(source),
            IngestError::Json { source, .. } => Some(source),
            IngestError::NoDbData { .. } => None,
        }
    }
}

/// Open a path for line reading; `-` reads stdin.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>, IngestError> {
    if path.as_os_str() == STDIN_PATH {
        return Ok(Box::new(std::io::stdin().lock()));
    }
    let file = std::fs::File::open(path).map_err(|e| IngestError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Box::new(std::io::BufReader::new(file)))
}

/// Feed every line of `reader` to the analyzer.
///
/// Lines are split on `\n` with a trailing `\r` removed. Invalid UTF-8 is
/// replaced rather than failing the run; such a line simply won't match.
pub fn feed_reader<R: BufRead>(mut reader: R, analyzer: &mut Analyzer<'_>) -> Result<(), IngestError> {
    let mut buf = Vec::new();
    let mut line_no = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| IngestError::Read {
                line: line_no,
                source: e,
            })?;
        if n == 0 {
            break;
        }
        line_no += 1;

        let mut bytes = buf.as_slice();
        if let Some(rest) = bytes.strip_suffix(b"\n") {
            bytes = rest;
        }
        if let Some(rest) = bytes.strip_suffix(b"\r") {
            bytes = rest;
        }
        analyzer.feed(&String::from_utf8_lossy(bytes));
    }
    Ok(())
}

/// Open `path` and feed all of its lines to the analyzer.
pub fn feed_path(path: &Path, analyzer: &mut Analyzer<'_>) -> Result<(), IngestError> {
    let reader = open_input(path)?;
    tracing::debug!(path = %path.display(), "reading input");
    feed_reader(reader, analyzer)?;
    let lines = analyzer.lines();
    tracing::debug!(
        path = %path.display(),
        total = lines.total,
        unmatched = lines.unmatched,
        "finished input"
    );
    Ok(())
}

/// Load the `db` rows of a JSON performance report.
pub fn load_db_rows(path: &Path) -> Result<Vec<DbOpRow>, IngestError> {
    let mut reader = open_input(path)?;
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| IngestError::Read { line: 0, source: e })?;
    dbops::parse_performance_report(&text)
        .map_err(|e| IngestError::Json {
            path: path.to_path_buf(),
            source: e,
        })?
        .ok_or_else(|| IngestError::NoDbData {
            path: path.to_path_buf(),
        })
}
