//! Typed records built from matched fields.

use crate::normalize::normalize_path;
use crate::patterns::{MatchResult, PatternFamily, STATUS_NONE};
use serde::Serialize;
use std::fmt;

/// Which kind of record a run produces. Chosen by the caller together with
/// the active pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Http,
    Sql,
    Test,
    Severity,
    Service,
}

impl Domain {
    /// The pattern family whose fields this domain consumes.
    pub fn family(self) -> PatternFamily {
        match self {
            Domain::Http => PatternFamily::SystemdHttp,
            Domain::Sql => PatternFamily::SystemdSql,
            Domain::Test => PatternFamily::TestRunner,
            Domain::Severity => PatternFamily::Generic,
            Domain::Service => PatternFamily::Syslog,
        }
    }
}

/// One unit of work extracted from a log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Http {
        method: String,
        normalized_path: String,
        response_status: Option<u16>,
        response_length: Option<u64>,
        response_time: Option<f64>,
        timestamp: Option<String>,
    },
    Sql {
        query_text: String,
        timestamp: Option<String>,
    },
    Test {
        test_name: String,
        worker_id: u32,
        result: String,
        duration_seconds: f64,
        timestamp: Option<String>,
    },
    Severity {
        status: String,
        timestamp: Option<String>,
    },
    Service {
        host: String,
        service: String,
        timestamp: Option<String>,
    },
}

impl Record {
    /// The string records are bucketed by. Equal keys aggregate together.
    pub fn group_key(&self) -> String {
        match self {
            Record::Http {
                method,
                normalized_path,
                ..
            } => format!("{method} {normalized_path}"),
            Record::Sql { query_text, .. } => query_text.clone(),
            Record::Test { test_name, .. } => test_name.clone(),
            Record::Severity { status, .. } => status.clone(),
            Record::Service { service, .. } => service.clone(),
        }
    }

    /// The numeric sample statistical aggregation uses, if the record has one.
    pub fn sample(&self) -> Option<f64> {
        match self {
            Record::Http { response_time, .. } => *response_time,
            Record::Test {
                duration_seconds, ..
            } => Some(*duration_seconds),
            Record::Sql { .. } | Record::Severity { .. } | Record::Service { .. } => None,
        }
    }
}

/// Why a matched line was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingField(&'static str),
    Coercion { field: &'static str, value: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingField(field) => write!(f, "missing field '{field}'"),
            Rejection::Coercion { field, value } => {
                write!(f, "field '{field}' is not a number: {value:?}")
            }
        }
    }
}

impl std::error::Error for Rejection {}

fn required<'m>(m: &'m MatchResult, field: &'static str) -> Result<&'m str, Rejection> {
    m.get(field).ok_or(Rejection::MissingField(field))
}

fn coerce_float(field: &'static str, value: &str) -> Result<f64, Rejection> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(Rejection::Coercion {
            field,
            value: value.to_string(),
        }),
    }
}

fn coerce_int<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, Rejection> {
    value.parse::<T>().map_err(|_| Rejection::Coercion {
        field,
        value: value.to_string(),
    })
}

/// Coerce an optional field. Absent or unusable values are `None`.
fn optional<T>(
    m: &MatchResult,
    field: &'static str,
    coerce: impl Fn(&'static str, &str) -> Result<T, Rejection>,
) -> Option<T> {
    let value = m.get(field)?;
    match coerce(field, value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!("treating as absent: {e}");
            None
        }
    }
}

/// Build a record of the given domain from a match.
///
/// Required numeric fields fail closed: a value that does not parse (or
/// parses to NaN/infinity) rejects the whole line. The optional HTTP
/// status, length and time degrade to `None` instead, so a request with a
/// `-` time is still counted; statistical mode then rejects it for lacking
/// a sample.
pub fn build(m: &MatchResult, domain: Domain) -> Result<Record, Rejection> {
    let timestamp = m.get("date").map(String::from);
    match domain {
        Domain::Http => Ok(Record::Http {
            method: required(m, "method")?.to_string(),
            normalized_path: normalize_path(required(m, "uri")?),
            response_status: optional(m, "resp_status", coerce_int::<u16>),
            response_length: optional(m, "resp_len", coerce_int::<u64>),
            response_time: optional(m, "resp_time", coerce_float),
            timestamp,
        }),
        Domain::Sql => Ok(Record::Sql {
            query_text: required(m, "sql_query")?.to_string(),
            timestamp,
        }),
        Domain::Test => Ok(Record::Test {
            test_name: required(m, "test_name")?.to_string(),
            worker_id: coerce_int("worker", required(m, "worker")?)?,
            result: required(m, "test_result")?.to_string(),
            duration_seconds: coerce_float("test_time", required(m, "test_time")?)?,
            timestamp,
        }),
        Domain::Severity => Ok(Record::Severity {
            status: m.get("status").unwrap_or(STATUS_NONE).to_string(),
            timestamp,
        }),
        Domain::Service => Ok(Record::Service {
            host: required(m, "host")?.to_string(),
            service: required(m, "service")?.to_string(),
            timestamp,
        }),
    }
}
