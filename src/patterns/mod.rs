pub mod grammar;

use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Sentinel for an optional status token that the line did not carry.
pub const STATUS_NONE: &str = "NONE";

/// The built-in line grammars. Exactly one is active per run, chosen by the
/// caller; lines are never auto-detected against several families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternFamily {
    /// Service logs with an ISO date, optional pid and a status level.
    Generic,
    /// Classic syslog lines: date, host, service.
    Syslog,
    /// HTTP access lines emitted through systemd/journald.
    SystemdHttp,
    /// SQLAlchemy engine statements emitted through systemd/journald.
    SystemdSql,
    /// Concurrent test-runner result lines.
    TestRunner,
}

impl PatternFamily {
    pub const ALL: [PatternFamily; 5] = [
        PatternFamily::Generic,
        PatternFamily::Syslog,
        PatternFamily::SystemdHttp,
        PatternFamily::SystemdSql,
        PatternFamily::TestRunner,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PatternFamily::Generic => "generic",
            PatternFamily::Syslog => "syslog",
            PatternFamily::SystemdHttp => "systemd-http",
            PatternFamily::SystemdSql => "systemd-sql",
            PatternFamily::TestRunner => "test-runner",
        }
    }

    /// Fields that must capture for a line to count as a match.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            PatternFamily::Generic => &["date", "status"],
            PatternFamily::Syslog => &["date", "host", "service"],
            PatternFamily::SystemdHttp => &["method", "uri"],
            PatternFamily::SystemdSql => &["sql_query"],
            PatternFamily::TestRunner => &["worker", "test_name", "test_time", "test_result"],
        }
    }

    /// Regex source of the built-in grammar.
    pub fn source(self) -> String {
        match self {
            PatternFamily::Generic => grammar::generic(),
            PatternFamily::Syslog => grammar::syslog(),
            PatternFamily::SystemdHttp => grammar::systemd_http(),
            PatternFamily::SystemdSql => grammar::systemd_sql(),
            PatternFamily::TestRunner => grammar::test_runner(),
        }
    }

    /// Compile the built-in grammar.
    pub fn compile(self) -> Result<LogPattern, PatternError> {
        self.compile_from(&self.source())
    }

    /// Compile a replacement grammar for this family.
    ///
    /// The replacement must still expose every required field of the family
    /// as a named capture group.
    pub fn compile_from(self, source: &str) -> Result<LogPattern, PatternError> {
        let pattern = LogPattern::new(self.name(), source, self.required_fields())?;
        if pattern.fields().iter().any(|f| f == "status") {
            pattern.with_default("status", STATUS_NONE)
        } else {
            Ok(pattern)
        }
    }
}

impl fmt::Display for PatternFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors produced while building a [`LogPattern`].
#[derive(Debug)]
pub enum PatternError {
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
    UnknownField {
        pattern: String,
        field: String,
    },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::InvalidRegex { pattern, source } => {
                write!(f, "invalid regex for pattern '{pattern}': {source}")
            }
            PatternError::UnknownField { pattern, field } => {
                write!(
                    f,
                    "pattern '{pattern}' has no capture group named '{field}'"
                )
            }
        }
    }
}

impl std::error::Error for PatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatternError::InvalidRegex { source, .. } => Some(source),
            PatternError::UnknownField { .. } => None,
        }
    }
}

/// Fields extracted from one line. Values are raw text; coercion happens in
/// the record builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    fields: HashMap<String, String>,
}

impl MatchResult {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MatchResult {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut result = MatchResult::default();
        for (k, v) in iter {
            result.insert(k, v);
        }
        result
    }
}

/// A compiled, immutable line grammar with named fields.
///
/// Matching is anchored at the start of the line whether or not the source
/// says `^`. It is single-candidate and line-local: the first match is
/// authoritative.
#[derive(Debug, Clone)]
pub struct LogPattern {
    name: String,
    regex: Regex,
    fields: Vec<String>,
    required: Vec<String>,
    defaults: Vec<(String, String)>,
}

impl LogPattern {
    pub fn new(
        name: impl Into<String>,
        source: &str,
        required: &[&str],
    ) -> Result<Self, PatternError> {
        let name = name.into();
        let anchored = format!("^(?:{source})");
        let regex = Regex::new(&anchored).map_err(|e| PatternError::InvalidRegex {
            pattern: name.clone(),
            source: e,
        })?;
        let fields: Vec<String> = regex.capture_names().flatten().map(String::from).collect();

        for field in required {
            if !fields.iter().any(|f| f == field) {
                return Err(PatternError::UnknownField {
                    pattern: name,
                    field: field.to_string(),
                });
            }
        }

        Ok(Self {
            name,
            regex,
            fields,
            required: required.iter().map(|f| f.to_string()).collect(),
            defaults: Vec::new(),
        })
    }

    /// Value reported for `field` when its (optional) group did not capture.
    pub fn with_default(
        mut self,
        field: &str,
        value: impl Into<String>,
    ) -> Result<Self, PatternError> {
        if !self.fields.iter().any(|f| f == field) {
            return Err(PatternError::UnknownField {
                pattern: self.name,
                field: field.to_string(),
            });
        }
        self.defaults.push((field.to_string(), value.into()));
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Match one line. Returns `None` when the grammar does not match or a
    /// required field did not capture.
    pub fn match_line(&self, line: &str) -> Option<MatchResult> {
        let caps = self.regex.captures(line)?;

        if self.required.iter().any(|f| caps.name(f).is_none()) {
            return None;
        }

        let mut result = MatchResult::default();
        for field in &self.fields {
            match caps.name(field) {
                Some(m) => result.insert(field.as_str(), m.as_str()),
                None => {
                    if let Some((_, value)) = self.defaults.iter().find(|(f, _)| f == field) {
                        result.insert(field.as_str(), value.as_str());
                    }
                }
            }
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTTP_LINE: &str = r#"Jan  1 00:00:01 host svc[123]: INFO "GET /v1/items/550e8400-e29b-41d4-a716-446655440000 HTTP/1.1" status: 200  len: 10 time: 0.050"#;

    #[test]
    fn every_builtin_family_compiles() {
        for family in PatternFamily::ALL {
            let pattern = family.compile().unwrap();
            assert_eq!(pattern.name(), family.name());
            for field in family.required_fields() {
                assert!(pattern.fields().iter().any(|f| f == field));
            }
        }
    }

    #[test]
    fn systemd_http_extracts_fields() {
        let pattern = PatternFamily::SystemdHttp.compile().unwrap();
        let m = pattern.match_line(HTTP_LINE).unwrap();
        assert_eq!(m.get("date"), Some("Jan  1 00:00:01"));
        assert_eq!(m.get("host"), Some("host"));
        assert_eq!(m.get("status"), Some("INFO"));
        assert_eq!(m.get("method"), Some("GET"));
        assert_eq!(
            m.get("uri"),
            Some("/v1/items/550e8400-e29b-41d4-a716-446655440000")
        );
        assert_eq!(m.get("resp_status"), Some("200"));
        assert_eq!(m.get("resp_len"), Some("10"));
        assert_eq!(m.get("resp_time"), Some("0.050"));
    }

    #[test]
    fn systemd_http_missing_status_gets_sentinel() {
        let pattern = PatternFamily::SystemdHttp.compile().unwrap();
        let line = r#"Jan 12 10:00:01 ctl api[9]: 10.0.0.1 "POST /v1/things HTTP/1.1" status: 201  len: 3 time: 0.1"#;
        let m = pattern.match_line(line).unwrap();
        assert_eq!(m.get("status"), Some(STATUS_NONE));
        assert_eq!(m.get("method"), Some("POST"));
    }

    #[test]
    fn systemd_http_keeps_query_string_in_uri() {
        let pattern = PatternFamily::SystemdHttp.compile().unwrap();
        let line = r#"Jan  1 00:00:01 host svc[1]: INFO "GET /v1/items?limit=5 HTTP/1.1" status: 200  len: 10 time: 0.050"#;
        let m = pattern.match_line(line).unwrap();
        assert_eq!(m.get("uri"), Some("/v1/items?limit=5"));
    }

    #[test]
    fn unrelated_lines_do_not_match() {
        let pattern = PatternFamily::SystemdHttp.compile().unwrap();
        assert!(pattern.match_line("").is_none());
        assert!(pattern
            .match_line("Jan  1 00:00:01 host svc[123]: INFO starting worker")
            .is_none());
        // Anchored at the start of the line.
        assert!(pattern.match_line(&format!("junk {HTTP_LINE}")).is_none());
    }

    #[test]
    fn unsupported_method_does_not_match() {
        let pattern = PatternFamily::SystemdHttp.compile().unwrap();
        let line = HTTP_LINE.replace("\"GET ", "\"PATCH ");
        assert!(pattern.match_line(&line).is_none());
    }

    #[test]
    fn systemd_sql_captures_statement() {
        let pattern = PatternFamily::SystemdSql.compile().unwrap();
        let line = "Feb  3 11:22:33 db-host api[42]: INFO sqlalchemy.engine.Engine [cached since 3.1s ago] UPDATE volumes SET status=%(status)s WHERE volumes.id = %(id)s";
        let m = pattern.match_line(line).unwrap();
        assert_eq!(
            m.get("sql_query"),
            Some("UPDATE volumes SET status=%(status)s WHERE volumes.id = %(id)s")
        );
    }

    #[test]
    fn systemd_sql_ignores_select() {
        let pattern = PatternFamily::SystemdSql.compile().unwrap();
        let line = "Feb  3 11:22:33 db-host api[42]: INFO sqlalchemy.engine.Engine [generated in 0.001s] SELECT 1";
        assert!(pattern.match_line(line).is_none());
    }

    #[test]
    fn test_runner_captures_result() {
        let pattern = PatternFamily::TestRunner.compile().unwrap();
        let line = "2024-05-01 12:00:00.123 | ci-node | {3} test_foo [1.234s] ... SUCCESS";
        let m = pattern.match_line(line).unwrap();
        assert_eq!(m.get("worker"), Some("3"));
        assert_eq!(m.get("test_name"), Some("test_foo"));
        assert_eq!(m.get("test_time"), Some("1.234"));
        assert_eq!(m.get("test_result"), Some("SUCCESS"));
        assert_eq!(m.get("date"), Some("2024-05-01 12:00:00.123"));
    }

    #[test]
    fn generic_optional_pid() {
        let pattern = PatternFamily::Generic.compile().unwrap();
        let with_pid = pattern
            .match_line("2024-05-01 12:00:00.123 4242 ERROR nova.compute [-] boom")
            .unwrap();
        assert_eq!(with_pid.get("pid"), Some("4242"));
        assert_eq!(with_pid.get("status"), Some("ERROR"));

        let without_pid = pattern
            .match_line("2024-05-01 12:00:00,123456 WARNING nova.compute [-] hmm")
            .unwrap();
        assert_eq!(without_pid.get("pid"), None);
        assert_eq!(without_pid.get("status"), Some("WARNING"));
    }

    #[test]
    fn generic_requires_status() {
        let pattern = PatternFamily::Generic.compile().unwrap();
        assert!(pattern
            .match_line("2024-05-01 12:00:00 4242 NOTICE something")
            .is_none());
    }

    #[test]
    fn syslog_captures_service() {
        let pattern = PatternFamily::Syslog.compile().unwrap();
        let m = pattern
            .match_line("Mar 10 08:00:00 web-01 cron: job finished")
            .unwrap();
        assert_eq!(m.get("host"), Some("web-01"));
        assert_eq!(m.get("service"), Some("cron"));
    }

    #[test]
    fn custom_pattern_requires_known_fields() {
        let err = LogPattern::new("custom", r"^(?P<a>\w+)", &["b"]).unwrap_err();
        assert!(matches!(err, PatternError::UnknownField { ref field, .. } if field == "b"));
    }

    #[test]
    fn custom_pattern_rejects_bad_regex() {
        let err = LogPattern::new("custom", r"^(?P<a>\w+", &[]).unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));
        assert!(err.to_string().contains("custom"));
    }

    #[test]
    fn required_field_missing_from_capture_is_no_match() {
        let pattern = LogPattern::new("custom", r"^(?P<a>x)?(?P<b>y)", &["a", "b"]).unwrap();
        assert!(pattern.match_line("xy").is_some());
        assert!(pattern.match_line("y").is_none());
    }

    #[test]
    fn default_applies_only_to_absent_optional_field() {
        let pattern = LogPattern::new("custom", r"^(?P<a>x)?(?P<b>y)", &["b"])
            .unwrap()
            .with_default("a", "missing")
            .unwrap();
        assert_eq!(pattern.match_line("y").unwrap().get("a"), Some("missing"));
        assert_eq!(pattern.match_line("xy").unwrap().get("a"), Some("x"));
    }

    #[test]
    fn unanchored_override_still_matches_from_line_start() {
        let pattern = PatternFamily::SystemdSql
            .compile_from(r"SQL: (?P<sql_query>.+)$")
            .unwrap();
        assert!(pattern.match_line("garbage prefix SQL: INSERT x").is_none());
        assert_eq!(
            pattern.match_line("SQL: INSERT x").unwrap().get("sql_query"),
            Some("INSERT x")
        );
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let pattern = LogPattern::new("custom", r"(?P<a>x)|(?P<b>y)", &[]).unwrap();
        assert!(pattern.match_line("ay").is_none());
        assert!(pattern.match_line("yx").is_some());
    }

    #[test]
    fn family_override_must_keep_required_fields() {
        let err = PatternFamily::SystemdSql
            .compile_from(r"^(?P<query>.*)$")
            .unwrap_err();
        assert!(matches!(err, PatternError::UnknownField { .. }));
    }
}
