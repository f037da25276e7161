//! Line grammars for the built-in pattern families.
//!
//! Each builder returns the regex source; compilation happens in
//! [`super::PatternFamily::compile`] so callers decide when to pay for it.

/// `Jan  1 00:00:01` with optional `.123` / `,123456` fraction.
pub const SYSLOG_DATE: &str = r"\w+\s+\d+\s+\d{2}:\d{2}:\d{2}(?:[.,]\d{3,6})?";

/// `2024-01-01 00:00:01` with optional `.123` / `,123456` fraction.
pub const ISO_DATE: &str = r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:[.,]\d{3,6})?";

pub const STATUS: &str = "DEBUG|INFO|WARNING|ERROR|TRACE|AUDIT|CRITICAL";

pub const HTTP_METHOD: &str = "GET|POST|PUT|DELETE";

/// SQL statements the engine logs at INFO level that are worth counting.
pub const SQL_STATEMENT: &str = "INSERT|UPDATE|DELETE|ROLLBACK";

/// `2024-01-01 00:00:01.123 12345 INFO some.module [-] message`
pub fn generic() -> String {
    format!(r"^(?P<date>{ISO_DATE})(?P<line>(?: (?P<pid>\d+))? (?P<status>{STATUS}).*)")
}

/// `Jan  1 00:00:01 host-1 service: message`
pub fn syslog() -> String {
    format!(r"^(?P<date>{SYSLOG_DATE})(?P<line> (?P<host>[\w-]+) (?P<service>[^\[\s]+):.*)")
}

/// `Jan  1 00:00:01 host unit[123]: INFO ... "GET /uri HTTP/1.1" status: 200  len: 10 time: 0.050`
pub fn systemd_http() -> String {
    format!(
        r#"^(?P<date>{SYSLOG_DATE})(?P<line> (?P<host>\S+) \S+\[\d+\]: (?P<status>{STATUS})?.* "(?P<method>{HTTP_METHOD}) (?P<uri>.+) HTTP/1\.1" status: (?P<resp_status>\d+)  len: (?P<resp_len>\d+) time: (?P<resp_time>\S+))"#
    )
}

/// `Jan  1 00:00:01 host unit[123]: INFO sqlalchemy.engine.Engine [cached since 1s ago] INSERT INTO ...`
pub fn systemd_sql() -> String {
    format!(
        r"^(?P<date>{SYSLOG_DATE})(?P<line> (?P<host>\S+) \S+\[\d+\]: INFO sqlalchemy\.engine\.Engine \[.*\] (?P<sql_query>(?:{SQL_STATEMENT}).*))$"
    )
}

/// `2024-01-01 00:00:01.123 | host | {3} tests.unit.test_foo [1.234s] ... ok`
pub fn test_runner() -> String {
    format!(
        r"^(?P<date>{ISO_DATE}) \| (?P<host>\S+) \| \{{(?P<worker>\d+)\}} (?P<test_name>\S+) \[(?P<test_time>\d+\.\d+)s\] \.\.\. (?P<test_result>\S+)"
    )
}
