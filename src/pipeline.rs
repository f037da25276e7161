//! Line → match → record → aggregate.

use crate::aggregate::{Aggregator, Mode, Summary};
use crate::patterns::LogPattern;
use crate::record::{self, Domain, Record};
use serde::Serialize;
use std::collections::HashMap;

/// Per-run line accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineStats {
    pub total: u64,
    /// Lines that produced a record and were aggregated.
    pub matched: u64,
    /// Lines the active pattern does not describe. Expected, not errors.
    pub unmatched: u64,
    /// Lines that matched but were dropped (missing field, bad number).
    pub rejected: u64,
}

/// Result of one pass over an input.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub mode: Mode,
    pub groups: HashMap<String, Summary>,
    pub lines: LineStats,
    /// Every aggregated record, in input order, when retention was requested.
    pub records: Vec<Record>,
}

impl Analysis {
    /// Sum of occurrence counts over all groups.
    pub fn total_count(&self) -> u64 {
        self.groups.values().map(|s| s.count).sum()
    }
}

/// Single-pass analyzer over the lines of one input.
pub struct Analyzer<'p> {
    pattern: &'p LogPattern,
    domain: Domain,
    aggregator: Aggregator,
    lines: LineStats,
    records: Option<Vec<Record>>,
}

impl<'p> Analyzer<'p> {
    pub fn new(pattern: &'p LogPattern, domain: Domain, mode: Mode) -> Self {
        tracing::debug!(
            pattern = pattern.name(),
            fields = ?pattern.fields(),
            required = ?pattern.required(),
            ?mode,
            "starting analysis"
        );
        Self {
            pattern,
            domain,
            aggregator: Aggregator::new(mode),
            lines: LineStats::default(),
            records: None,
        }
    }

    /// Keep every aggregated record alongside the aggregates.
    pub fn retain_records(mut self) -> Self {
        self.records = Some(Vec::new());
        self
    }

    pub fn lines(&self) -> LineStats {
        self.lines
    }

    /// Process one line. Per-line failures are recorded and never abort.
    pub fn feed(&mut self, line: &str) {
        self.lines.total += 1;

        let Some(fields) = self.pattern.match_line(line) else {
            self.lines.unmatched += 1;
            tracing::trace!(line = self.lines.total, "no match");
            return;
        };

        let record = match record::build(&fields, self.domain) {
            Ok(r) => r,
            Err(e) => {
                self.lines.rejected += 1;
                tracing::debug!(line = self.lines.total, "rejected: {e}");
                return;
            }
        };

        let key = record.group_key();
        if let Err(e) = self.aggregator.add(&key, record.sample()) {
            self.lines.rejected += 1;
            tracing::debug!(line = self.lines.total, "rejected: {e}");
            return;
        }

        self.lines.matched += 1;
        if let Some(records) = self.records.as_mut() {
            records.push(record);
        }
    }

    pub fn finish(self) -> Analysis {
        tracing::info!(
            pattern = self.pattern.name(),
            total = self.lines.total,
            matched = self.lines.matched,
            unmatched = self.lines.unmatched,
            rejected = self.lines.rejected,
            groups = self.aggregator.len(),
            "analysis complete"
        );
        Analysis {
            mode: self.aggregator.mode(),
            groups: self.aggregator.finalize(),
            lines: self.lines,
            records: self.records.unwrap_or_default(),
        }
    }
}
