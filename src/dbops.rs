//! Consolidation of pre-aggregated database operation counts.
//!
//! Input rows (`{"db": "nova", "op": "INSERT", "count": 5}`) are summed per
//! database and operation kind. Every row is mirrored into the synthetic
//! [`ALL_DBS`] database, and every database carries an [`ALL_OPERATIONS`]
//! total across kinds.

use crate::aggregate::Aggregator;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Pseudo-database accumulating every row.
pub const ALL_DBS: &str = "all_dbs";

/// Per-database total across operation kinds.
pub const ALL_OPERATIONS: &str = "ALL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
    Rollback,
    Release,
    Savepoint,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Select,
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::Rollback,
        OperationKind::Release,
        OperationKind::Savepoint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Select => "SELECT",
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Rollback => "ROLLBACK",
            OperationKind::Release => "RELEASE",
            OperationKind::Savepoint => "SAVEPOINT",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row that could not be consolidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    UnknownOperation(String),
    ReservedDatabase,
    /// The count would overflow a running total.
    Overflow,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::UnknownOperation(op) => write!(f, "unknown database operation '{op}'"),
            RowError::ReservedDatabase => {
                write!(f, "database name '{ALL_DBS}' is reserved for the all-databases total")
            }
            RowError::Overflow => write!(f, "count overflows the consolidated totals"),
        }
    }
}

impl std::error::Error for RowError {}

impl FromStr for OperationKind {
    type Err = RowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RowError::UnknownOperation(s.to_string()))
    }
}

/// One pre-aggregated row of a performance report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbOpRow {
    pub db: String,
    pub op: String,
    pub count: u64,
}

#[derive(Debug, Deserialize)]
struct PerformanceReport {
    #[serde(default)]
    db: Option<Vec<DbOpRow>>,
}

/// Extract the `db` rows from a performance report document.
///
/// Returns `Ok(None)` when the document has no (or an empty) `db` section.
pub fn parse_performance_report(text: &str) -> Result<Option<Vec<DbOpRow>>, serde_json::Error> {
    let report: PerformanceReport = serde_json::from_str(text)?;
    Ok(report.db.filter(|rows| !rows.is_empty()))
}

/// Operation counts per database, plus the all-databases aggregate.
#[derive(Debug, Clone)]
pub struct Consolidation {
    databases: HashMap<String, Aggregator>,
    all_dbs: Aggregator,
    rejected: u64,
}

impl Default for Consolidation {
    fn default() -> Self {
        Self::new()
    }
}

impl Consolidation {
    /// The all-databases aggregate starts with every kind at zero so it always
    /// reports a full row.
    pub fn new() -> Self {
        let mut all_dbs = Aggregator::counting();
        for kind in OperationKind::ALL {
            all_dbs.ensure(kind.as_str());
        }
        all_dbs.ensure(ALL_OPERATIONS);
        Self {
            databases: HashMap::new(),
            all_dbs,
            rejected: 0,
        }
    }

    /// Add `count` to `db`/`op` and to every total it feeds. Either all four
    /// counters move or none do.
    pub fn add(&mut self, db: &str, op: OperationKind, count: u64) -> Result<(), RowError> {
        // The grand total bounds every other counter.
        let grand_total = self.count(ALL_DBS, ALL_OPERATIONS).unwrap_or(0);
        if grand_total.checked_add(count).is_none() {
            return Err(RowError::Overflow);
        }
        let per_db = self
            .databases
            .entry(db.to_string())
            .or_insert_with(Aggregator::counting);
        for agg in [per_db, &mut self.all_dbs] {
            agg.add_count(op.as_str(), count)
                .and_then(|()| agg.add_count(ALL_OPERATIONS, count))
                .map_err(|_| RowError::Overflow)?;
        }
        Ok(())
    }

    /// Add one input row. A bad row is counted and skipped; it never aborts
    /// the batch.
    pub fn add_row(&mut self, row: &DbOpRow) -> Result<(), RowError> {
        let result = if row.db == ALL_DBS {
            Err(RowError::ReservedDatabase)
        } else {
            row.op
                .parse::<OperationKind>()
                .and_then(|op| self.add(&row.db, op, row.count))
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                self.rejected += 1;
                tracing::warn!(db = %row.db, op = %row.op, count = row.count, "skipping row: {e}");
                Err(e)
            }
        }
    }

    /// Count for `column` (an operation name or [`ALL_OPERATIONS`]) in `db`
    /// (a database name or [`ALL_DBS`]). `None` when the database never saw
    /// that operation.
    pub fn count(&self, db: &str, column: &str) -> Option<u64> {
        let agg = if db == ALL_DBS {
            Some(&self.all_dbs)
        } else {
            self.databases.get(db)
        };
        agg.and_then(|a| a.get(column)).map(|b| b.count())
    }

    /// Real database names, sorted.
    pub fn databases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.databases.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// The full mapping: database (and [`ALL_DBS`]) → column → count.
    pub fn table(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        let mut table: BTreeMap<String, BTreeMap<String, u64>> = self
            .databases
            .iter()
            .map(|(db, agg)| (db.clone(), agg.counts().into_iter().collect()))
            .collect();
        table.insert(
            ALL_DBS.to_string(),
            self.all_dbs.counts().into_iter().collect(),
        );
        table
    }
}

/// Consolidate a batch of rows in input order.
pub fn consolidate(rows: &[DbOpRow]) -> Consolidation {
    let mut consolidation = Consolidation::new();
    for row in rows {
        // Rejections are counted inside add_row.
        let _ = consolidation.add_row(row);
    }
    tracing::debug!(
        rows = rows.len(),
        databases = consolidation.databases.len(),
        rejected = consolidation.rejected,
        "consolidated database operations"
    );
    consolidation
}
