//! Report types for consistency checks.

use serde::Serialize;

/// Source and destination row counts of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub source: i64,
    pub target: i64,
    /// Set when either side could not be counted; such a table never matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableCount {
    pub fn matches(&self) -> bool {
        self.error.is_none() && self.source == self.target
    }
}

/// Row counts of every table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CountReport {
    pub tables: Vec<TableCount>,
}

impl CountReport {
    /// Tables whose counts differ.
    pub fn mismatches(&self) -> Vec<&TableCount> {
        self.tables.iter().filter(|t| !t.matches()).collect()
    }

    pub fn is_consistent(&self) -> bool {
        self.tables.iter().all(TableCount::matches)
    }
}

/// Why a source row has no faithful copy in the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchKind {
    /// No destination row with this id.
    Missing,
    /// Both rows exist but these columns differ.
    Different { fields: Vec<String> },
    /// The source row does not validate.
    InvalidSource { message: String },
    /// The destination row does not validate.
    InvalidTarget { message: String },
    /// The source table could not be read; the rest of it was not compared.
    Unreadable { message: String },
}

/// One inconsistent row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowMismatch {
    pub table: String,
    /// Source id cell as text (may not be a valid UUID for invalid rows,
    /// empty for an unreadable table).
    pub id: String,
    #[serde(flatten)]
    pub kind: MismatchKind,
}

/// Result of the per-row comparison.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetailReport {
    pub rows_checked: u64,
    pub mismatches: Vec<RowMismatch>,
}

impl DetailReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}
