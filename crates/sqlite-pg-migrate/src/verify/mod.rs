//! Read-only consistency checks between the source and the destination.
//!
//! Two tiers:
//!
//! - counts: `SELECT COUNT(*)` on both sides for every table
//! - detail: every source row is looked up by id in the destination and
//!   compared field by field after validation on both sides

mod types;

pub use types::*;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::model::{EntityKind, Record, SqlValue};
use crate::source::SourceReader;
use crate::target::{DestinationReader, RowQuery};

/// Compares the two stores without writing to either.
pub struct ConsistencyChecker<'a, S, D> {
    source: &'a mut S,
    target: &'a mut D,
}

impl<'a, S: SourceReader, D: DestinationReader> ConsistencyChecker<'a, S, D> {
    pub fn new(source: &'a mut S, target: &'a mut D) -> Self {
        Self { source, target }
    }

    /// Row counts of every table; does not stop at the first difference
    /// or at a table that cannot be counted.
    pub async fn check_counts(&mut self) -> Result<CountReport> {
        let mut report = CountReport::default();
        for kind in EntityKind::DEPENDENCY_ORDER {
            let source = self.source.row_count(kind).await;
            let target = self.target.row_count(kind).await;
            let count = table_count(kind, source, target)?;
            if count.matches() {
                debug!("{}: {} rows on both sides", kind, count.source);
            } else if let Some(error) = &count.error {
                warn!("{}: cannot count rows: {}", kind, error);
            } else {
                warn!(
                    "{}: count mismatch (source {}, target {})",
                    kind, count.source, count.target
                );
            }
            report.tables.push(count);
        }
        Ok(report)
    }

    /// Compare every source row with the destination row of the same id.
    pub async fn check_detail(&mut self) -> Result<DetailReport> {
        let mut report = DetailReport::default();
        for kind in EntityKind::DEPENDENCY_ORDER {
            let before = report.mismatches.len();
            let mut rows = match self.source.open_table(kind).await {
                Ok(rows) => rows,
                Err(e) if e.is_table_scoped() => {
                    report.mismatches.push(unreadable(kind, &e));
                    warn!("{}: cannot read source table: {}", kind, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            while let Some(row) = rows.next().await {
                let row = match row {
                    Ok(row) => row,
                    Err(e) if e.is_table_scoped() => {
                        report.mismatches.push(unreadable(kind, &e));
                        warn!("{}: source read failed: {}", kind, e);
                        break;
                    }
                    Err(e) => return Err(e),
                };
                report.rows_checked += 1;
                if let Some(kind_mismatch) = compare_row(&mut *self.target, kind, &row).await? {
                    report.mismatches.push(RowMismatch {
                        table: kind.table().to_string(),
                        id: row.first().map(id_text).unwrap_or_default(),
                        kind: kind_mismatch,
                    });
                }
            }
            let found = report.mismatches.len() - before;
            if found > 0 {
                warn!("{}: {} rows differ", kind, found);
            }
        }
        info!(
            "Checked {} rows, {} mismatches",
            report.rows_checked,
            report.mismatches.len()
        );
        Ok(report)
    }
}

/// Counts of one table, keeping a table-scoped failure on either side as
/// the table's error; run-fatal errors propagate.
fn table_count(kind: EntityKind, source: Result<i64>, target: Result<i64>) -> Result<TableCount> {
    let mut count = TableCount {
        table: kind.table().to_string(),
        source: 0,
        target: 0,
        error: None,
    };
    let mut errors = Vec::new();
    for (side, result, slot) in [
        ("source", source, &mut count.source),
        ("target", target, &mut count.target),
    ] {
        match result {
            Ok(n) => *slot = n,
            Err(e) if e.is_table_scoped() => errors.push(format!("{}: {}", side, e)),
            Err(e) => return Err(e),
        }
    }
    if !errors.is_empty() {
        count.error = Some(errors.join("; "));
    }
    Ok(count)
}

fn unreadable(kind: EntityKind, err: &MigrateError) -> RowMismatch {
    RowMismatch {
        table: kind.table().to_string(),
        id: String::new(),
        kind: MismatchKind::Unreadable {
            message: err.to_string(),
        },
    }
}

fn id_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(s) => s.clone(),
        other => other
            .as_uuid()
            .map(|u| u.to_string())
            .unwrap_or_else(|_| other.to_string()),
    }
}

async fn compare_row<D: DestinationReader>(
    target: &mut D,
    kind: EntityKind,
    row: &[SqlValue],
) -> Result<Option<MismatchKind>> {
    let source = match Record::from_row(kind, row) {
        Ok(record) => record,
        Err(e) => {
            return Ok(Some(MismatchKind::InvalidSource {
                message: e.to_string(),
            }))
        }
    };

    let query = RowQuery::ById {
        kind,
        id: source.id(),
    };
    let Some(target_row) = target.read_one(&query).await? else {
        return Ok(Some(MismatchKind::Missing));
    };
    let target = match Record::from_row(kind, &target_row) {
        Ok(record) => record,
        Err(e) => {
            return Ok(Some(MismatchKind::InvalidTarget {
                message: e.to_string(),
            }))
        }
    };

    if source == target {
        return Ok(None);
    }
    let fields = kind
        .columns()
        .iter()
        .zip(source.to_row().iter().zip(target.to_row().iter()))
        .filter(|(_, (a, b))| a != b)
        .map(|(col, _)| col.to_string())
        .collect();
    Ok(Some(MismatchKind::Different { fields }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilmWork, FilmWorkType, Genre, Person};
    use crate::testing::{genre, MemoryDestination, MemorySource};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn film_work(n: u128, title: &str) -> Record {
        FilmWork {
            id: Uuid::from_u128(n),
            title: title.into(),
            description: None,
            creation_date: None,
            rating: Some(Decimal::new(70, 1)),
            r#type: FilmWorkType::TvShow,
        }
        .into()
    }

    #[tokio::test]
    async fn test_counts_report_every_table() {
        let records = vec![genre(1, "g1"), genre(2, "g2"), film_work(3, "fw")];
        let mut source = MemorySource::new().with_records(&records);
        let mut target = MemoryDestination::new();
        target.seed(genre(1, "g1"));

        let report = ConsistencyChecker::new(&mut source, &mut target)
            .check_counts()
            .await
            .unwrap();

        assert_eq!(report.tables.len(), 5);
        assert!(!report.is_consistent());
        let mismatched: Vec<&str> = report
            .mismatches()
            .iter()
            .map(|t| t.table.as_str())
            .collect();
        assert_eq!(mismatched, vec!["genre", "film_work"]);
    }

    #[tokio::test]
    async fn test_counts_match_after_copy() {
        let records = vec![genre(1, "g1"), film_work(3, "fw")];
        let mut source = MemorySource::new().with_records(&records);
        let mut target = MemoryDestination::new();
        for r in &records {
            target.seed(r.clone());
        }
        let report = ConsistencyChecker::new(&mut source, &mut target)
            .check_counts()
            .await
            .unwrap();
        assert!(report.is_consistent());
    }

    #[tokio::test]
    async fn test_detail_finds_missing_and_different() {
        let records = vec![genre(1, "g1"), genre(2, "g2"), film_work(3, "Original")];
        let mut source = MemorySource::new().with_records(&records);
        let mut target = MemoryDestination::new();
        target.seed(genre(1, "g1"));
        target.seed(film_work(3, "Renamed"));

        let report = ConsistencyChecker::new(&mut source, &mut target)
            .check_detail()
            .await
            .unwrap();

        assert_eq!(report.rows_checked, 3);
        assert_eq!(
            report.mismatches,
            vec![
                RowMismatch {
                    table: "genre".into(),
                    id: Uuid::from_u128(2).to_string(),
                    kind: MismatchKind::Missing,
                },
                RowMismatch {
                    table: "film_work".into(),
                    id: Uuid::from_u128(3).to_string(),
                    kind: MismatchKind::Different {
                        fields: vec!["title".into()]
                    },
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_detail_reports_invalid_source_row() {
        let mut source = MemorySource::new().with_rows(
            EntityKind::Person,
            vec![vec![SqlValue::from("nope"), SqlValue::Null]],
        );
        let mut target = MemoryDestination::new();
        let report = ConsistencyChecker::new(&mut source, &mut target)
            .check_detail()
            .await
            .unwrap();
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].id, "nope");
        assert!(matches!(
            report.mismatches[0].kind,
            MismatchKind::InvalidSource { .. }
        ));
    }

    #[tokio::test]
    async fn test_detail_clean_copy() {
        let records: Vec<Record> = vec![
            Person {
                id: Uuid::from_u128(1),
                full_name: "Mark Hamill".into(),
            }
            .into(),
            Genre {
                id: Uuid::from_u128(2),
                name: "Space opera".into(),
                description: Some(String::new()),
            }
            .into(),
        ];
        let mut source = MemorySource::new().with_records(&records);
        let mut target = MemoryDestination::new();
        for r in &records {
            target.seed(r.clone());
        }
        let report = ConsistencyChecker::new(&mut source, &mut target)
            .check_detail()
            .await
            .unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.rows_checked, 2);
    }

    #[tokio::test]
    async fn test_counts_continue_past_unreadable_table() {
        let records = vec![genre(1, "g1"), film_work(3, "fw")];
        let mut source = MemorySource::new()
            .with_records(&records)
            .failing_on(EntityKind::Person);
        let mut target = MemoryDestination::new();
        for r in &records {
            target.seed(r.clone());
        }

        let report = ConsistencyChecker::new(&mut source, &mut target)
            .check_counts()
            .await
            .unwrap();

        let tables: Vec<&str> = report.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(
            tables,
            vec!["person", "genre", "film_work", "person_film_work", "genre_film_work"]
        );
        assert!(!report.is_consistent());
        let person = &report.tables[0];
        assert!(!person.matches());
        assert!(person
            .error
            .as_deref()
            .unwrap()
            .contains("no such table: person"));
        assert!(report.tables[1..].iter().all(|t| t.matches()));
        assert_eq!(report.mismatches().len(), 1);
    }

    #[tokio::test]
    async fn test_detail_continues_past_unreadable_table() {
        let records = vec![genre(1, "g1"), film_work(3, "fw")];
        let mut source = MemorySource::new()
            .with_records(&records)
            .failing_on(EntityKind::Person);
        let mut target = MemoryDestination::new();
        target.seed(genre(1, "g1"));

        let report = ConsistencyChecker::new(&mut source, &mut target)
            .check_detail()
            .await
            .unwrap();

        assert_eq!(report.rows_checked, 2);
        assert_eq!(report.mismatches.len(), 2);
        assert_eq!(report.mismatches[0].table, "person");
        assert!(report.mismatches[0].id.is_empty());
        assert!(matches!(
            report.mismatches[0].kind,
            MismatchKind::Unreadable { .. }
        ));
        assert_eq!(report.mismatches[1].table, "film_work");
        assert_eq!(report.mismatches[1].kind, MismatchKind::Missing);
    }

    #[test]
    fn test_count_error_json_shape() {
        let count = TableCount {
            table: "person".into(),
            source: 0,
            target: 4,
            error: Some("source: no such table".into()),
        };
        let json = serde_json::to_value(&count).unwrap();
        assert_eq!(json["error"], "source: no such table");

        let clean = TableCount {
            error: None,
            ..count
        };
        assert!(serde_json::to_value(&clean).unwrap().get("error").is_none());
    }

    #[test]
    fn test_mismatch_json_shape() {
        let mismatch = RowMismatch {
            table: "genre".into(),
            id: "x".into(),
            kind: MismatchKind::Different {
                fields: vec!["name".into()],
            },
        };
        let json = serde_json::to_value(&mismatch).unwrap();
        assert_eq!(json["kind"], "different");
        assert_eq!(json["fields"][0], "name");
    }
}
