//! In-memory stores behind the reader/writer traits, for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use uuid::Uuid;

use crate::error::{MigrateError, Result};
use crate::model::{EntityKind, Genre, Record, SqlValue};
use crate::source::{RowStream, SourceReader};
use crate::target::{BatchOutcome, DestinationReader, DestinationWriter, RowQuery};

pub(crate) fn genre(n: u128, name: &str) -> Record {
    Genre {
        id: Uuid::from_u128(n),
        name: name.to_string(),
        description: None,
    }
    .into()
}

/// Source holding raw rows per table.
#[derive(Default)]
pub(crate) struct MemorySource {
    tables: HashMap<EntityKind, Vec<Vec<SqlValue>>>,
    failing: Option<EntityKind>,
    stalling: Option<EntityKind>,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_rows(mut self, kind: EntityKind, rows: Vec<Vec<SqlValue>>) -> Self {
        self.tables.insert(kind, rows);
        self
    }

    pub(crate) fn with_records(mut self, records: &[Record]) -> Self {
        for record in records {
            self.tables
                .entry(record.kind())
                .or_default()
                .push(record.to_row());
        }
        self
    }

    /// Make every query against `kind` fail like a missing table.
    pub(crate) fn failing_on(mut self, kind: EntityKind) -> Self {
        self.failing = Some(kind);
        self
    }

    /// After its rows, `kind`'s stream stays pending instead of ending.
    pub(crate) fn stalling_on(mut self, kind: EntityKind) -> Self {
        self.stalling = Some(kind);
        self
    }

    fn check(&self, kind: EntityKind, sql: &str) -> Result<()> {
        if self.failing == Some(kind) {
            return Err(MigrateError::query(
                kind.table(),
                sql,
                format!("no such table: {}", kind.table()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn row_count(&mut self, kind: EntityKind) -> Result<i64> {
        self.check(kind, kind.count_sql())?;
        Ok(self.tables.get(&kind).map_or(0, Vec::len) as i64)
    }

    async fn open_table<'a>(&'a mut self, kind: EntityKind) -> Result<RowStream<'a>> {
        self.check(kind, kind.select_sql())?;
        let rows = self.tables.get(&kind).cloned().unwrap_or_default();
        let rows = stream::iter(rows.into_iter().map(Ok));
        if self.stalling == Some(kind) {
            return Ok(rows.chain(stream::pending()).boxed());
        }
        Ok(rows.boxed())
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct Store {
    tables: HashMap<EntityKind, BTreeMap<Uuid, Record>>,
    batches: Vec<(EntityKind, Vec<Record>)>,
    random_reads: usize,
    failing_writes: Option<EntityKind>,
    pub(crate) committed: bool,
}

/// Destination with primary-key skip and foreign-key checks.
///
/// Clones share the same store, so a test can keep a handle while the
/// pipeline owns (and closes) another.
#[derive(Clone, Default)]
pub(crate) struct MemoryDestination {
    store: Arc<Mutex<Store>>,
}

impl MemoryDestination {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }

    /// Insert a row directly, bypassing batching.
    pub(crate) fn seed(&self, record: Record) {
        self.store()
            .tables
            .entry(record.kind())
            .or_default()
            .insert(record.id(), record);
    }

    /// Make writes to `kind` fail with a non-constraint database error.
    pub(crate) fn fail_writes_on(&self, kind: EntityKind) {
        self.store().failing_writes = Some(kind);
    }

    pub(crate) fn count(&self, kind: EntityKind) -> usize {
        self.store().tables.get(&kind).map_or(0, BTreeMap::len)
    }

    pub(crate) fn get(&self, kind: EntityKind, id: Uuid) -> Option<Record> {
        self.store()
            .tables
            .get(&kind)
            .and_then(|t| t.get(&id))
            .cloned()
    }

    pub(crate) fn records(&self, kind: EntityKind) -> Vec<Record> {
        self.store()
            .tables
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every batch passed to `write_batch` for `kind`, dropped ones included.
    pub(crate) fn batches(&self, kind: EntityKind) -> Vec<Vec<Record>> {
        self.store()
            .batches
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, b)| b.clone())
            .collect()
    }

    pub(crate) fn flush_sizes(&self, kind: EntityKind) -> Vec<usize> {
        self.batches(kind).iter().map(Vec::len).collect()
    }

    /// Tables in the order their first batch arrived.
    pub(crate) fn write_order(&self) -> Vec<EntityKind> {
        let mut order = Vec::new();
        for (kind, _) in &self.store().batches {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }
        order
    }
}

#[async_trait]
impl DestinationReader for MemoryDestination {
    async fn row_count(&mut self, kind: EntityKind) -> Result<i64> {
        Ok(self.count(kind) as i64)
    }

    async fn read_one(&mut self, query: &RowQuery) -> Result<Option<Vec<SqlValue>>> {
        let mut store = self.store();
        match *query {
            RowQuery::RandomId { kind } => {
                let len = store.tables.get(&kind).map_or(0, BTreeMap::len);
                if len == 0 {
                    return Ok(None);
                }
                // Deterministic rotation instead of randomness.
                let pick = store.random_reads % len;
                store.random_reads += 1;
                Ok(store.tables[&kind]
                    .keys()
                    .nth(pick)
                    .map(|id| vec![SqlValue::Uuid(*id)]))
            }
            RowQuery::ById { kind, id } => Ok(store
                .tables
                .get(&kind)
                .and_then(|t| t.get(&id))
                .map(Record::to_row)),
        }
    }

    async fn fetch_ids(
        &mut self,
        kind: EntityKind,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        let store = self.store();
        let Some(table) = store.tables.get(&kind) else {
            return Ok(Vec::new());
        };
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        Ok(table
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(id, _)| *id)
            .collect())
    }
}

#[async_trait]
impl DestinationWriter for MemoryDestination {
    async fn write_batch(&mut self, kind: EntityKind, records: &[Record]) -> Result<BatchOutcome> {
        let mut store = self.store();
        store.batches.push((kind, records.to_vec()));

        if store.failing_writes == Some(kind) {
            return Err(MigrateError::query(
                kind.table(),
                "INSERT INTO ...",
                "permission denied (SQLSTATE 42501)",
            ));
        }

        let parents_present = records.iter().all(|r| {
            r.foreign_keys().iter().all(|(parent, id)| {
                store
                    .tables
                    .get(parent)
                    .is_some_and(|t| t.contains_key(id))
            })
        });
        if !parents_present {
            return Ok(BatchOutcome::Dropped {
                rows: records.len(),
            });
        }

        let table = store.tables.entry(kind).or_default();
        let mut inserted = 0;
        for record in records {
            if !table.contains_key(&record.id()) {
                table.insert(record.id(), record.clone());
                inserted += 1;
            }
        }
        Ok(BatchOutcome::Written {
            rows: records.len(),
            inserted,
        })
    }

    async fn close(self) -> Result<()> {
        self.store().committed = true;
        Ok(())
    }
}
