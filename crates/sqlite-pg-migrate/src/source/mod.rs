//! Source side of the pipeline: lazy row streams out of a catalogue store.

mod sqlite;

pub use sqlite::SqliteReader;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{EntityKind, SqlValue};

/// Raw rows of one table in [`EntityKind::columns`] order, decoded one per poll.
pub type RowStream<'a> = BoxStream<'a, Result<Vec<SqlValue>>>;

/// Read rows from a source store.
///
/// Implementations hold a single connection; every call to
/// [`open_table`](SourceReader::open_table) runs a fresh statement, so a
/// table can be streamed more than once.
#[async_trait]
pub trait SourceReader: Send {
    /// `SELECT COUNT(*)` of the table.
    async fn row_count(&mut self, kind: EntityKind) -> Result<i64>;

    /// Start streaming the table.
    ///
    /// A malformed query or missing table fails here, before any row is produced.
    async fn open_table<'a>(&'a mut self, kind: EntityKind) -> Result<RowStream<'a>>;

    /// Release the connection.
    async fn close(self) -> Result<()>;
}
