//! Batch transfer: validate rows into records, buffer them and flush bounded batches.
//!
//! A table is drained completely, trailing partial batch included, before the
//! caller moves on to the next one.

use std::mem;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::model::{EntityKind, Record};
use crate::source::RowStream;
use crate::target::{BatchOutcome, DestinationWriter};

/// Pure accumulator emitting batches of exactly `batch_size` records.
#[derive(Debug)]
pub struct Batcher {
    batch_size: usize,
    buffer: Vec<Record>,
}

impl Batcher {
    /// A zero batch size is treated as one.
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    /// Add a record, returning the full batch once the buffer reaches the batch size.
    pub fn push(&mut self, record: Record) -> Option<Vec<Record>> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            Some(mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    /// Trailing partial batch; never an empty one.
    pub fn finish(&mut self) -> Option<Vec<Record>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.buffer))
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Per-table counters of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableStats {
    pub table: String,
    /// Rows pulled from the source (or produced by the generator).
    pub rows_read: u64,
    /// Rows that failed validation and were never written.
    pub rows_rejected: u64,
    /// `write_batch` calls, dropped ones included.
    pub batches_flushed: u64,
    pub rows_inserted: u64,
    /// Rows whose id already existed in the destination.
    pub rows_skipped: u64,
    pub batches_dropped: u64,
    pub rows_dropped: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableStats {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            table: kind.table().to_string(),
            ..Default::default()
        }
    }

    /// Account for one flushed batch.
    pub fn record(&mut self, outcome: BatchOutcome) {
        self.batches_flushed += 1;
        match outcome {
            BatchOutcome::Written { rows, inserted } => {
                self.rows_inserted += inserted as u64;
                self.rows_skipped += rows.saturating_sub(inserted) as u64;
            }
            BatchOutcome::Dropped { rows } => {
                self.batches_dropped += 1;
                self.rows_dropped += rows as u64;
            }
        }
    }

    /// The table failed or a batch was dropped.
    pub fn is_partial(&self) -> bool {
        self.error.is_some() || self.batches_dropped > 0
    }
}

/// Drives records of one table at a time into a [`DestinationWriter`].
///
/// Cancellation is observed between rows and before every flush, never in the
/// middle of a write, so every batch handed to the writer completes.
pub struct TransferEngine<'w, W: DestinationWriter> {
    writer: &'w mut W,
    batch_size: usize,
    cancel: CancellationToken,
}

impl<'w, W: DestinationWriter> TransferEngine<'w, W> {
    pub fn new(writer: &'w mut W, batch_size: usize) -> Self {
        Self {
            writer,
            batch_size: batch_size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop at the next row or batch boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The underlying writer, for reads that must see this run's own batches.
    pub fn writer(&mut self) -> &mut W {
        self.writer
    }

    /// Validate and write every row of `rows`.
    ///
    /// Invalid rows are logged and counted; source and destination errors stop the table.
    pub async fn transfer_table(
        &mut self,
        kind: EntityKind,
        mut rows: RowStream<'_>,
        stats: &mut TableStats,
    ) -> Result<()> {
        let mut batcher = Batcher::new(self.batch_size);

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("{}: cancelled, discarding {} buffered rows", kind, batcher.len());
                    return Err(MigrateError::Cancelled);
                }
                next = rows.next() => next,
            };
            let Some(row) = next else {
                break;
            };
            let row = row?;
            stats.rows_read += 1;
            match Record::from_row(kind, &row) {
                Ok(record) => {
                    if let Some(batch) = batcher.push(record) {
                        self.flush(kind, &batch, stats).await?;
                    }
                }
                Err(e) => {
                    stats.rows_rejected += 1;
                    warn!("{}: skipping source row {}: {}", kind, stats.rows_read, e);
                }
            }
        }

        if let Some(batch) = batcher.finish() {
            self.flush(kind, &batch, stats).await?;
        }
        Ok(())
    }

    /// Write already validated records, batching them the same way.
    pub async fn load_records<I>(
        &mut self,
        kind: EntityKind,
        records: I,
        stats: &mut TableStats,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut batcher = Batcher::new(self.batch_size);
        for record in records {
            self.check_cancelled()?;
            stats.rows_read += 1;
            if let Some(batch) = batcher.push(record) {
                self.flush(kind, &batch, stats).await?;
            }
        }
        if let Some(batch) = batcher.finish() {
            self.check_cancelled()?;
            self.flush(kind, &batch, stats).await?;
        }
        Ok(())
    }

    /// Write one batch and account for it.
    pub async fn flush(
        &mut self,
        kind: EntityKind,
        batch: &[Record],
        stats: &mut TableStats,
    ) -> Result<BatchOutcome> {
        let outcome = self.writer.write_batch(kind, batch).await?;
        stats.record(outcome);
        match outcome {
            BatchOutcome::Written { rows, inserted } => debug!(
                "{}: batch {} wrote {} of {} rows",
                kind, stats.batches_flushed, inserted, rows
            ),
            BatchOutcome::Dropped { rows } => warn!(
                "{}: batch {} dropped ({} rows)",
                kind, stats.batches_flushed, rows
            ),
        }
        Ok(outcome)
    }
}
