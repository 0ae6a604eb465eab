//! Junction-table generation against ids already written to the destination.

use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Generator, TextSource};
use crate::error::{MigrateError, Result, ValidationError};
use crate::model::EntityKind;
use crate::target::{DestinationWriter, RowQuery};
use crate::transfer::{Batcher, TableStats, TransferEngine};

/// Knobs for [`fill_junction_table`].
#[derive(Debug, Clone, Copy)]
pub struct JunctionSettings {
    /// Upper bound of junction rows per film work.
    pub max_per_film_work: usize,
    /// Random related ids drawn into the pool after each flush.
    pub sample_size: usize,
}

/// Link every film work in the destination to random related rows.
///
/// Film work ids are keyset-paged from the destination and related ids are
/// sampled from it, so every referenced row has been flushed before use. With
/// no film works or no related rows nothing is written.
pub async fn fill_junction_table<W, R, T>(
    engine: &mut TransferEngine<'_, W>,
    generator: &mut Generator<R, T>,
    kind: EntityKind,
    settings: JunctionSettings,
    stats: &mut TableStats,
) -> Result<()>
where
    W: DestinationWriter,
    R: Rng,
    T: TextSource,
{
    let Some(related) = kind.related_base() else {
        return Err(MigrateError::Config(format!(
            "{} is not a junction table",
            kind
        )));
    };

    let mut pool = sample_ids(engine.writer(), related, settings.sample_size).await?;
    if pool.is_empty() {
        info!("{}: no {} rows in the destination, nothing to link", kind, related);
        return Ok(());
    }

    let page_size = engine.batch_size();
    let mut batcher = Batcher::new(page_size);
    let mut after: Option<Uuid> = None;

    loop {
        engine.check_cancelled()?;
        let film_works = engine
            .writer()
            .fetch_ids(EntityKind::FilmWork, after, page_size)
            .await?;
        let Some(last) = film_works.last() else {
            break;
        };
        after = Some(*last);

        for film_work_id in film_works {
            let rows = generator.junction_records(
                kind,
                film_work_id,
                &pool,
                settings.max_per_film_work,
            );
            for record in rows {
                stats.rows_read += 1;
                if let Some(batch) = batcher.push(record) {
                    engine.check_cancelled()?;
                    engine.flush(kind, &batch, stats).await?;
                    pool = sample_ids(engine.writer(), related, settings.sample_size).await?;
                }
            }
        }
    }

    if let Some(batch) = batcher.finish() {
        engine.check_cancelled()?;
        engine.flush(kind, &batch, stats).await?;
    }
    if stats.rows_read == 0 {
        info!("{}: no film works in the destination, nothing to link", kind);
    }
    Ok(())
}

/// Up to `sample_size` distinct random ids of `kind`.
async fn sample_ids<W: DestinationWriter>(
    writer: &mut W,
    kind: EntityKind,
    sample_size: usize,
) -> Result<Vec<Uuid>> {
    let query = RowQuery::RandomId { kind };
    let mut ids: Vec<Uuid> = Vec::with_capacity(sample_size);

    for _ in 0..sample_size {
        let Some(row) = writer.read_one(&query).await? else {
            break;
        };
        let id = row
            .first()
            .ok_or_else(|| MigrateError::query(kind.table(), query.sql("-"), "empty row"))?
            .as_uuid()
            .map_err(|e| ValidationError {
                entity: kind.table(),
                field: "id",
                kind: e,
            })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    debug!("{}: sampled {} ids", kind, ids.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;
    use crate::testing::MemoryDestination;

    const SETTINGS: JunctionSettings = JunctionSettings {
        max_per_film_work: 3,
        sample_size: 4,
    };

    fn seeded_destination(persons: usize, film_works: usize) -> MemoryDestination {
        let dest = MemoryDestination::new();
        let mut generator = Generator::from_seed(Some(11));
        for record in generator.base_records(EntityKind::Person, persons) {
            dest.seed(record);
        }
        for record in generator.base_records(EntityKind::FilmWork, film_works) {
            dest.seed(record);
        }
        dest
    }

    async fn fill(dest: &MemoryDestination, kind: EntityKind, batch_size: usize) -> TableStats {
        let mut writer = dest.clone();
        let mut engine = TransferEngine::new(&mut writer, batch_size);
        let mut generator = Generator::from_seed(Some(3));
        let mut stats = TableStats::new(kind);
        fill_junction_table(&mut engine, &mut generator, kind, SETTINGS, &mut stats)
            .await
            .unwrap();
        stats
    }

    #[tokio::test]
    async fn test_no_film_works_yields_nothing() {
        let dest = seeded_destination(5, 0);
        let stats = fill(&dest, EntityKind::PersonFilmWork, 10).await;
        assert_eq!(stats.rows_read, 0);
        assert!(dest.flush_sizes(EntityKind::PersonFilmWork).is_empty());
    }

    #[tokio::test]
    async fn test_no_related_rows_yields_nothing() {
        let dest = seeded_destination(5, 8);
        let stats = fill(&dest, EntityKind::GenreFilmWork, 10).await;
        assert_eq!(stats.rows_read, 0);
        assert_eq!(dest.count(EntityKind::GenreFilmWork), 0);
    }

    #[tokio::test]
    async fn test_every_film_work_linked_to_existing_rows() {
        let dest = seeded_destination(6, 23);
        let stats = fill(&dest, EntityKind::PersonFilmWork, 7).await;

        assert_eq!(stats.batches_dropped, 0);
        assert_eq!(stats.rows_inserted, stats.rows_read);
        let links = dest.records(EntityKind::PersonFilmWork);
        assert_eq!(links.len() as u64, stats.rows_read);

        let mut linked_film_works = std::collections::HashSet::new();
        for link in &links {
            let Record::PersonFilmWork(pfw) = link else {
                panic!("unexpected {:?}", link);
            };
            assert!(dest.get(EntityKind::Person, pfw.person_id).is_some());
            assert!(dest.get(EntityKind::FilmWork, pfw.film_work_id).is_some());
            linked_film_works.insert(pfw.film_work_id);
        }
        assert_eq!(linked_film_works.len(), 23);

        // Flush sizes are full batches plus one trailing partial.
        let sizes = dest.flush_sizes(EntityKind::PersonFilmWork);
        let (last, full) = sizes.split_last().unwrap();
        assert!(full.iter().all(|s| *s == 7));
        assert!(*last >= 1 && *last <= 7);
    }

    #[tokio::test]
    async fn test_rejects_base_table() {
        let dest = seeded_destination(1, 1);
        let mut writer = dest.clone();
        let mut engine = TransferEngine::new(&mut writer, 10);
        let mut generator = Generator::from_seed(Some(3));
        let mut stats = TableStats::new(EntityKind::Person);
        let err = fill_junction_table(
            &mut engine,
            &mut generator,
            EntityKind::Person,
            SETTINGS,
            &mut stats,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }
}
