//! Synthetic catalogue content.
//!
//! Base tables are produced from nothing but the RNG. Junction rows need ids
//! of rows that are already in the destination, see [`fill_junction_table`].

mod junction;
mod text;

pub use junction::{fill_junction_table, JunctionSettings};
pub use text::{Lexicon, TextSource};

use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::model::{
    EntityKind, FilmWork, FilmWorkType, Genre, GenreFilmWork, Person, PersonFilmWork, PersonRole,
    Record,
};

/// Random record factory.
pub struct Generator<R = StdRng, T = Lexicon> {
    rng: R,
    text: T,
    earliest: NaiveDate,
    latest: NaiveDate,
}

impl Generator<StdRng, Lexicon> {
    /// Reproducible with a seed, entropy-seeded otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(rng, Lexicon)
    }
}

impl<R: Rng, T: TextSource> Generator<R, T> {
    /// Creation dates default to `[1900-01-01, today]`.
    pub fn new(rng: R, text: T) -> Self {
        let earliest = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
        Self {
            rng,
            text,
            earliest,
            latest: Utc::now().date_naive(),
        }
    }

    /// Restrict creation dates to `[earliest, latest]`.
    pub fn with_date_range(mut self, earliest: NaiveDate, latest: NaiveDate) -> Self {
        self.earliest = earliest.min(latest);
        self.latest = latest.max(earliest);
        self
    }

    /// Fresh random (version 4) id drawn from the generator's RNG.
    fn new_id(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    pub fn person(&mut self) -> Person {
        Person {
            id: self.new_id(),
            full_name: self.text.name(&mut self.rng),
        }
    }

    pub fn genre(&mut self) -> Genre {
        Genre {
            id: self.new_id(),
            name: self.text.word(&mut self.rng),
            description: Some(self.text.paragraph(&mut self.rng)),
        }
    }

    pub fn film_work(&mut self) -> FilmWork {
        let span = (self.latest - self.earliest).num_days();
        let creation_date = self.earliest + Duration::days(self.rng.gen_range(0..=span));
        FilmWork {
            id: self.new_id(),
            title: self.text.catch_phrase(&mut self.rng),
            description: Some(self.text.paragraph(&mut self.rng)),
            creation_date: Some(creation_date),
            rating: Some(Decimal::new(self.rng.gen_range(0..=1000), 1)),
            r#type: FilmWorkType::ALL[self.rng.gen_range(0..FilmWorkType::ALL.len())],
        }
    }

    /// One base-table record, or `None` for junction kinds.
    pub fn base_record(&mut self, kind: EntityKind) -> Option<Record> {
        match kind {
            EntityKind::Person => Some(self.person().into()),
            EntityKind::Genre => Some(self.genre().into()),
            EntityKind::FilmWork => Some(self.film_work().into()),
            EntityKind::PersonFilmWork | EntityKind::GenreFilmWork => None,
        }
    }

    /// Lazily produce `count` records of a base table.
    pub fn base_records(
        &mut self,
        kind: EntityKind,
        count: usize,
    ) -> impl Iterator<Item = Record> + '_ {
        (0..count).map_while(move |_| self.base_record(kind))
    }

    /// Junction rows for one film work: `1..=max` rows with distinct related ids from `pool`.
    ///
    /// Empty when `pool` is empty or `kind` is not a junction table.
    pub fn junction_records(
        &mut self,
        kind: EntityKind,
        film_work_id: Uuid,
        pool: &[Uuid],
        max: usize,
    ) -> Vec<Record> {
        let limit = max.min(pool.len());
        if limit == 0 || !kind.is_junction() {
            return Vec::new();
        }
        let count = self.rng.gen_range(1..=limit);
        let related: Vec<Uuid> = pool.choose_multiple(&mut self.rng, count).copied().collect();

        related
            .into_iter()
            .map(|related_id| match kind {
                EntityKind::PersonFilmWork => PersonFilmWork {
                    id: self.new_id(),
                    film_work_id,
                    person_id: related_id,
                    role: PersonRole::ALL[self.rng.gen_range(0..PersonRole::ALL.len())],
                }
                .into(),
                _ => GenreFilmWork {
                    id: self.new_id(),
                    film_work_id,
                    genre_id: related_id,
                }
                .into(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn seeded() -> Generator {
        Generator::from_seed(Some(7))
    }

    #[test]
    fn test_base_records_exact_count() {
        let mut generator = seeded();
        let people: Vec<Record> = generator.base_records(EntityKind::Person, 25).collect();
        assert_eq!(people.len(), 25);
        assert!(people.iter().all(|r| r.kind() == EntityKind::Person));
        let ids: HashSet<Uuid> = people.iter().map(Record::id).collect();
        assert_eq!(ids.len(), 25);
        assert!(ids.iter().all(|id| id.get_version_num() == 4));
    }

    #[test]
    fn test_junction_kind_has_no_base_records() {
        assert_eq!(
            seeded()
                .base_records(EntityKind::GenreFilmWork, 10)
                .count(),
            0
        );
    }

    #[test]
    fn test_film_work_fields_in_range() {
        let earliest = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap();
        let latest = NaiveDate::from_ymd_opt(2000, 12, 31).unwrap();
        let mut generator = seeded().with_date_range(earliest, latest);
        for _ in 0..200 {
            let fw = generator.film_work();
            let date = fw.creation_date.unwrap();
            assert!(date >= earliest && date <= latest);
            let rating = fw.rating.unwrap();
            assert!(rating >= Decimal::ZERO && rating <= Decimal::ONE_HUNDRED);
            assert!(rating.scale() <= 1);
            // Generated rows must pass the same validation as migrated ones.
            let record = Record::from(fw);
            assert_eq!(Record::from_row(EntityKind::FilmWork, &record.to_row()).unwrap(), record);
        }
    }

    #[test]
    fn test_seeded_output_is_reproducible() {
        let a: Vec<Record> = seeded().base_records(EntityKind::Genre, 5).collect();
        let b: Vec<Record> = seeded().base_records(EntityKind::Genre, 5).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_junction_related_ids_are_distinct() {
        let pool: Vec<Uuid> = (1..=4).map(Uuid::from_u128).collect();
        let mut generator = seeded();
        for _ in 0..50 {
            let rows = generator.junction_records(EntityKind::PersonFilmWork, Uuid::nil(), &pool, 3);
            assert!((1..=3).contains(&rows.len()));
            let related: HashSet<Uuid> = rows
                .iter()
                .map(|r| match r {
                    Record::PersonFilmWork(p) => p.person_id,
                    other => panic!("unexpected {:?}", other),
                })
                .collect();
            assert_eq!(related.len(), rows.len());
            assert!(related.iter().all(|id| pool.contains(id)));
        }
    }

    #[test]
    fn test_junction_small_pool_caps_count() {
        let pool = vec![Uuid::from_u128(1)];
        let rows = seeded().junction_records(EntityKind::GenreFilmWork, Uuid::nil(), &pool, 5);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_junction_empty_pool() {
        assert!(seeded()
            .junction_records(EntityKind::GenreFilmWork, Uuid::nil(), &[], 3)
            .is_empty());
        assert!(seeded()
            .junction_records(EntityKind::Genre, Uuid::nil(), &[Uuid::nil()], 3)
            .is_empty());
    }
}
