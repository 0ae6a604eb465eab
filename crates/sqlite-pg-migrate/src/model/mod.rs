//! Record model: the five catalogue entities and their raw cell vocabulary.
//!
//! Every row crossing a store boundary is validated into a [`Record`] once,
//! and written back out through [`Record::to_row`] in the fixed column order
//! of its [`EntityKind`].

mod entities;
mod value;

pub use entities::{FilmWork, FilmWorkType, Genre, GenreFilmWork, Person, PersonFilmWork, PersonRole};
pub use value::{ColumnType, SqlValue};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MigrateError, ValidationError};

/// The closed set of tables handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Genre,
    FilmWork,
    PersonFilmWork,
    GenreFilmWork,
}

impl EntityKind {
    /// Parents before children, so foreign keys always resolve.
    pub const DEPENDENCY_ORDER: [EntityKind; 5] = [
        EntityKind::Person,
        EntityKind::Genre,
        EntityKind::FilmWork,
        EntityKind::PersonFilmWork,
        EntityKind::GenreFilmWork,
    ];

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Person => Person::TABLE,
            EntityKind::Genre => Genre::TABLE,
            EntityKind::FilmWork => FilmWork::TABLE,
            EntityKind::PersonFilmWork => PersonFilmWork::TABLE,
            EntityKind::GenreFilmWork => GenreFilmWork::TABLE,
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            EntityKind::Person => Person::COLUMNS,
            EntityKind::Genre => Genre::COLUMNS,
            EntityKind::FilmWork => FilmWork::COLUMNS,
            EntityKind::PersonFilmWork => PersonFilmWork::COLUMNS,
            EntityKind::GenreFilmWork => GenreFilmWork::COLUMNS,
        }
    }

    pub fn column_types(self) -> &'static [ColumnType] {
        match self {
            EntityKind::Person => Person::COLUMN_TYPES,
            EntityKind::Genre => Genre::COLUMN_TYPES,
            EntityKind::FilmWork => FilmWork::COLUMN_TYPES,
            EntityKind::PersonFilmWork => PersonFilmWork::COLUMN_TYPES,
            EntityKind::GenreFilmWork => GenreFilmWork::COLUMN_TYPES,
        }
    }

    /// `SELECT <columns> FROM <table>` for the source store.
    ///
    /// Literal strings so a row stream can borrow the query for `'static`.
    pub fn select_sql(self) -> &'static str {
        match self {
            EntityKind::Person => "SELECT id, full_name FROM person",
            EntityKind::Genre => "SELECT id, name, description FROM genre",
            EntityKind::FilmWork => {
                "SELECT id, title, description, creation_date, rating, type FROM film_work"
            }
            EntityKind::PersonFilmWork => {
                "SELECT id, film_work_id, person_id, role FROM person_film_work"
            }
            EntityKind::GenreFilmWork => "SELECT id, film_work_id, genre_id FROM genre_film_work",
        }
    }

    pub fn count_sql(self) -> &'static str {
        match self {
            EntityKind::Person => "SELECT COUNT(*) FROM person",
            EntityKind::Genre => "SELECT COUNT(*) FROM genre",
            EntityKind::FilmWork => "SELECT COUNT(*) FROM film_work",
            EntityKind::PersonFilmWork => "SELECT COUNT(*) FROM person_film_work",
            EntityKind::GenreFilmWork => "SELECT COUNT(*) FROM genre_film_work",
        }
    }

    pub fn is_junction(self) -> bool {
        matches!(self, EntityKind::PersonFilmWork | EntityKind::GenreFilmWork)
    }

    /// Tables this one holds foreign keys into.
    pub fn references(self) -> &'static [EntityKind] {
        match self {
            EntityKind::PersonFilmWork => &[EntityKind::FilmWork, EntityKind::Person],
            EntityKind::GenreFilmWork => &[EntityKind::FilmWork, EntityKind::Genre],
            _ => &[],
        }
    }

    /// For a junction, the non-film-work side it links to.
    pub fn related_base(self) -> Option<EntityKind> {
        match self {
            EntityKind::PersonFilmWork => Some(EntityKind::Person),
            EntityKind::GenreFilmWork => Some(EntityKind::Genre),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::DEPENDENCY_ORDER
            .into_iter()
            .find(|k| k.table() == s)
            .ok_or_else(|| MigrateError::Config(format!("unknown table '{}'", s)))
    }
}

/// A validated row of any entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Person(Person),
    Genre(Genre),
    FilmWork(FilmWork),
    PersonFilmWork(PersonFilmWork),
    GenreFilmWork(GenreFilmWork),
}

impl Record {
    /// Validate a raw row of `kind` given in [`EntityKind::columns`] order.
    pub fn from_row(kind: EntityKind, row: &[SqlValue]) -> Result<Self, ValidationError> {
        Ok(match kind {
            EntityKind::Person => Record::Person(Person::from_row(row)?),
            EntityKind::Genre => Record::Genre(Genre::from_row(row)?),
            EntityKind::FilmWork => Record::FilmWork(FilmWork::from_row(row)?),
            EntityKind::PersonFilmWork => Record::PersonFilmWork(PersonFilmWork::from_row(row)?),
            EntityKind::GenreFilmWork => Record::GenreFilmWork(GenreFilmWork::from_row(row)?),
        })
    }

    /// Validate a column-name keyed row. Absent columns count as NULL.
    pub fn from_mapping(
        kind: EntityKind,
        map: &HashMap<String, SqlValue>,
    ) -> Result<Self, ValidationError> {
        let row: Vec<SqlValue> = kind
            .columns()
            .iter()
            .map(|col| map.get(*col).cloned().unwrap_or(SqlValue::Null))
            .collect();
        Self::from_row(kind, &row)
    }

    /// Cells in fixed column order; `from_row(kind, &r.to_row()) == r`.
    pub fn to_row(&self) -> Vec<SqlValue> {
        match self {
            Record::Person(r) => r.to_row(),
            Record::Genre(r) => r.to_row(),
            Record::FilmWork(r) => r.to_row(),
            Record::PersonFilmWork(r) => r.to_row(),
            Record::GenreFilmWork(r) => r.to_row(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Person(_) => EntityKind::Person,
            Record::Genre(_) => EntityKind::Genre,
            Record::FilmWork(_) => EntityKind::FilmWork,
            Record::PersonFilmWork(_) => EntityKind::PersonFilmWork,
            Record::GenreFilmWork(_) => EntityKind::GenreFilmWork,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Record::Person(r) => r.id,
            Record::Genre(r) => r.id,
            Record::FilmWork(r) => r.id,
            Record::PersonFilmWork(r) => r.id,
            Record::GenreFilmWork(r) => r.id,
        }
    }

    /// Ids of the parent rows this record points at, paired with their table.
    pub fn foreign_keys(&self) -> Vec<(EntityKind, Uuid)> {
        match self {
            Record::PersonFilmWork(r) => vec![
                (EntityKind::FilmWork, r.film_work_id),
                (EntityKind::Person, r.person_id),
            ],
            Record::GenreFilmWork(r) => vec![
                (EntityKind::FilmWork, r.film_work_id),
                (EntityKind::Genre, r.genre_id),
            ],
            _ => Vec::new(),
        }
    }
}

impl From<Person> for Record {
    fn from(r: Person) -> Self {
        Record::Person(r)
    }
}

impl From<Genre> for Record {
    fn from(r: Genre) -> Self {
        Record::Genre(r)
    }
}

impl From<FilmWork> for Record {
    fn from(r: FilmWork) -> Self {
        Record::FilmWork(r)
    }
}

impl From<PersonFilmWork> for Record {
    fn from(r: PersonFilmWork) -> Self {
        Record::PersonFilmWork(r)
    }
}

impl From<GenreFilmWork> for Record {
    fn from(r: GenreFilmWork) -> Self {
        Record::GenreFilmWork(r)
    }
}
