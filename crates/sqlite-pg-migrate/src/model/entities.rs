//! Typed row shapes of the five catalogue entities.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value::{ColumnType, SqlValue};
use crate::error::{ValidationError, ValidationErrorKind};

/// Kind of a film work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilmWorkType {
    Movie,
    TvShow,
}

impl FilmWorkType {
    pub const ALL: [FilmWorkType; 2] = [FilmWorkType::Movie, FilmWorkType::TvShow];

    pub fn as_str(self) -> &'static str {
        match self {
            FilmWorkType::Movie => "movie",
            FilmWorkType::TvShow => "tv_show",
        }
    }
}

impl FromStr for FilmWorkType {
    type Err = ValidationErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(FilmWorkType::Movie),
            "tv_show" => Ok(FilmWorkType::TvShow),
            other => Err(ValidationErrorKind::Constraint(format!(
                "unknown film work type {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for FilmWorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a person in a film work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonRole {
    Actor,
    Producer,
    Director,
}

impl PersonRole {
    pub const ALL: [PersonRole; 3] = [PersonRole::Actor, PersonRole::Producer, PersonRole::Director];

    pub fn as_str(self) -> &'static str {
        match self {
            PersonRole::Actor => "actor",
            PersonRole::Producer => "producer",
            PersonRole::Director => "director",
        }
    }
}

impl FromStr for PersonRole {
    type Err = ValidationErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actor" => Ok(PersonRole::Actor),
            "producer" => Ok(PersonRole::Producer),
            "director" => Ok(PersonRole::Director),
            other => Err(ValidationErrorKind::Constraint(format!(
                "unknown role {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for PersonRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Walks a raw row in column order, tagging every failure with its field.
struct Cells<'a> {
    entity: &'static str,
    columns: &'static [&'static str],
    values: &'a [SqlValue],
    pos: usize,
}

impl<'a> Cells<'a> {
    fn new(
        entity: &'static str,
        columns: &'static [&'static str],
        values: &'a [SqlValue],
    ) -> Result<Self, ValidationError> {
        if values.len() != columns.len() {
            return Err(ValidationError {
                entity,
                field: "row",
                kind: ValidationErrorKind::Arity {
                    expected: columns.len(),
                    found: values.len(),
                },
            });
        }
        Ok(Self {
            entity,
            columns,
            values,
            pos: 0,
        })
    }

    fn next<T>(
        &mut self,
        convert: impl FnOnce(&SqlValue) -> Result<T, ValidationErrorKind>,
    ) -> Result<T, ValidationError> {
        let field = self.columns[self.pos];
        let value = &self.values[self.pos];
        self.pos += 1;
        convert(value).map_err(|kind| ValidationError {
            entity: self.entity,
            field,
            kind,
        })
    }

    fn optional<T>(
        &mut self,
        convert: impl FnOnce(&SqlValue) -> Result<T, ValidationErrorKind>,
    ) -> Result<Option<T>, ValidationError> {
        self.next(|v| if v.is_null() { Ok(None) } else { convert(v).map(Some) })
    }
}

fn parse_enum<T: FromStr<Err = ValidationErrorKind>>(v: &SqlValue) -> Result<T, ValidationErrorKind> {
    v.as_text()?.trim().parse()
}

/// Ratings live in `0..=100` with at most one fractional digit.
fn rating(v: &SqlValue) -> Result<Decimal, ValidationErrorKind> {
    let value = v.as_decimal()?.normalize();
    if value.scale() > 1 {
        return Err(ValidationErrorKind::Constraint(format!(
            "rating {} has more than one fractional digit",
            value
        )));
    }
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(ValidationErrorKind::Constraint(format!(
            "rating {} is outside 0..=100",
            value
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: Uuid,
    pub full_name: String,
}

impl Person {
    pub const TABLE: &'static str = "person";
    pub const COLUMNS: &'static [&'static str] = &["id", "full_name"];
    pub const COLUMN_TYPES: &'static [ColumnType] = &[ColumnType::Uuid, ColumnType::Text];

    pub fn from_row(row: &[SqlValue]) -> Result<Self, ValidationError> {
        let mut cells = Cells::new(Self::TABLE, Self::COLUMNS, row)?;
        Ok(Self {
            id: cells.next(SqlValue::as_uuid)?,
            full_name: cells.next(SqlValue::as_text)?,
        })
    }

    pub fn to_row(&self) -> Vec<SqlValue> {
        vec![self.id.into(), self.full_name.clone().into()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl Genre {
    pub const TABLE: &'static str = "genre";
    pub const COLUMNS: &'static [&'static str] = &["id", "name", "description"];
    pub const COLUMN_TYPES: &'static [ColumnType] =
        &[ColumnType::Uuid, ColumnType::Text, ColumnType::Text];

    pub fn from_row(row: &[SqlValue]) -> Result<Self, ValidationError> {
        let mut cells = Cells::new(Self::TABLE, Self::COLUMNS, row)?;
        Ok(Self {
            id: cells.next(SqlValue::as_uuid)?,
            name: cells.next(SqlValue::as_text)?,
            description: cells.optional(SqlValue::as_text)?,
        })
    }

    pub fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.description.clone().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmWork {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creation_date: Option<NaiveDate>,
    pub rating: Option<Decimal>,
    pub r#type: FilmWorkType,
}

impl FilmWork {
    pub const TABLE: &'static str = "film_work";
    pub const COLUMNS: &'static [&'static str] = &[
        "id",
        "title",
        "description",
        "creation_date",
        "rating",
        "type",
    ];
    pub const COLUMN_TYPES: &'static [ColumnType] = &[
        ColumnType::Uuid,
        ColumnType::Text,
        ColumnType::Text,
        ColumnType::Date,
        ColumnType::Decimal,
        ColumnType::Text,
    ];

    pub fn from_row(row: &[SqlValue]) -> Result<Self, ValidationError> {
        let mut cells = Cells::new(Self::TABLE, Self::COLUMNS, row)?;
        Ok(Self {
            id: cells.next(SqlValue::as_uuid)?,
            title: cells.next(SqlValue::as_text)?,
            description: cells.optional(SqlValue::as_text)?,
            creation_date: cells.optional(SqlValue::as_date)?,
            rating: cells.optional(rating)?,
            r#type: cells.next(parse_enum)?,
        })
    }

    pub fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.title.clone().into(),
            self.description.clone().into(),
            self.creation_date.into(),
            self.rating.into(),
            self.r#type.as_str().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonFilmWork {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub person_id: Uuid,
    pub role: PersonRole,
}

impl PersonFilmWork {
    pub const TABLE: &'static str = "person_film_work";
    pub const COLUMNS: &'static [&'static str] = &["id", "film_work_id", "person_id", "role"];
    pub const COLUMN_TYPES: &'static [ColumnType] = &[
        ColumnType::Uuid,
        ColumnType::Uuid,
        ColumnType::Uuid,
        ColumnType::Text,
    ];

    pub fn from_row(row: &[SqlValue]) -> Result<Self, ValidationError> {
        let mut cells = Cells::new(Self::TABLE, Self::COLUMNS, row)?;
        Ok(Self {
            id: cells.next(SqlValue::as_uuid)?,
            film_work_id: cells.next(SqlValue::as_uuid)?,
            person_id: cells.next(SqlValue::as_uuid)?,
            role: cells.next(parse_enum)?,
        })
    }

    pub fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.film_work_id.into(),
            self.person_id.into(),
            self.role.as_str().into(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreFilmWork {
    pub id: Uuid,
    pub film_work_id: Uuid,
    pub genre_id: Uuid,
}

impl GenreFilmWork {
    pub const TABLE: &'static str = "genre_film_work";
    pub const COLUMNS: &'static [&'static str] = &["id", "film_work_id", "genre_id"];
    pub const COLUMN_TYPES: &'static [ColumnType] =
        &[ColumnType::Uuid, ColumnType::Uuid, ColumnType::Uuid];

    pub fn from_row(row: &[SqlValue]) -> Result<Self, ValidationError> {
        let mut cells = Cells::new(Self::TABLE, Self::COLUMNS, row)?;
        Ok(Self {
            id: cells.next(SqlValue::as_uuid)?,
            film_work_id: cells.next(SqlValue::as_uuid)?,
            genre_id: cells.next(SqlValue::as_uuid)?,
        })
    }

    pub fn to_row(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.film_work_id.into(),
            self.genre_id.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn film_work_row() -> Vec<SqlValue> {
        vec![
            SqlValue::from(uuid(1).to_string()),
            "Star Wars".into(),
            SqlValue::Null,
            "1977-05-25".into(),
            SqlValue::F64(8.6),
            "movie".into(),
        ]
    }

    #[test]
    fn test_person_from_row() {
        let person =
            Person::from_row(&[uuid(7).to_string().into(), "Harrison Ford".into()]).unwrap();
        assert_eq!(person.id, uuid(7));
        assert_eq!(person.full_name, "Harrison Ford");
    }

    #[test]
    fn test_person_missing_name() {
        let err = Person::from_row(&[uuid(7).into(), SqlValue::Null]).unwrap_err();
        assert_eq!(err.field, "full_name");
        assert_eq!(err.kind, ValidationErrorKind::Missing);
    }

    #[test]
    fn test_genre_keeps_empty_description() {
        let genre =
            Genre::from_row(&[uuid(2).into(), "Drama".into(), "".into()]).unwrap();
        assert_eq!(genre.description.as_deref(), Some(""));
        let genre = Genre::from_row(&[uuid(2).into(), "Drama".into(), SqlValue::Null]).unwrap();
        assert_eq!(genre.description, None);
    }

    #[test]
    fn test_genre_arity() {
        let err = Genre::from_row(&[uuid(2).into(), "Drama".into()]).unwrap_err();
        assert_eq!(err.field, "row");
        assert_eq!(
            err.kind,
            ValidationErrorKind::Arity {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_film_work_from_sqlite_cells() {
        let fw = FilmWork::from_row(&film_work_row()).unwrap();
        assert_eq!(fw.id, uuid(1));
        assert_eq!(fw.creation_date, NaiveDate::from_ymd_opt(1977, 5, 25));
        assert_eq!(fw.rating, Some(Decimal::new(86, 1)));
        assert_eq!(fw.r#type, FilmWorkType::Movie);
    }

    #[test]
    fn test_film_work_rating_out_of_range() {
        let mut row = film_work_row();
        row[4] = SqlValue::I64(101);
        let err = FilmWork::from_row(&row).unwrap_err();
        assert_eq!(err.field, "rating");
        assert!(matches!(err.kind, ValidationErrorKind::Constraint(_)));
    }

    #[test]
    fn test_film_work_rating_precision() {
        let mut row = film_work_row();
        row[4] = SqlValue::Decimal(Decimal::new(725, 2));
        assert!(matches!(
            FilmWork::from_row(&row).unwrap_err().kind,
            ValidationErrorKind::Constraint(_)
        ));

        // Trailing zeros do not count as precision.
        row[4] = SqlValue::Decimal(Decimal::new(7500, 3));
        assert_eq!(
            FilmWork::from_row(&row).unwrap().rating,
            Some(Decimal::new(75, 1))
        );
    }

    #[test]
    fn test_film_work_unknown_type() {
        let mut row = film_work_row();
        row[5] = "series".into();
        let err = FilmWork::from_row(&row).unwrap_err();
        assert_eq!(err.field, "type");
    }

    #[test]
    fn test_person_film_work_role() {
        let row = vec![
            uuid(1).into(),
            uuid(2).into(),
            uuid(3).into(),
            SqlValue::from("director"),
        ];
        let pfw = PersonFilmWork::from_row(&row).unwrap();
        assert_eq!(pfw.role, PersonRole::Director);
        assert_eq!(pfw.to_row(), row);

        let mut bad = row;
        bad[3] = "writer".into();
        assert_eq!(PersonFilmWork::from_row(&bad).unwrap_err().field, "role");
    }

    #[test]
    fn test_genre_film_work_bad_uuid() {
        let err = GenreFilmWork::from_row(&[uuid(1).into(), "nope".into(), uuid(3).into()])
            .unwrap_err();
        assert_eq!(err.field, "film_work_id");
        assert!(matches!(
            err.kind,
            ValidationErrorKind::TypeMismatch { expected: "uuid", .. }
        ));
    }

    #[test]
    fn test_enum_strings() {
        for t in FilmWorkType::ALL {
            assert_eq!(t.as_str().parse::<FilmWorkType>().unwrap(), t);
        }
        for r in PersonRole::ALL {
            assert_eq!(r.to_string().parse::<PersonRole>().unwrap(), r);
        }
        assert_eq!(
            serde_json::to_string(&FilmWorkType::TvShow).unwrap(),
            "\"tv_show\""
        );
    }
}
