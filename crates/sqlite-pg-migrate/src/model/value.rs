//! Raw cell values shared by the source reader and the destination store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::error::ValidationErrorKind;

/// One untyped cell as it comes out of (or goes into) a store.
///
/// SQLite cells only ever decode to `Null`, `I64`, `F64`, `Text` or `Bytes`;
/// the richer variants come from PostgreSQL or from typed records.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Decimal(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Destination column type, used to pick the parameter type and cast on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Uuid,
    Text,
    Date,
    Decimal,
}

impl ColumnType {
    /// PostgreSQL cast applied to the bind parameter.
    pub fn pg_cast(self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Text => "text",
            ColumnType::Date => "date",
            ColumnType::Decimal => "numeric",
        }
    }
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

impl SqlValue {
    /// Check if this value is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short name of the variant, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::I64(_) => "integer",
            SqlValue::F64(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "blob",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::Date(_) => "date",
            SqlValue::DateTime(_) => "timestamp",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ValidationErrorKind {
        ValidationErrorKind::TypeMismatch {
            expected,
            found: self.type_name().to_string(),
        }
    }

    /// Coerce to a UUID. Accepts canonical text and 16-byte blobs.
    pub fn as_uuid(&self) -> Result<Uuid, ValidationErrorKind> {
        match self {
            SqlValue::Null => Err(ValidationErrorKind::Missing),
            SqlValue::Uuid(u) => Ok(*u),
            SqlValue::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| {
                ValidationErrorKind::TypeMismatch {
                    expected: "uuid",
                    found: format!("text {:?}", s),
                }
            }),
            SqlValue::Bytes(b) => Uuid::from_slice(b).map_err(|_| {
                ValidationErrorKind::TypeMismatch {
                    expected: "uuid",
                    found: format!("blob of {} bytes", b.len()),
                }
            }),
            other => Err(other.mismatch("uuid")),
        }
    }

    /// Coerce to text.
    pub fn as_text(&self) -> Result<String, ValidationErrorKind> {
        match self {
            SqlValue::Null => Err(ValidationErrorKind::Missing),
            SqlValue::Text(s) => Ok(s.clone()),
            other => Err(other.mismatch("text")),
        }
    }

    /// Coerce to a calendar date, dropping any time of day.
    pub fn as_date(&self) -> Result<NaiveDate, ValidationErrorKind> {
        match self {
            SqlValue::Null => Err(ValidationErrorKind::Missing),
            SqlValue::Date(d) => Ok(*d),
            SqlValue::DateTime(dt) => Ok(dt.date()),
            SqlValue::Text(s) => parse_date_text(s.trim()).ok_or_else(|| {
                ValidationErrorKind::TypeMismatch {
                    expected: "date",
                    found: format!("text {:?}", s),
                }
            }),
            other => Err(other.mismatch("date")),
        }
    }

    /// Coerce to a decimal. Floats are rounded half away from zero to one digit.
    pub fn as_decimal(&self) -> Result<Decimal, ValidationErrorKind> {
        match self {
            SqlValue::Null => Err(ValidationErrorKind::Missing),
            SqlValue::Decimal(d) => Ok(*d),
            SqlValue::I64(i) => Ok(Decimal::from(*i)),
            SqlValue::F64(f) => Decimal::from_f64(*f)
                .map(|d| d.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
                .ok_or_else(|| ValidationErrorKind::TypeMismatch {
                    expected: "decimal",
                    found: format!("real {}", f),
                }),
            SqlValue::Text(s) => Decimal::from_str(s.trim()).map_err(|_| {
                ValidationErrorKind::TypeMismatch {
                    expected: "decimal",
                    found: format!("text {:?}", s),
                }
            }),
            other => Err(other.mismatch("decimal")),
        }
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.date_naive());
        }
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{:?}", v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
        }
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}
