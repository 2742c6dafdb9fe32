//! Conversion of TDS column data into displayable values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tiberius::{ColumnData, FromSql, Row};
use uuid::Uuid;

/// A single result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, if it holds one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::U8(v) => Some(i64::from(*v)),
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Decimal(v) => v.trunc().to_string().parse().ok(),
            SqlValue::String(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value; `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Convert one decoded TDS cell.
    pub fn from_column_data(data: ColumnData<'static>) -> Self {
        match data {
            ColumnData::U8(v) => v.map_or(SqlValue::Null, SqlValue::U8),
            ColumnData::I16(v) => v.map_or(SqlValue::Null, SqlValue::I16),
            ColumnData::I32(v) => v.map_or(SqlValue::Null, SqlValue::I32),
            ColumnData::I64(v) => v.map_or(SqlValue::Null, SqlValue::I64),
            ColumnData::F32(v) => v.map_or(SqlValue::Null, SqlValue::F32),
            ColumnData::F64(v) => v.map_or(SqlValue::Null, SqlValue::F64),
            ColumnData::Bit(v) => v.map_or(SqlValue::Null, SqlValue::Bool),
            ColumnData::String(v) => v.map_or(SqlValue::Null, |s| SqlValue::String(s.into_owned())),
            ColumnData::Guid(v) => v.map_or(SqlValue::Null, SqlValue::Uuid),
            ColumnData::Binary(v) => v.map_or(SqlValue::Null, |b| SqlValue::Bytes(b.into_owned())),
            ColumnData::Xml(v) => v.map_or(SqlValue::Null, |x| SqlValue::String(x.into_owned().into_string())),
            ColumnData::Numeric(_) => decode(&data, SqlValue::Decimal),
            ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
                decode(&data, SqlValue::DateTime)
            }
            ColumnData::Date(_) => decode(&data, SqlValue::Date),
            ColumnData::Time(_) => decode(&data, SqlValue::Time),
            ColumnData::DateTimeOffset(_) => decode(&data, SqlValue::DateTimeUtc),
        }
    }
}

/// Decode through tiberius' own conversions; undecodable cells become NULL.
fn decode<'a, T, F>(data: &'a ColumnData<'static>, wrap: F) -> SqlValue
where
    T: FromSql<'a>,
    F: FnOnce(T) -> SqlValue,
{
    match T::from_sql(data) {
        Ok(Some(value)) => wrap(value),
        _ => SqlValue::Null,
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::U8(v) => write!(f, "{}", v),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::String(v) => f.write_str(v),
            SqlValue::Bytes(v) => {
                f.write_str("0x")?;
                for b in v {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
            SqlValue::DateTimeUtc(v) => f.write_str(&v.to_rfc3339()),
        }
    }
}

/// Conversions from tiberius rows.
pub struct TypeMapper;

impl TypeMapper {
    /// Take every cell of a row, in column order.
    pub fn row_values(row: Row) -> Vec<SqlValue> {
        row.into_iter().map(SqlValue::from_column_data).collect()
    }
}
