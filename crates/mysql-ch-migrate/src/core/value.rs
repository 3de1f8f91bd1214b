//! SQL value types for the canonical row representation.
//!
//! Every row that moves through the migration, from the metadata probe to the
//! streaming cursor to the bulk insert, is an ordered `Vec<SqlValue>` aligned to
//! a resolved column-name sequence. Temporal values are normalized to fixed
//! string layouts at read time so a batch never holds driver-specific types.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

/// Layout used for DATETIME/TIMESTAMP values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Layout used for DATE values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Layout used for TIME values.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// One column value of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer of any width.
    Int(i64),

    /// Unsigned integer of any width.
    UInt(u64),

    /// Floating point of any width.
    Float(f64),

    /// Exact decimal.
    Decimal(Decimal),

    /// Text, including normalized temporal values.
    Text(String),

    /// Raw bytes (BLOB/BINARY).
    Bytes(Vec<u8>),
}

/// An ordered row aligned to the resolved column order.
pub type Row = Vec<SqlValue>;

impl SqlValue {
    /// Normalize a timestamp to its fixed text layout.
    #[must_use]
    pub fn from_datetime(v: NaiveDateTime) -> Self {
        SqlValue::Text(v.format(DATETIME_FORMAT).to_string())
    }

    /// Normalize a date to its fixed text layout.
    #[must_use]
    pub fn from_date(v: NaiveDate) -> Self {
        SqlValue::Text(v.format(DATE_FORMAT).to_string())
    }

    /// Normalize a time of day to its fixed text layout.
    #[must_use]
    pub fn from_time(v: NaiveTime) -> Self {
        SqlValue::Text(v.format(TIME_FORMAT).to_string())
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// JSON representation of a scalar value.
    ///
    /// Decimals travel as strings to keep their precision and non-finite
    /// floats become NULL. Bytes become an array of byte values; the insert
    /// path writes text and bytes itself so they reach ClickHouse verbatim.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(v) => JsonValue::Bool(*v),
            SqlValue::Int(v) => JsonValue::from(*v),
            SqlValue::UInt(v) => JsonValue::from(*v),
            SqlValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            SqlValue::Decimal(v) => JsonValue::String(v.to_string()),
            SqlValue::Text(v) => JsonValue::String(v.clone()),
            SqlValue::Bytes(v) => JsonValue::Array(v.iter().map(|b| JsonValue::from(*b)).collect()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
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

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::from_datetime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::from_date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// A bounded buffer of rows between two bulk writes.
///
/// The buffer keeps its allocation across [`Batch::clear`] so a transfer holds
/// at most `capacity` rows at any time.
#[derive(Debug)]
pub struct Batch {
    rows: Vec<Row>,
    capacity: usize,
}

impl Batch {
    /// Create an empty batch that is full at `capacity` rows.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one row.
    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Rows currently buffered.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the batch reached its configured size.
    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop the buffered rows after a successful write.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporal_values_are_normalized() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 0)
            .unwrap();
        assert_eq!(
            SqlValue::from(dt),
            SqlValue::Text("2024-03-09 07:05:00".to_string())
        );

        let d = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(SqlValue::from(d), SqlValue::Text("1999-12-31".to_string()));

        let t = NaiveTime::from_hms_opt(23, 59, 1).unwrap();
        assert_eq!(SqlValue::from_time(t), SqlValue::Text("23:59:01".to_string()));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(SqlValue::Null.to_json(), JsonValue::Null);
        assert_eq!(SqlValue::Int(-4).to_json(), serde_json::json!(-4));
        assert_eq!(SqlValue::UInt(u64::MAX).to_json(), serde_json::json!(u64::MAX));
        assert_eq!(SqlValue::Float(f64::NAN).to_json(), JsonValue::Null);
        assert_eq!(
            SqlValue::Decimal(Decimal::new(12345, 2)).to_json(),
            serde_json::json!("123.45")
        );
        assert_eq!(
            SqlValue::Bytes(vec![0xFF, 0x00]).to_json(),
            serde_json::json!([255, 0])
        );
    }

    #[test]
    fn test_option_into_value() {
        let none: Option<i64> = None;
        assert!(SqlValue::from(none).is_null());
        assert_eq!(SqlValue::from(Some(5i64)), SqlValue::Int(5));
    }

    #[test]
    fn test_batch_fills_and_clears() {
        let mut batch = Batch::new(2);
        assert!(batch.is_empty());
        batch.push(vec![SqlValue::Int(1)]);
        assert!(!batch.is_full());
        batch.push(vec![SqlValue::Int(2)]);
        assert!(batch.is_full());
        assert_eq!(batch.len(), 2);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.capacity(), 2);
    }

    #[test]
    fn test_batch_zero_capacity_is_clamped() {
        let batch = Batch::new(0);
        assert_eq!(batch.capacity(), 1);
    }
}
