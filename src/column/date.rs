//! Date and DateTime columns.
//!
//! Wire layouts:
//! - `Date` — u16 days since 1970-01-01
//! - `Date32` — i32 days since 1970-01-01
//! - `DateTime` — u32 seconds since the epoch, UTC
//! - `DateTime64(p)` — i64 ticks of 10^-p seconds

use super::{
    numeric::ColumnVector,
    Column,
    Value,
};
use crate::{
    io::SegmentedBytes,
    types::Type,
    Error,
    Result,
};
use bytes::BytesMut;
use chrono::{
    DateTime,
    Duration,
    NaiveDate,
    TimeZone,
    Utc,
};

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// `Date` column: u16 days since the epoch.
pub struct ColumnDate {
    inner: ColumnVector<u16>,
}

impl ColumnDate {
    /// Create an empty Date column.
    pub fn new() -> Self {
        Self { inner: ColumnVector::with_type(Type::Date) }
    }

    /// Append a date; dates before 1970 or past the u16 range are rejected.
    pub fn append(&mut self, date: NaiveDate) -> Result<()> {
        let days = (date - epoch_date()).num_days();
        let days = u16::try_from(days).map_err(|_| {
            Error::Validation(format!("{} out of Date range", date))
        })?;
        self.inner.append(days);
        Ok(())
    }

    /// Append a raw day count.
    pub fn append_days(&mut self, days: u16) {
        self.inner.append(days);
    }
}

impl Default for ColumnDate {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnDate {
    fn column_type(&self) -> &Type {
        self.inner.column_type()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        self.inner.load_body(source, rows)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        self.inner.save_body(buffer)
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.inner.data().get(index).map(|&days| {
            Value::Date(epoch_date() + Duration::days(days as i64))
        })
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Date(d) => self.append(*d),
            other => Err(Error::TypeMismatch {
                expected: "Date".to_string(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append_days(0);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// `Date32` column: i32 days since the epoch, covering dates before 1970.
pub struct ColumnDate32 {
    inner: ColumnVector<i32>,
}

impl ColumnDate32 {
    /// Create an empty Date32 column.
    pub fn new() -> Self {
        Self { inner: ColumnVector::with_type(Type::Date32) }
    }

    /// Append a date.
    pub fn append(&mut self, date: NaiveDate) {
        let days = (date - epoch_date()).num_days() as i32;
        self.inner.append(days);
    }
}

impl Default for ColumnDate32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnDate32 {
    fn column_type(&self) -> &Type {
        self.inner.column_type()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        self.inner.load_body(source, rows)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        self.inner.save_body(buffer)
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.inner.data().get(index).map(|&days| {
            Value::Date(epoch_date() + Duration::days(days as i64))
        })
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Date(d) => {
                self.append(*d);
                Ok(())
            }
            other => Err(Error::TypeMismatch {
                expected: "Date32".to_string(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append(epoch_date());
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// `DateTime` column: u32 seconds since the epoch. The type spec's timezone
/// only affects display; values are UTC on the wire.
pub struct ColumnDateTime {
    type_: Type,
    inner: ColumnVector<u32>,
}

impl ColumnDateTime {
    /// Create an empty DateTime column; `type_` carries the timezone.
    pub fn new(type_: Type) -> Self {
        Self {
            inner: ColumnVector::with_type(type_.clone()),
            type_,
        }
    }

    /// Append a timestamp; pre-epoch and post-2106 instants are rejected.
    pub fn append(&mut self, instant: DateTime<Utc>) -> Result<()> {
        let seconds = u32::try_from(instant.timestamp()).map_err(|_| {
            Error::Validation(format!("{} out of DateTime range", instant))
        })?;
        self.inner.append(seconds);
        Ok(())
    }

    /// Append raw epoch seconds.
    pub fn append_seconds(&mut self, seconds: u32) {
        self.inner.append(seconds);
    }
}

impl Column for ColumnDateTime {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        self.inner.load_body(source, rows)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        self.inner.save_body(buffer)
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.inner.data().get(index).map(|&seconds| {
            Value::DateTime(Utc.timestamp_opt(seconds as i64, 0).unwrap())
        })
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::DateTime(dt) => self.append(*dt),
            other => Err(Error::TypeMismatch {
                expected: "DateTime".to_string(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append_seconds(0);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// `DateTime64(p)` column: i64 ticks of 10^-p seconds.
pub struct ColumnDateTime64 {
    type_: Type,
    precision: u32,
    inner: ColumnVector<i64>,
}

impl ColumnDateTime64 {
    /// Create an empty DateTime64 column from its type.
    pub fn new(type_: Type) -> Result<Self> {
        let precision = match &type_ {
            Type::DateTime64 { precision, .. } => *precision,
            other => {
                return Err(Error::Validation(format!(
                    "ColumnDateTime64 requires DateTime64, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self {
            inner: ColumnVector::with_type(type_.clone()),
            type_,
            precision,
        })
    }

    /// Sub-second precision from the type spec.
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Append raw ticks.
    pub fn append_ticks(&mut self, ticks: i64) {
        self.inner.append(ticks);
    }

    /// Append a timestamp, scaled to this column's precision.
    pub fn append(&mut self, instant: DateTime<Utc>) {
        let nanos = instant.timestamp_nanos_opt().unwrap_or(0);
        let divisor = 10i64.pow(9 - self.precision);
        self.inner.append(nanos / divisor);
    }
}

impl Column for ColumnDateTime64 {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        self.inner.load_body(source, rows)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        self.inner.save_body(buffer)
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.inner.data().get(index).map(|&ticks| Value::DateTime64 {
            ticks,
            precision: self.precision,
        })
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::DateTime64 { ticks, precision }
                if *precision == self.precision =>
            {
                self.append_ticks(*ticks);
                Ok(())
            }
            Value::DateTime(dt) => {
                self.append(*dt);
                Ok(())
            }
            other => Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append_ticks(0);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_roundtrip() {
        let mut column = ColumnDate::new();
        column
            .append(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            .unwrap();
        column
            .append(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
            .unwrap();

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnDate::new();
        decoded.load_body(&mut source, 2).unwrap();

        assert_eq!(
            decoded.value_at(0),
            Some(Value::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()))
        );
        assert_eq!(
            decoded.value_at(1),
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
    }

    #[test]
    fn test_date_out_of_range() {
        let mut column = ColumnDate::new();
        assert!(column
            .append(NaiveDate::from_ymd_opt(1969, 12, 31).unwrap())
            .is_err());
        assert!(column
            .append(NaiveDate::from_ymd_opt(2200, 1, 1).unwrap())
            .is_err());
    }

    #[test]
    fn test_date32_covers_pre_epoch() {
        let mut column = ColumnDate32::new();
        column.append(NaiveDate::from_ymd_opt(1955, 6, 1).unwrap());

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnDate32::new();
        decoded.load_body(&mut source, 1).unwrap();
        assert_eq!(
            decoded.value_at(0),
            Some(Value::Date(NaiveDate::from_ymd_opt(1955, 6, 1).unwrap()))
        );
    }

    #[test]
    fn test_datetime_roundtrip() {
        let instant = Utc.with_ymd_and_hms(2023, 7, 14, 12, 30, 45).unwrap();
        let mut column = ColumnDateTime::new(Type::DateTime {
            timezone: Some("UTC".to_string()),
        });
        column.append(instant).unwrap();

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 4);

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnDateTime::new(Type::DateTime {
            timezone: Some("UTC".to_string()),
        });
        decoded.load_body(&mut source, 1).unwrap();
        assert_eq!(decoded.value_at(0), Some(Value::DateTime(instant)));
    }

    #[test]
    fn test_datetime64_precisions() {
        for precision in [0u32, 3, 6, 9] {
            let type_ =
                Type::DateTime64 { precision, timezone: None };
            let mut column = ColumnDateTime64::new(type_.clone()).unwrap();
            column.append_ticks(1_234_567);
            column.append_ticks(-42);

            let mut buffer = BytesMut::new();
            column.save_body(&mut buffer).unwrap();

            let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
            let mut decoded = ColumnDateTime64::new(type_).unwrap();
            decoded.load_body(&mut source, 2).unwrap();
            assert_eq!(
                decoded.value_at(0),
                Some(Value::DateTime64 { ticks: 1_234_567, precision })
            );
            assert_eq!(
                decoded.value_at(1),
                Some(Value::DateTime64 { ticks: -42, precision })
            );
        }
    }

    #[test]
    fn test_datetime64_append_scales() {
        let instant = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 1).unwrap();
        let mut column = ColumnDateTime64::new(Type::DateTime64 {
            precision: 3,
            timezone: None,
        })
        .unwrap();
        column.append(instant);
        assert_eq!(
            column.value_at(0),
            Some(Value::DateTime64 {
                ticks: instant.timestamp_millis(),
                precision: 3
            })
        );
    }
}
