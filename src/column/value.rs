//! Row values projected out of columns, and conversions into host types.

use super::int256::{
    I256,
    U256,
};
use crate::{
    Error,
    Result,
};
use chrono::{
    DateTime,
    NaiveDate,
    Utc,
};
use std::net::{
    Ipv4Addr,
    Ipv6Addr,
};

/// A single cell of a result block.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Bool.
    Bool(bool),
    /// Int8.
    Int8(i8),
    /// Int16.
    Int16(i16),
    /// Int32.
    Int32(i32),
    /// Int64.
    Int64(i64),
    /// Int128.
    Int128(i128),
    /// Int256.
    Int256(I256),
    /// UInt8.
    UInt8(u8),
    /// UInt16.
    UInt16(u16),
    /// UInt32.
    UInt32(u32),
    /// UInt64.
    UInt64(u64),
    /// UInt128.
    UInt128(u128),
    /// UInt256.
    UInt256(U256),
    /// Float32.
    Float32(f32),
    /// Float64.
    Float64(f64),
    /// String or JSON document.
    String(String),
    /// FixedString payload, trailing zero bytes included.
    FixedString(Vec<u8>),
    /// Date / Date32.
    Date(NaiveDate),
    /// DateTime, second precision, UTC.
    DateTime(DateTime<Utc>),
    /// DateTime64 ticks of 10^-precision seconds.
    DateTime64 {
        /// Ticks since the epoch.
        ticks: i64,
        /// Sub-second precision.
        precision: u32,
    },
    /// UUID.
    Uuid(uuid::Uuid),
    /// IPv4 address.
    Ipv4(Ipv4Addr),
    /// IPv6 address.
    Ipv6(Ipv6Addr),
    /// Enum8 discriminant.
    Enum8(i8),
    /// Enum16 discriminant.
    Enum16(i16),
    /// Decimal with backing value and scale (widths up to 128 bits).
    Decimal {
        /// Unscaled backing integer.
        unscaled: i128,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Decimal256 with backing value and scale.
    Decimal256 {
        /// Unscaled 256-bit backing integer.
        unscaled: I256,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// Array of values.
    Array(Vec<Value>),
    /// Tuple of values.
    Tuple(Vec<Value>),
    /// Map entries in insertion order.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Whether this cell is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Int128(_) => "Int128",
            Value::Int256(_) => "Int256",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::UInt128(_) => "UInt128",
            Value::UInt256(_) => "UInt256",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::String(_) => "String",
            Value::FixedString(_) => "FixedString",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::DateTime64 { .. } => "DateTime64",
            Value::Uuid(_) => "UUID",
            Value::Ipv4(_) => "IPv4",
            Value::Ipv6(_) => "IPv6",
            Value::Enum8(_) => "Enum8",
            Value::Enum16(_) => "Enum16",
            Value::Decimal { .. } => "Decimal",
            Value::Decimal256 { .. } => "Decimal256",
            Value::Array(_) => "Array",
            Value::Tuple(_) => "Tuple",
            Value::Map(_) => "Map",
        }
    }
}

/// Conversion from a projected [`Value`] into a host type.
pub trait FromValue: Sized {
    /// Convert, failing with [`Error::TypeMismatch`] on the wrong variant.
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(Error::TypeMismatch {
        expected: expected.to_string(),
        actual: value.type_label().to_string(),
    })
}

macro_rules! impl_from_value_int {
    ($rust:ty, $label:expr, $($variant:ident),+) => {
        impl FromValue for $rust {
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    $(Value::$variant(v) => {
                        <$rust>::try_from(v).map_err(|_| Error::Mapping(
                            format!("{} out of range for {}", stringify!($variant), $label),
                        ))
                    })+
                    other => mismatch($label, &other),
                }
            }
        }
    };
}

impl_from_value_int!(i8, "i8", Int8, Enum8);
impl_from_value_int!(i16, "i16", Int8, Int16, UInt8, Enum16);
impl_from_value_int!(i32, "i32", Int8, Int16, Int32, UInt8, UInt16);
impl_from_value_int!(
    i64, "i64", Int8, Int16, Int32, Int64, UInt8, UInt16, UInt32
);
impl_from_value_int!(
    i128, "i128", Int8, Int16, Int32, Int64, Int128, UInt8, UInt16, UInt32,
    UInt64
);
impl_from_value_int!(u8, "u8", UInt8, Int8);
impl_from_value_int!(u16, "u16", UInt8, UInt16, Int8, Int16);
impl_from_value_int!(u32, "u32", UInt8, UInt16, UInt32, Int8, Int16, Int32);
impl_from_value_int!(
    u64, "u64", UInt8, UInt16, UInt32, UInt64, Int8, Int16, Int32, Int64
);
impl_from_value_int!(
    u128, "u128", UInt8, UInt16, UInt32, UInt64, UInt128, Int8, Int16, Int32,
    Int64, Int128
);

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::UInt8(b) => Ok(b != 0),
            other => mismatch("bool", &other),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(v) => Ok(v),
            other => mismatch("f32", &other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float64(v) => Ok(v),
            Value::Float32(v) => Ok(v as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            Value::FixedString(bytes) => {
                let trimmed: Vec<u8> = bytes
                    .iter()
                    .rev()
                    .skip_while(|&&b| b == 0)
                    .copied()
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                String::from_utf8(trimmed)
                    .map_err(|e| Error::Mapping(format!("Invalid UTF-8: {}", e)))
            }
            other => mismatch("String", &other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::FixedString(bytes) => Ok(bytes),
            Value::String(s) => Ok(s.into_bytes()),
            other => mismatch("Vec<u8>", &other),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(d),
            other => mismatch("Date", &other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => mismatch("DateTime", &other),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(u) => Ok(u),
            other => mismatch("UUID", &other),
        }
    }
}

impl FromValue for Ipv4Addr {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Ipv4(addr) => Ok(addr),
            other => mismatch("IPv4", &other),
        }
    }
}

impl FromValue for Ipv6Addr {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Ipv6(addr) => Ok(addr),
            other => mismatch("IPv6", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            other => mismatch("Array", &other),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}
