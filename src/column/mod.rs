//! Column codecs for the native protocol.
//!
//! Every ClickHouse type family has one module here implementing the
//! [`Column`] trait: an in-memory columnar buffer that knows how to load
//! itself from a block byte source and save itself into a block buffer.
//! Columns are built from a parsed [`Type`] via [`create_column`]; the
//! codec for nested types composes recursively.
//!
//! ClickHouse enforces nesting rules the factory mirrors: `Nullable` may
//! only wrap scalar-like types (no `Nullable(Array(..))`, no
//! `Nullable(LowCardinality(..))`).

/// Array column (`Array(T)`).
pub mod array;
/// Date and DateTime columns.
pub mod date;
/// Decimal columns across all backing widths.
pub mod decimal;
/// Enum8 and Enum16 columns.
pub mod enumeration;
/// 256-bit integer limb type and columns.
pub mod int256;
/// IPv4 and IPv6 columns.
pub mod ip;
/// LowCardinality column (dictionary encoding).
pub mod low_cardinality;
/// Map column (`Map(K, V)`), carried as `Array(Tuple(K, V))`.
pub mod map;
/// Nothing/Void column.
pub mod nothing;
/// Nullable column (`Nullable(T)`).
pub mod nullable;
/// Integer, float, and bool columns.
pub mod numeric;
/// String, FixedString, and JSON-as-String columns.
pub mod string;
/// Tuple column (`Tuple(T1, T2, ...)`).
pub mod tuple;
/// UUID column.
pub mod uuid;
/// Row values projected out of columns.
pub mod value;

pub use array::ColumnArray;
pub use date::{
    ColumnDate,
    ColumnDate32,
    ColumnDateTime,
    ColumnDateTime64,
};
pub use decimal::ColumnDecimal;
pub use enumeration::{
    ColumnEnum16,
    ColumnEnum8,
};
pub use int256::{
    I256,
    U256,
};
pub use ip::{
    ColumnIpv4,
    ColumnIpv6,
};
pub use low_cardinality::ColumnLowCardinality;
pub use map::ColumnMap;
pub use nothing::ColumnNothing;
pub use nullable::ColumnNullable;
pub use numeric::{
    ColumnBool,
    ColumnFloat32,
    ColumnFloat64,
    ColumnInt128,
    ColumnInt16,
    ColumnInt256,
    ColumnInt32,
    ColumnInt64,
    ColumnInt8,
    ColumnUInt128,
    ColumnUInt16,
    ColumnUInt256,
    ColumnUInt32,
    ColumnUInt64,
    ColumnUInt8,
    ColumnVector,
};
pub use string::{
    ColumnFixedString,
    ColumnString,
};
pub use tuple::ColumnTuple;
pub use uuid::ColumnUuid;
pub use value::{
    FromValue,
    Value,
};

use crate::{
    io::SegmentedBytes,
    types::Type,
    Error,
    Result,
};
use bytes::BytesMut;
use std::sync::Arc;

/// Shared reference to a loaded column.
pub type ColumnRef = Arc<dyn Column>;

/// One column of a block: a typed, columnar value buffer with a wire codec.
pub trait Column: Send + Sync {
    /// The column's type.
    fn column_type(&self) -> &Type;

    /// Number of rows.
    fn len(&self) -> usize;

    /// Whether the column has no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read per-column prefix data emitted once before the block body.
    /// Only LowCardinality has one.
    fn load_prefix(&mut self, _source: &mut SegmentedBytes) -> Result<()> {
        Ok(())
    }

    /// Read `rows` values from the block byte source.
    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()>;

    /// Write per-column prefix data. Only LowCardinality has one.
    fn save_prefix(&self, _buffer: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    /// Write all values into the block buffer.
    fn save_body(&self, buffer: &mut BytesMut) -> Result<()>;

    /// Project the value at `index`, or `None` past the end.
    fn value_at(&self, index: usize) -> Option<Value>;

    /// Append a projected value; the variant must match the column type.
    fn append_value(&mut self, value: &Value) -> Result<()>;

    /// Append this type's default value (placeholder under a nullmask).
    fn append_default(&mut self);

    /// Downcast support.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Build an empty column for a parsed type. Fails on type nestings the
/// server itself rejects and on types this client cannot decode.
pub fn create_column(type_: &Type) -> Result<Box<dyn Column>> {
    match type_ {
        Type::Int8 => Ok(Box::new(ColumnInt8::new())),
        Type::Int16 => Ok(Box::new(ColumnInt16::new())),
        Type::Int32 => Ok(Box::new(ColumnInt32::new())),
        Type::Int64 => Ok(Box::new(ColumnInt64::new())),
        Type::Int128 => Ok(Box::new(ColumnInt128::new())),
        Type::Int256 => Ok(Box::new(ColumnInt256::new())),
        Type::UInt8 => Ok(Box::new(ColumnUInt8::new())),
        Type::UInt16 => Ok(Box::new(ColumnUInt16::new())),
        Type::UInt32 => Ok(Box::new(ColumnUInt32::new())),
        Type::UInt64 => Ok(Box::new(ColumnUInt64::new())),
        Type::UInt128 => Ok(Box::new(ColumnUInt128::new())),
        Type::UInt256 => Ok(Box::new(ColumnUInt256::new())),
        Type::Float32 => Ok(Box::new(ColumnFloat32::new())),
        Type::Float64 => Ok(Box::new(ColumnFloat64::new())),
        Type::Bool => Ok(Box::new(ColumnBool::new())),
        Type::String | Type::Json => {
            Ok(Box::new(ColumnString::new(type_.clone())))
        }
        Type::FixedString(size) => {
            Ok(Box::new(ColumnFixedString::new(*size)))
        }
        Type::Date => Ok(Box::new(ColumnDate::new())),
        Type::Date32 => Ok(Box::new(ColumnDate32::new())),
        Type::DateTime { .. } => {
            Ok(Box::new(ColumnDateTime::new(type_.clone())))
        }
        Type::DateTime64 { .. } => {
            Ok(Box::new(ColumnDateTime64::new(type_.clone())?))
        }
        Type::Uuid => Ok(Box::new(ColumnUuid::new())),
        Type::Ipv4 => Ok(Box::new(ColumnIpv4::new())),
        Type::Ipv6 => Ok(Box::new(ColumnIpv6::new())),
        Type::Enum8(_) => Ok(Box::new(ColumnEnum8::new(type_.clone())?)),
        Type::Enum16(_) => Ok(Box::new(ColumnEnum16::new(type_.clone())?)),
        Type::Decimal { .. } => {
            Ok(Box::new(ColumnDecimal::new(type_.clone())?))
        }
        Type::Nullable(inner) => {
            if matches!(
                inner.as_ref(),
                Type::Array(_)
                    | Type::Tuple(_)
                    | Type::Map(_, _)
                    | Type::LowCardinality(_)
                    | Type::Nullable(_)
            ) {
                return Err(Error::UnsupportedType(format!(
                    "{} cannot be inside Nullable",
                    inner.name()
                )));
            }
            Ok(Box::new(ColumnNullable::new(type_.clone())?))
        }
        Type::Array(_) => Ok(Box::new(ColumnArray::new(type_.clone())?)),
        Type::Tuple(_) => Ok(Box::new(ColumnTuple::new(type_.clone())?)),
        Type::Map(_, _) => Ok(Box::new(ColumnMap::new(type_.clone())?)),
        Type::LowCardinality(_) => {
            Ok(Box::new(ColumnLowCardinality::new(type_.clone())?))
        }
        Type::Nothing => Ok(Box::new(ColumnNothing::new())),
    }
}

/// Build a column and load `rows` values from the source.
pub fn load_column(
    type_: &Type,
    source: &mut SegmentedBytes,
    rows: usize,
) -> Result<Box<dyn Column>> {
    let mut column = create_column(type_)?;
    column.load_prefix(source)?;
    if rows > 0 {
        column.load_body(source, rows)?;
    }
    Ok(column)
}
