//! Integer, float, and bool columns.
//!
//! Every numeric payload is `num_rows` contiguous little-endian values, so
//! one generic [`ColumnVector`] covers the whole family; the named aliases
//! fix the element type the way the protocol names them.

use super::{
    int256::{
        I256,
        U256,
    },
    Column,
    Value,
};
use crate::{
    io::SegmentedBytes,
    types::Type,
    Result,
};
use bytes::{
    BufMut,
    BytesMut,
};

/// A fixed-width little-endian wire element.
pub trait FixedWire: Sized + Copy + Send + Sync + 'static {
    /// Bytes one element occupies on the wire.
    const WIDTH: usize;

    /// Decode from exactly `WIDTH` little-endian bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding.
    fn put_le(&self, buffer: &mut BytesMut);

    /// Wrap into the matching [`Value`] variant.
    fn into_value(self) -> Value;

    /// Unwrap from the matching [`Value`] variant.
    fn from_value(value: &Value) -> Option<Self>;

    /// The zero element, used as a placeholder under nullmasks.
    fn zero() -> Self;
}

macro_rules! impl_fixed_wire {
    ($type:ty, $width:expr, $put:ident, $variant:ident) => {
        impl FixedWire for $type {
            const WIDTH: usize = $width;

            fn from_le_slice(bytes: &[u8]) -> Self {
                <$type>::from_le_bytes(bytes[..$width].try_into().unwrap())
            }

            fn put_le(&self, buffer: &mut BytesMut) {
                buffer.$put(*self);
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    _ => None,
                }
            }

            fn zero() -> Self {
                0 as $type
            }
        }
    };
}

impl_fixed_wire!(u8, 1, put_u8, UInt8);
impl_fixed_wire!(u16, 2, put_u16_le, UInt16);
impl_fixed_wire!(u32, 4, put_u32_le, UInt32);
impl_fixed_wire!(u64, 8, put_u64_le, UInt64);
impl_fixed_wire!(u128, 16, put_u128_le, UInt128);
impl_fixed_wire!(i8, 1, put_i8, Int8);
impl_fixed_wire!(i16, 2, put_i16_le, Int16);
impl_fixed_wire!(i32, 4, put_i32_le, Int32);
impl_fixed_wire!(i64, 8, put_i64_le, Int64);
impl_fixed_wire!(i128, 16, put_i128_le, Int128);
impl_fixed_wire!(f32, 4, put_f32_le, Float32);
impl_fixed_wire!(f64, 8, put_f64_le, Float64);

/// Generic column over any fixed-width element.
pub struct ColumnVector<T: FixedWire> {
    type_: Type,
    data: Vec<T>,
}

impl<T: FixedWire> ColumnVector<T> {
    /// Create an empty column with an explicit type.
    pub fn with_type(type_: Type) -> Self {
        Self { type_, data: Vec::new() }
    }

    /// Create from existing data.
    pub fn from_vec(type_: Type, data: Vec<T>) -> Self {
        Self { type_, data }
    }

    /// Append one value.
    pub fn append(&mut self, value: T) {
        self.data.push(value);
    }

    /// Value at `index`, panicking past the end.
    pub fn at(&self, index: usize) -> T {
        self.data[index]
    }

    /// The raw element slice.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Bulk-load `rows` contiguous elements from the source.
    pub(crate) fn load_elements(
        data: &mut Vec<T>,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let span = source.read_span(rows * T::WIDTH)?;
        data.reserve(rows);
        for chunk in span.chunks_exact(T::WIDTH) {
            data.push(T::from_le_slice(chunk));
        }
        Ok(())
    }

    /// Bulk-save all elements.
    pub(crate) fn save_elements(data: &[T], buffer: &mut BytesMut) {
        buffer.reserve(data.len() * T::WIDTH);
        for value in data {
            value.put_le(buffer);
        }
    }
}

impl<T: FixedWire> Column for ColumnVector<T> {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        Self::load_elements(&mut self.data, source, rows)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        Self::save_elements(&self.data, buffer);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.data.get(index).map(|v| v.into_value())
    }

    fn append_value(&mut self, value: &Value) -> crate::Result<()> {
        let typed = T::from_value(value).ok_or_else(|| {
            crate::Error::TypeMismatch {
                expected: self.type_.name(),
                actual: format!("{:?}", value),
            }
        })?;
        self.data.push(typed);
        Ok(())
    }

    fn append_default(&mut self) {
        self.data.push(T::zero());
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

macro_rules! named_column {
    ($name:ident, $elem:ty, $type_ctor:expr) => {
        /// Named numeric column alias.
        pub struct $name;

        impl $name {
            /// Create an empty column of this type.
            #[allow(clippy::new_ret_no_self)]
            pub fn new() -> ColumnVector<$elem> {
                ColumnVector::with_type($type_ctor)
            }

            /// Create a column holding `data`.
            pub fn from_vec(data: Vec<$elem>) -> ColumnVector<$elem> {
                ColumnVector::from_vec($type_ctor, data)
            }
        }
    };
}

named_column!(ColumnInt8, i8, Type::Int8);
named_column!(ColumnInt16, i16, Type::Int16);
named_column!(ColumnInt32, i32, Type::Int32);
named_column!(ColumnInt64, i64, Type::Int64);
named_column!(ColumnInt128, i128, Type::Int128);
named_column!(ColumnInt256, I256, Type::Int256);
named_column!(ColumnUInt8, u8, Type::UInt8);
named_column!(ColumnUInt16, u16, Type::UInt16);
named_column!(ColumnUInt32, u32, Type::UInt32);
named_column!(ColumnUInt64, u64, Type::UInt64);
named_column!(ColumnUInt128, u128, Type::UInt128);
named_column!(ColumnUInt256, U256, Type::UInt256);
named_column!(ColumnFloat32, f32, Type::Float32);
named_column!(ColumnFloat64, f64, Type::Float64);

/// Bool column, carried as UInt8 0/1 on the wire.
pub struct ColumnBool {
    data: Vec<u8>,
}

impl ColumnBool {
    /// Create an empty bool column.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Append one value.
    pub fn append(&mut self, value: bool) {
        self.data.push(value as u8);
    }

    /// Value at `index`, panicking past the end.
    pub fn at(&self, index: usize) -> bool {
        self.data[index] != 0
    }
}

impl Default for ColumnBool {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnBool {
    fn column_type(&self) -> &Type {
        static BOOL: Type = Type::Bool;
        &BOOL
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let span = source.read_span(rows)?;
        self.data.extend_from_slice(&span);
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_slice(&self.data);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.data.get(index).map(|&b| Value::Bool(b != 0))
    }

    fn append_value(&mut self, value: &Value) -> crate::Result<()> {
        match value {
            Value::Bool(b) => {
                self.append(*b);
                Ok(())
            }
            Value::UInt8(b) => {
                self.append(*b != 0);
                Ok(())
            }
            other => Err(crate::Error::TypeMismatch {
                expected: "Bool".to_string(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append(false);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
