//! Decimal columns. The payload is a contiguous run of backing integers
//! whose width follows from the precision; the scale lives in the type spec.

use super::{
    int256::I256,
    Column,
    Value,
};
use crate::{
    io::SegmentedBytes,
    types::{
        DecimalWidth,
        Type,
    },
    Error,
    Result,
};
use bytes::{
    BufMut,
    BytesMut,
};

/// One decimal column across every backing width. Values up to 128 bits
/// are held as i128; Decimal256 values as [`I256`].
pub struct ColumnDecimal {
    type_: Type,
    width: DecimalWidth,
    scale: u32,
    narrow: Vec<i128>,
    wide: Vec<I256>,
}

impl ColumnDecimal {
    /// Create an empty decimal column from its parsed type.
    pub fn new(type_: Type) -> Result<Self> {
        let (width, scale) = match &type_ {
            Type::Decimal { precision, scale } => {
                let width = DecimalWidth::for_precision(*precision)
                    .ok_or_else(|| {
                        Error::Validation(format!(
                            "Decimal precision {} out of range",
                            precision
                        ))
                    })?;
                (width, *scale)
            }
            other => {
                return Err(Error::Validation(format!(
                    "ColumnDecimal requires Decimal, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self {
            type_,
            width,
            scale,
            narrow: Vec::new(),
            wide: Vec::new(),
        })
    }

    /// Digits after the decimal point.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Backing width.
    pub fn width(&self) -> DecimalWidth {
        self.width
    }

    /// Append an unscaled backing value. Out-of-width values are rejected.
    pub fn append_unscaled(&mut self, unscaled: i128) -> Result<()> {
        let fits = match self.width {
            DecimalWidth::W32 => {
                i32::try_from(unscaled).is_ok()
            }
            DecimalWidth::W64 => i64::try_from(unscaled).is_ok(),
            DecimalWidth::W128 | DecimalWidth::W256 => true,
        };
        if !fits {
            return Err(Error::Validation(format!(
                "Unscaled value {} does not fit {}",
                unscaled,
                self.type_.name()
            )));
        }
        match self.width {
            DecimalWidth::W256 => self.wide.push(I256::from_i128(unscaled)),
            _ => self.narrow.push(unscaled),
        }
        Ok(())
    }

    /// Append a 256-bit unscaled backing value.
    pub fn append_unscaled_wide(&mut self, unscaled: I256) -> Result<()> {
        if self.width != DecimalWidth::W256 {
            return Err(Error::Validation(format!(
                "{} does not take 256-bit values",
                self.type_.name()
            )));
        }
        self.wide.push(unscaled);
        Ok(())
    }
}

impl Column for ColumnDecimal {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        match self.width {
            DecimalWidth::W256 => self.wide.len(),
            _ => self.narrow.len(),
        }
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let span = source.read_span(rows * self.width.byte_len())?;
        match self.width {
            DecimalWidth::W32 => {
                for chunk in span.chunks_exact(4) {
                    self.narrow.push(i32::from_le_bytes(
                        chunk.try_into().unwrap(),
                    ) as i128);
                }
            }
            DecimalWidth::W64 => {
                for chunk in span.chunks_exact(8) {
                    self.narrow.push(i64::from_le_bytes(
                        chunk.try_into().unwrap(),
                    ) as i128);
                }
            }
            DecimalWidth::W128 => {
                for chunk in span.chunks_exact(16) {
                    self.narrow.push(i128::from_le_bytes(
                        chunk.try_into().unwrap(),
                    ));
                }
            }
            DecimalWidth::W256 => {
                for chunk in span.chunks_exact(32) {
                    self.wide.push(I256(chunk.try_into().unwrap()));
                }
            }
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        match self.width {
            DecimalWidth::W32 => {
                for &value in &self.narrow {
                    buffer.put_i32_le(value as i32);
                }
            }
            DecimalWidth::W64 => {
                for &value in &self.narrow {
                    buffer.put_i64_le(value as i64);
                }
            }
            DecimalWidth::W128 => {
                for &value in &self.narrow {
                    buffer.put_i128_le(value);
                }
            }
            DecimalWidth::W256 => {
                for value in &self.wide {
                    buffer.put_slice(&value.0);
                }
            }
        }
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        match self.width {
            DecimalWidth::W256 => {
                self.wide.get(index).map(|&unscaled| Value::Decimal256 {
                    unscaled,
                    scale: self.scale,
                })
            }
            _ => self.narrow.get(index).map(|&unscaled| Value::Decimal {
                unscaled,
                scale: self.scale,
            }),
        }
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Decimal { unscaled, scale } if *scale == self.scale => {
                self.append_unscaled(*unscaled)
            }
            Value::Decimal256 { unscaled, scale }
                if *scale == self.scale =>
            {
                self.append_unscaled_wide(*unscaled)
            }
            other => Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        match self.width {
            DecimalWidth::W256 => self.wide.push(I256::default()),
            _ => self.narrow.push(0),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
