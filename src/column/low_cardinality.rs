//! LowCardinality column: dictionary encoding for columns with few unique
//! values.
//!
//! Wire format:
//!
//! ```text
//! prefix: key serialization version (u64, always 1)
//! body:   index serialization type (u64: width tag | flag bits)
//!         dictionary size (u64)
//!         dictionary values (nested column body)
//!         row count (u64)
//!         indices (u8/u16/u32/u64 × rows)
//! ```

use super::{
    create_column,
    Column,
    Value,
};
use crate::{
    io::SegmentedBytes,
    types::Type,
    Error,
    Result,
};
use bytes::{
    BufMut,
    BytesMut,
};

const KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS: u64 = 1;

const INDEX_WIDTH_MASK: u64 = 0xFF;
const NEED_GLOBAL_DICTIONARY_BIT: u64 = 1 << 8;
const HAS_ADDITIONAL_KEYS_BIT: u64 = 1 << 9;

/// `LowCardinality(T)` column.
pub struct ColumnLowCardinality {
    type_: Type,
    dictionary: Box<dyn Column>,
    indices: Vec<u64>,
}

impl ColumnLowCardinality {
    /// Create an empty column from its parsed type.
    pub fn new(type_: Type) -> Result<Self> {
        let dictionary = match &type_ {
            Type::LowCardinality(inner) => create_column(inner)?,
            other => {
                return Err(Error::Validation(format!(
                    "ColumnLowCardinality requires LowCardinality, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, dictionary, indices: Vec::new() })
    }

    /// Number of unique values in the dictionary.
    pub fn dictionary_len(&self) -> usize {
        self.dictionary.len()
    }

    /// Append a value, reusing its dictionary slot when already present.
    /// Dictionaries are small by design, so the scan stays cheap.
    pub fn append(&mut self, value: &Value) -> Result<()> {
        for i in 0..self.dictionary.len() {
            if self.dictionary.value_at(i).as_ref() == Some(value) {
                self.indices.push(i as u64);
                return Ok(());
            }
        }
        self.dictionary.append_value(value)?;
        self.indices.push((self.dictionary.len() - 1) as u64);
        Ok(())
    }

    fn index_width_tag(&self) -> u64 {
        match self.dictionary.len() {
            0..=0xFF => 0,
            0x100..=0xFFFF => 1,
            0x1_0000..=0xFFFF_FFFF => 2,
            _ => 3,
        }
    }
}

impl Column for ColumnLowCardinality {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn load_prefix(&mut self, source: &mut SegmentedBytes) -> Result<()> {
        let version = u64::from_le_bytes(source.read_array::<8>()?);
        if version != KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS {
            return Err(Error::Protocol(format!(
                "Unknown LowCardinality key version: {}",
                version
            )));
        }
        Ok(())
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let serialization = u64::from_le_bytes(source.read_array::<8>()?);
        if serialization & NEED_GLOBAL_DICTIONARY_BIT != 0 {
            return Err(Error::Protocol(
                "Global LowCardinality dictionaries are not supported"
                    .to_string(),
            ));
        }
        let width_tag = serialization & INDEX_WIDTH_MASK;

        let dictionary_len =
            u64::from_le_bytes(source.read_array::<8>()?) as usize;
        if dictionary_len > 0 {
            self.dictionary.load_body(source, dictionary_len)?;
        }

        let index_count =
            u64::from_le_bytes(source.read_array::<8>()?) as usize;
        if index_count != rows {
            return Err(Error::Protocol(format!(
                "LowCardinality row count mismatch: expected {}, got {}",
                rows, index_count
            )));
        }

        self.indices.reserve(rows);
        match width_tag {
            0 => {
                let span = source.read_span(rows)?;
                for &byte in span.iter() {
                    self.indices.push(byte as u64);
                }
            }
            1 => {
                let span = source.read_span(rows * 2)?;
                for chunk in span.chunks_exact(2) {
                    self.indices.push(u16::from_le_bytes(
                        chunk.try_into().unwrap(),
                    ) as u64);
                }
            }
            2 => {
                let span = source.read_span(rows * 4)?;
                for chunk in span.chunks_exact(4) {
                    self.indices.push(u32::from_le_bytes(
                        chunk.try_into().unwrap(),
                    ) as u64);
                }
            }
            3 => {
                let span = source.read_span(rows * 8)?;
                for chunk in span.chunks_exact(8) {
                    self.indices.push(u64::from_le_bytes(
                        chunk.try_into().unwrap(),
                    ));
                }
            }
            other => {
                return Err(Error::Protocol(format!(
                    "Unknown LowCardinality index width tag: {}",
                    other
                )))
            }
        }

        let dictionary_len = self.dictionary.len() as u64;
        if self.indices.iter().any(|&i| i >= dictionary_len) {
            return Err(Error::Protocol(
                "LowCardinality index out of dictionary range".to_string(),
            ));
        }
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_u64_le(KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS);
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        let width_tag = self.index_width_tag();
        buffer.put_u64_le(width_tag | HAS_ADDITIONAL_KEYS_BIT);
        buffer.put_u64_le(self.dictionary.len() as u64);
        if self.dictionary.len() > 0 {
            self.dictionary.save_body(buffer)?;
        }
        buffer.put_u64_le(self.indices.len() as u64);
        match width_tag {
            0 => {
                for &index in &self.indices {
                    buffer.put_u8(index as u8);
                }
            }
            1 => {
                for &index in &self.indices {
                    buffer.put_u16_le(index as u16);
                }
            }
            2 => {
                for &index in &self.indices {
                    buffer.put_u32_le(index as u32);
                }
            }
            _ => {
                for &index in &self.indices {
                    buffer.put_u64_le(index);
                }
            }
        }
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        let slot = *self.indices.get(index)? as usize;
        self.dictionary.value_at(slot)
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        self.append(value)
    }

    fn append_default(&mut self) {
        if matches!(self.dictionary.column_type(), Type::Nullable(_)) {
            // Nullable dictionaries share one NULL slot
            if self.append(&Value::Null).is_ok() {
                return;
            }
        }
        self.dictionary.append_default();
        self.indices.push((self.dictionary.len() - 1) as u64);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
