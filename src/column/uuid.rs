//! UUID column. Each value is 16 bytes on the wire: the high u64 half
//! little-endian, then the low u64 half little-endian, matching the
//! server's UInt128 limb order.

use super::{
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
use uuid::Uuid;

/// UUID column.
pub struct ColumnUuid {
    data: Vec<Uuid>,
}

impl ColumnUuid {
    /// Create an empty UUID column.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Create from existing values.
    pub fn from_vec(data: Vec<Uuid>) -> Self {
        Self { data }
    }

    /// Append one value.
    pub fn append(&mut self, value: Uuid) {
        self.data.push(value);
    }

    /// Value at `index`, panicking past the end.
    pub fn at(&self, index: usize) -> Uuid {
        self.data[index]
    }

    /// The stored values.
    pub fn data(&self) -> &[Uuid] {
        &self.data
    }
}

impl Default for ColumnUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnUuid {
    fn column_type(&self) -> &Type {
        static UUID: Type = Type::Uuid;
        &UUID
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let span = source.read_span(rows * 16)?;
        self.data.reserve(rows);
        for chunk in span.chunks_exact(16) {
            let high = u64::from_le_bytes(chunk[..8].try_into().unwrap());
            let low = u64::from_le_bytes(chunk[8..].try_into().unwrap());
            self.data
                .push(Uuid::from_u128(((high as u128) << 64) | low as u128));
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.reserve(self.data.len() * 16);
        for value in &self.data {
            let bits = value.as_u128();
            buffer.put_u64_le((bits >> 64) as u64);
            buffer.put_u64_le(bits as u64);
        }
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.data.get(index).map(|&u| Value::Uuid(u))
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Uuid(u) => {
                self.append(*u);
                Ok(())
            }
            other => Err(crate::Error::TypeMismatch {
                expected: "UUID".to_string(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append(Uuid::nil());
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
