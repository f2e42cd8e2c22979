//! The Nothing column: one placeholder byte per row on the wire. Appears
//! in results such as `SELECT NULL`.

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

/// `Nothing` column.
pub struct ColumnNothing {
    rows: usize,
}

impl ColumnNothing {
    /// Create an empty Nothing column.
    pub fn new() -> Self {
        Self { rows: 0 }
    }
}

impl Default for ColumnNothing {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnNothing {
    fn column_type(&self) -> &Type {
        static NOTHING: Type = Type::Nothing;
        &NOTHING
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let _ = source.read_span(rows)?;
        self.rows += rows;
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_bytes(0, self.rows);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        (index < self.rows).then_some(Value::Null)
    }

    fn append_value(&mut self, _value: &Value) -> Result<()> {
        self.rows += 1;
        Ok(())
    }

    fn append_default(&mut self) {
        self.rows += 1;
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
