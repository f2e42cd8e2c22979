//! Nullable column: a u8 nullmask (1 = null) for every row, followed by
//! the nested payload carrying a placeholder value for null rows.

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

/// `Nullable(T)` column.
pub struct ColumnNullable {
    type_: Type,
    nulls: Vec<u8>,
    nested: Box<dyn Column>,
}

impl ColumnNullable {
    /// Create an empty nullable column from its parsed type.
    pub fn new(type_: Type) -> Result<Self> {
        let nested = match &type_ {
            Type::Nullable(inner) => create_column(inner)?,
            other => {
                return Err(Error::Validation(format!(
                    "ColumnNullable requires Nullable, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, nulls: Vec::new(), nested })
    }

    /// Append NULL; the nested column receives a placeholder.
    pub fn append_null(&mut self) {
        self.nulls.push(1);
        self.nested.append_default();
    }

    /// Append a non-null value.
    pub fn append(&mut self, value: &Value) -> Result<()> {
        self.nested.append_value(value)?;
        self.nulls.push(0);
        Ok(())
    }

    /// Whether the row at `index` is NULL.
    pub fn is_null(&self, index: usize) -> bool {
        self.nulls.get(index).map(|&b| b != 0).unwrap_or(false)
    }

    /// The nested column.
    pub fn nested(&self) -> &dyn Column {
        self.nested.as_ref()
    }
}

impl Column for ColumnNullable {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.nulls.len()
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let mask = source.read_span(rows)?;
        self.nulls.extend_from_slice(&mask);
        drop(mask);
        self.nested.load_body(source, rows)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_slice(&self.nulls);
        self.nested.save_body(buffer)
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        if index >= self.nulls.len() {
            return None;
        }
        if self.nulls[index] != 0 {
            Some(Value::Null)
        } else {
            self.nested.value_at(index)
        }
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => {
                self.append_null();
                Ok(())
            }
            other => self.append(other),
        }
    }

    fn append_default(&mut self) {
        self.append_null();
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
