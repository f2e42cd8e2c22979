//! Tuple column: each element's payload concatenated in declaration
//! order, every element carrying `num_rows` values.

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
use bytes::BytesMut;

/// `Tuple(T1, T2, ...)` column.
pub struct ColumnTuple {
    type_: Type,
    elements: Vec<Box<dyn Column>>,
    rows: usize,
}

impl ColumnTuple {
    /// Create an empty tuple column from its parsed type.
    pub fn new(type_: Type) -> Result<Self> {
        let elements = match &type_ {
            Type::Tuple(items) => items
                .iter()
                .map(create_column)
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(Error::Validation(format!(
                    "ColumnTuple requires Tuple, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, elements, rows: 0 })
    }

    /// Append one tuple of values, one per element column.
    pub fn append(&mut self, items: &[Value]) -> Result<()> {
        if items.len() != self.elements.len() {
            return Err(Error::Validation(format!(
                "Tuple arity mismatch: expected {}, got {}",
                self.elements.len(),
                items.len()
            )));
        }
        for (column, item) in self.elements.iter_mut().zip(items) {
            column.append_value(item)?;
        }
        self.rows += 1;
        Ok(())
    }

    /// The element columns.
    pub fn elements(&self) -> &[Box<dyn Column>] {
        &self.elements
    }
}

impl Column for ColumnTuple {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn load_prefix(&mut self, source: &mut SegmentedBytes) -> Result<()> {
        for element in &mut self.elements {
            element.load_prefix(source)?;
        }
        Ok(())
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        for element in &mut self.elements {
            element.load_body(source, rows)?;
        }
        self.rows += rows;
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        for element in &self.elements {
            element.save_prefix(buffer)?;
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for element in &self.elements {
            element.save_body(buffer)?;
        }
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        if index >= self.rows {
            return None;
        }
        let items: Option<Vec<Value>> = self
            .elements
            .iter()
            .map(|element| element.value_at(index))
            .collect();
        items.map(Value::Tuple)
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Tuple(items) => self.append(items),
            other => Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        for element in &mut self.elements {
            element.append_default();
        }
        self.rows += 1;
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
