//! Array column: `num_rows` cumulative u64 offsets, then the flattened
//! inner payload whose row count is the last offset.

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

/// `Array(T)` column.
pub struct ColumnArray {
    type_: Type,
    offsets: Vec<u64>,
    nested: Box<dyn Column>,
}

impl ColumnArray {
    /// Create an empty array column from its parsed type.
    pub fn new(type_: Type) -> Result<Self> {
        let nested = match &type_ {
            Type::Array(inner) => create_column(inner)?,
            other => {
                return Err(Error::Validation(format!(
                    "ColumnArray requires Array, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, offsets: Vec::new(), nested })
    }

    /// Append one array of values.
    pub fn append(&mut self, items: &[Value]) -> Result<()> {
        for item in items {
            self.nested.append_value(item)?;
        }
        self.offsets.push(self.nested.len() as u64);
        Ok(())
    }

    /// Element range of the array at `index`.
    fn bounds(&self, index: usize) -> Option<(usize, usize)> {
        let end = *self.offsets.get(index)? as usize;
        let start = if index == 0 {
            0
        } else {
            self.offsets[index - 1] as usize
        };
        Some((start, end))
    }

    /// Length of the array at `index`.
    pub fn array_len(&self, index: usize) -> Option<usize> {
        self.bounds(index).map(|(start, end)| end - start)
    }
}

impl Column for ColumnArray {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn load_prefix(&mut self, source: &mut SegmentedBytes) -> Result<()> {
        self.nested.load_prefix(source)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.nested.save_prefix(buffer)
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let span = source.read_span(rows * 8)?;
        self.offsets.reserve(rows);
        for chunk in span.chunks_exact(8) {
            self.offsets
                .push(u64::from_le_bytes(chunk.try_into().unwrap()));
        }
        drop(span);

        // Offsets must be non-decreasing; the final one sizes the payload
        for pair in self.offsets.windows(2) {
            if pair[1] < pair[0] {
                return Err(Error::Protocol(
                    "Array offsets are not monotonic".to_string(),
                ));
            }
        }
        let total = self.offsets.last().copied().unwrap_or(0) as usize;
        if total > 0 {
            self.nested.load_body(source, total)?;
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buffer.put_u64_le(offset);
        }
        if self.nested.len() > 0 {
            self.nested.save_body(buffer)?;
        }
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        let (start, end) = self.bounds(index)?;
        let items: Option<Vec<Value>> =
            (start..end).map(|i| self.nested.value_at(i)).collect();
        items.map(Value::Array)
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Array(items) => self.append(items),
            other => Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.offsets.push(self.nested.len() as u64);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_roundtrip() {
        let type_ = Type::parse("Array(UInt32)").unwrap();
        let mut column = ColumnArray::new(type_.clone()).unwrap();
        column
            .append(&[Value::UInt32(1), Value::UInt32(2), Value::UInt32(3)])
            .unwrap();
        column.append(&[]).unwrap();
        column.append(&[Value::UInt32(42)]).unwrap();

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();
        // 3 offsets (3, 3, 4) then 4 elements
        assert_eq!(buffer.len(), 3 * 8 + 4 * 4);

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnArray::new(type_).unwrap();
        decoded.load_body(&mut source, 3).unwrap();

        assert_eq!(
            decoded.value_at(0),
            Some(Value::Array(vec![
                Value::UInt32(1),
                Value::UInt32(2),
                Value::UInt32(3)
            ]))
        );
        assert_eq!(decoded.value_at(1), Some(Value::Array(vec![])));
        assert_eq!(
            decoded.value_at(2),
            Some(Value::Array(vec![Value::UInt32(42)]))
        );
        assert_eq!(decoded.array_len(0), Some(3));
        assert_eq!(decoded.array_len(1), Some(0));
    }

    #[test]
    fn test_nested_array_roundtrip() {
        let type_ = Type::parse("Array(Array(String))").unwrap();
        let mut column = ColumnArray::new(type_.clone()).unwrap();
        column
            .append(&[
                Value::Array(vec![Value::String("a".to_string())]),
                Value::Array(vec![
                    Value::String("b".to_string()),
                    Value::String("c".to_string()),
                ]),
            ])
            .unwrap();

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnArray::new(type_).unwrap();
        decoded.load_body(&mut source, 1).unwrap();

        assert_eq!(decoded.value_at(0), column.value_at(0));
    }

    #[test]
    fn test_non_monotonic_offsets_rejected() {
        let mut buffer = BytesMut::new();
        buffer.put_u64_le(5);
        buffer.put_u64_le(2);

        let type_ = Type::parse("Array(UInt8)").unwrap();
        let mut column = ColumnArray::new(type_).unwrap();
        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        assert!(column.load_body(&mut source, 2).is_err());
    }
}
