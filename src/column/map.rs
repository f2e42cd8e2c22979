//! Map column. `Map(K, V)` is carried on the wire exactly like
//! `Array(Tuple(K, V))`: cumulative offsets, then the flattened key and
//! value payloads in tuple layout.

use super::{
    array::ColumnArray,
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

/// `Map(K, V)` column.
pub struct ColumnMap {
    type_: Type,
    inner: ColumnArray,
}

impl ColumnMap {
    /// Create an empty map column from its parsed type.
    pub fn new(type_: Type) -> Result<Self> {
        let inner_type = match &type_ {
            Type::Map(key, value) => Type::Array(Box::new(Type::Tuple(
                vec![key.as_ref().clone(), value.as_ref().clone()],
            ))),
            other => {
                return Err(Error::Validation(format!(
                    "ColumnMap requires Map, got {}",
                    other.name()
                )))
            }
        };
        Ok(Self { type_, inner: ColumnArray::new(inner_type)? })
    }

    /// Append one map of entries.
    pub fn append(&mut self, entries: &[(Value, Value)]) -> Result<()> {
        let tuples: Vec<Value> = entries
            .iter()
            .map(|(key, value)| {
                Value::Tuple(vec![key.clone(), value.clone()])
            })
            .collect();
        self.inner.append(&tuples)
    }
}

impl Column for ColumnMap {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn load_prefix(&mut self, source: &mut SegmentedBytes) -> Result<()> {
        self.inner.load_prefix(source)
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        self.inner.load_body(source, rows)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.inner.save_prefix(buffer)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        self.inner.save_body(buffer)
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        match self.inner.value_at(index)? {
            Value::Array(tuples) => {
                let entries: Option<Vec<(Value, Value)>> = tuples
                    .into_iter()
                    .map(|tuple| match tuple {
                        Value::Tuple(mut pair) if pair.len() == 2 => {
                            let value = pair.pop().unwrap();
                            let key = pair.pop().unwrap();
                            Some((key, value))
                        }
                        _ => None,
                    })
                    .collect();
                entries.map(Value::Map)
            }
            _ => None,
        }
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Map(entries) => self.append(entries),
            other => Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.inner.append_default();
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_roundtrip() {
        let type_ = Type::parse("Map(String, UInt64)").unwrap();
        let mut column = ColumnMap::new(type_.clone()).unwrap();
        column
            .append(&[
                (Value::String("a".to_string()), Value::UInt64(1)),
                (Value::String("b".to_string()), Value::UInt64(2)),
            ])
            .unwrap();
        column.append(&[]).unwrap();

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnMap::new(type_).unwrap();
        decoded.load_body(&mut source, 2).unwrap();

        assert_eq!(
            decoded.value_at(0),
            Some(Value::Map(vec![
                (Value::String("a".to_string()), Value::UInt64(1)),
                (Value::String("b".to_string()), Value::UInt64(2)),
            ]))
        );
        assert_eq!(decoded.value_at(1), Some(Value::Map(vec![])));
    }

    #[test]
    fn test_map_wire_matches_array_of_tuples() {
        let map_type = Type::parse("Map(UInt8, UInt8)").unwrap();
        let mut map_column = ColumnMap::new(map_type).unwrap();
        map_column
            .append(&[(Value::UInt8(1), Value::UInt8(10))])
            .unwrap();

        let array_type = Type::parse("Array(Tuple(UInt8, UInt8))").unwrap();
        let mut array_column = ColumnArray::new(array_type).unwrap();
        array_column
            .append(&[Value::Tuple(vec![Value::UInt8(1), Value::UInt8(10)])])
            .unwrap();

        let mut map_buffer = BytesMut::new();
        map_column.save_body(&mut map_buffer).unwrap();
        let mut array_buffer = BytesMut::new();
        array_column.save_body(&mut array_buffer).unwrap();

        assert_eq!(&map_buffer[..], &array_buffer[..]);
    }
}
