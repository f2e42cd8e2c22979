//! Enum8 and Enum16 columns. The payload is the plain integer
//! discriminant; the name/value mapping stays in the type spec.

use super::{
    numeric::ColumnVector,
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

macro_rules! enum_column {
    ($name:ident, $elem:ty, $variant:ident, $value_variant:ident) => {
        /// Enum column backed by the matching integer width.
        pub struct $name {
            type_: Type,
            items: Vec<(String, $elem)>,
            inner: ColumnVector<$elem>,
        }

        impl $name {
            /// Create an empty column from its parsed type.
            pub fn new(type_: Type) -> Result<Self> {
                let items = match &type_ {
                    Type::$variant(items) => items.clone(),
                    other => {
                        return Err(Error::Validation(format!(
                            "{} requires {}, got {}",
                            stringify!($name),
                            stringify!($variant),
                            other.name()
                        )))
                    }
                };
                Ok(Self {
                    inner: ColumnVector::with_type(type_.clone()),
                    type_,
                    items,
                })
            }

            /// Append by discriminant; the value must exist in the mapping.
            pub fn append(&mut self, value: $elem) -> Result<()> {
                if !self.items.iter().any(|(_, v)| *v == value) {
                    return Err(Error::Validation(format!(
                        "Value {} is not a member of {}",
                        value,
                        self.type_.name()
                    )));
                }
                self.inner.append(value);
                Ok(())
            }

            /// Append by name.
            pub fn append_name(&mut self, name: &str) -> Result<()> {
                let value = self
                    .items
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| {
                        Error::Validation(format!(
                            "'{}' is not a member of {}",
                            name,
                            self.type_.name()
                        ))
                    })?;
                self.inner.append(value);
                Ok(())
            }

            /// The name for a discriminant, if it is in the mapping.
            pub fn name_of(&self, value: $elem) -> Option<&str> {
                self.items
                    .iter()
                    .find(|(_, v)| *v == value)
                    .map(|(n, _)| n.as_str())
            }

            /// Discriminant at `index`, panicking past the end.
            pub fn at(&self, index: usize) -> $elem {
                self.inner.at(index)
            }
        }

        impl Column for $name {
            fn column_type(&self) -> &Type {
                &self.type_
            }

            fn len(&self) -> usize {
                self.inner.len()
            }

            fn load_body(
                &mut self,
                source: &mut SegmentedBytes,
                rows: usize,
            ) -> Result<()> {
                self.inner.load_body(source, rows)
            }

            fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
                self.inner.save_body(buffer)
            }

            fn value_at(&self, index: usize) -> Option<Value> {
                self.inner
                    .data()
                    .get(index)
                    .map(|&v| Value::$value_variant(v))
            }

            fn append_value(&mut self, value: &Value) -> Result<()> {
                match value {
                    Value::$value_variant(v) => self.append(*v),
                    Value::String(name) => self.append_name(name),
                    other => Err(Error::TypeMismatch {
                        expected: self.type_.name(),
                        actual: format!("{:?}", other),
                    }),
                }
            }

            fn append_default(&mut self) {
                let value = self
                    .items
                    .first()
                    .map(|(_, v)| *v)
                    .unwrap_or_default();
                self.inner.append(value);
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

enum_column!(ColumnEnum8, i8, Enum8, Enum8);
enum_column!(ColumnEnum16, i16, Enum16, Enum16);

#[cfg(test)]
mod tests {
    use super::*;

    fn color_type() -> Type {
        Type::parse("Enum8('red' = 1, 'green' = 2, 'blue' = 3)").unwrap()
    }

    #[test]
    fn test_enum8_roundtrip() {
        let mut column = ColumnEnum8::new(color_type()).unwrap();
        column.append_name("red").unwrap();
        column.append(3).unwrap();

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();
        assert_eq!(&buffer[..], &[1, 3]);

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnEnum8::new(color_type()).unwrap();
        decoded.load_body(&mut source, 2).unwrap();
        assert_eq!(decoded.value_at(0), Some(Value::Enum8(1)));
        assert_eq!(decoded.value_at(1), Some(Value::Enum8(3)));
        assert_eq!(decoded.name_of(decoded.at(1)), Some("blue"));
    }

    #[test]
    fn test_enum8_rejects_unknown() {
        let mut column = ColumnEnum8::new(color_type()).unwrap();
        assert!(column.append(7).is_err());
        assert!(column.append_name("magenta").is_err());
    }

    #[test]
    fn test_enum16_negative_values() {
        let type_ =
            Type::parse("Enum16('low' = -300, 'high' = 300)").unwrap();
        let mut column = ColumnEnum16::new(type_.clone()).unwrap();
        column.append(-300).unwrap();
        column.append_name("high").unwrap();

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 4);

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnEnum16::new(type_).unwrap();
        decoded.load_body(&mut source, 2).unwrap();
        assert_eq!(decoded.value_at(0), Some(Value::Enum16(-300)));
        assert_eq!(decoded.value_at(1), Some(Value::Enum16(300)));
    }
}
