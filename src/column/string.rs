//! String, FixedString, and JSON-as-String columns.

use super::{
    Column,
    Value,
};
use crate::{
    io::{
        buffer_utils,
        SegmentedBytes,
    },
    types::Type,
    Error,
    Result,
};
use bytes::{
    BufMut,
    BytesMut,
};

/// Variable-length string column. `num_rows` varint-prefixed UTF-8
/// payloads back-to-back on the wire. Also carries JSON documents when the
/// server serializes them as strings.
pub struct ColumnString {
    type_: Type,
    data: Vec<String>,
}

impl ColumnString {
    /// Create an empty column; `type_` is `String` or `JSON`.
    pub fn new(type_: Type) -> Self {
        Self { type_, data: Vec::new() }
    }

    /// Create a plain String column holding `data`.
    pub fn from_vec(data: Vec<String>) -> Self {
        Self { type_: Type::String, data }
    }

    /// Append one value.
    pub fn append(&mut self, value: impl Into<String>) {
        self.data.push(value.into());
    }

    /// Value at `index`, panicking past the end.
    pub fn at(&self, index: usize) -> &str {
        &self.data[index]
    }

    /// The stored strings.
    pub fn data(&self) -> &[String] {
        &self.data
    }
}

impl Column for ColumnString {
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
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(source.read_string()?);
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for value in &self.data {
            buffer_utils::write_string(buffer, value);
        }
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.data.get(index).map(|s| Value::String(s.clone()))
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::String(s) => {
                self.append(s.clone());
                Ok(())
            }
            other => Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append("");
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Fixed-width byte string column: `num_rows × N` raw bytes. Short appends
/// are zero-padded to the width, as the server does.
pub struct ColumnFixedString {
    type_: Type,
    width: usize,
    data: Vec<u8>,
}

impl ColumnFixedString {
    /// Create an empty column of the given width.
    pub fn new(width: usize) -> Self {
        Self {
            type_: Type::FixedString(width),
            width,
            data: Vec::new(),
        }
    }

    /// The fixed width in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Append one value, zero-padded; longer payloads are rejected.
    pub fn append(&mut self, value: &[u8]) -> Result<()> {
        if value.len() > self.width {
            return Err(Error::Validation(format!(
                "FixedString({}) cannot hold {} bytes",
                self.width,
                value.len()
            )));
        }
        self.data.extend_from_slice(value);
        self.data
            .extend(std::iter::repeat(0u8).take(self.width - value.len()));
        Ok(())
    }

    /// Raw bytes of the value at `index`.
    pub fn at(&self, index: usize) -> &[u8] {
        &self.data[index * self.width..(index + 1) * self.width]
    }
}

impl Column for ColumnFixedString {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    fn load_body(
        &mut self,
        source: &mut SegmentedBytes,
        rows: usize,
    ) -> Result<()> {
        let span = source.read_span(rows * self.width)?;
        self.data.extend_from_slice(&span);
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_slice(&self.data);
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        if index >= self.len() {
            return None;
        }
        Some(Value::FixedString(self.at(index).to_vec()))
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::FixedString(bytes) => self.append(bytes),
            Value::String(s) => self.append(s.as_bytes()),
            other => Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.data.extend(std::iter::repeat(0u8).take(self.width));
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
