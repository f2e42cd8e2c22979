//! IPv4 and IPv6 columns.
//!
//! IPv4 is the numeric address as a little-endian u32; IPv6 is 16 bytes in
//! network order.

use super::{
    numeric::ColumnVector,
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
use std::net::{
    Ipv4Addr,
    Ipv6Addr,
};

/// IPv4 column, backed by u32 address values.
pub struct ColumnIpv4 {
    inner: ColumnVector<u32>,
}

impl ColumnIpv4 {
    /// Create an empty IPv4 column.
    pub fn new() -> Self {
        Self { inner: ColumnVector::with_type(Type::Ipv4) }
    }

    /// Append one address.
    pub fn append(&mut self, addr: Ipv4Addr) {
        self.inner.append(u32::from(addr));
    }

    /// Address at `index`, panicking past the end.
    pub fn at(&self, index: usize) -> Ipv4Addr {
        Ipv4Addr::from(self.inner.at(index))
    }
}

impl Default for ColumnIpv4 {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnIpv4 {
    fn column_type(&self) -> &Type {
        self.inner.column_type()
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
            .map(|&bits| Value::Ipv4(Ipv4Addr::from(bits)))
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Ipv4(addr) => {
                self.append(*addr);
                Ok(())
            }
            other => Err(crate::Error::TypeMismatch {
                expected: "IPv4".to_string(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append(Ipv4Addr::UNSPECIFIED);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// IPv6 column: 16 network-order bytes per value.
pub struct ColumnIpv6 {
    data: Vec<Ipv6Addr>,
}

impl ColumnIpv6 {
    /// Create an empty IPv6 column.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Append one address.
    pub fn append(&mut self, addr: Ipv6Addr) {
        self.data.push(addr);
    }

    /// Address at `index`, panicking past the end.
    pub fn at(&self, index: usize) -> Ipv6Addr {
        self.data[index]
    }

    /// The stored addresses.
    pub fn data(&self) -> &[Ipv6Addr] {
        &self.data
    }
}

impl Default for ColumnIpv6 {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnIpv6 {
    fn column_type(&self) -> &Type {
        static IPV6: Type = Type::Ipv6;
        &IPV6
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
            let octets: [u8; 16] = chunk.try_into().unwrap();
            self.data.push(Ipv6Addr::from(octets));
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.reserve(self.data.len() * 16);
        for addr in &self.data {
            buffer.put_slice(&addr.octets());
        }
        Ok(())
    }

    fn value_at(&self, index: usize) -> Option<Value> {
        self.data.get(index).map(|&addr| Value::Ipv6(addr))
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Ipv6(addr) => {
                self.append(*addr);
                Ok(())
            }
            other => Err(crate::Error::TypeMismatch {
                expected: "IPv6".to_string(),
                actual: format!("{:?}", other),
            }),
        }
    }

    fn append_default(&mut self) {
        self.append(Ipv6Addr::UNSPECIFIED);
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_roundtrip() {
        let mut column = ColumnIpv4::new();
        column.append(Ipv4Addr::new(127, 0, 0, 1));
        column.append(Ipv4Addr::new(10, 20, 30, 40));
        column.append(Ipv4Addr::UNSPECIFIED);

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 12);

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnIpv4::new();
        decoded.load_body(&mut source, 3).unwrap();
        assert_eq!(decoded.at(0), Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(decoded.at(1), Ipv4Addr::new(10, 20, 30, 40));
        assert_eq!(decoded.at(2), Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn test_ipv4_wire_is_le_of_numeric_value() {
        let mut column = ColumnIpv4::new();
        column.append(Ipv4Addr::new(1, 2, 3, 4));

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();
        // 0x01020304 little-endian
        assert_eq!(&buffer[..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_ipv6_roundtrip() {
        let addr: Ipv6Addr = "2001:db8::8a2e:370:7334".parse().unwrap();
        let mut column = ColumnIpv6::new();
        column.append(addr);
        column.append(Ipv6Addr::LOCALHOST);

        let mut buffer = BytesMut::new();
        column.save_body(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 32);
        // Network byte order on the wire
        assert_eq!(&buffer[..16], &addr.octets());

        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        let mut decoded = ColumnIpv6::new();
        decoded.load_body(&mut source, 2).unwrap();
        assert_eq!(decoded.at(0), addr);
        assert_eq!(decoded.at(1), Ipv6Addr::LOCALHOST);
    }
}
