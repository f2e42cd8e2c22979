//! 256-bit integers, carried as 32 little-endian bytes (four u64 limbs,
//! low limb first) exactly as they appear on the wire.

use super::{
    numeric::FixedWire,
    Value,
};
use bytes::{
    BufMut,
    BytesMut,
};

/// Unsigned 256-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U256(pub [u8; 32]);

/// Signed 256-bit integer, two's complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct I256(pub [u8; 32]);

impl U256 {
    /// Build from a u128, zero-extending the high limbs.
    pub fn from_u128(value: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(&value.to_le_bytes());
        U256(bytes)
    }

    /// The low 128 bits.
    pub fn low_u128(&self) -> u128 {
        u128::from_le_bytes(self.0[..16].try_into().unwrap())
    }
}

impl I256 {
    /// Build from an i128, sign-extending the high limbs.
    pub fn from_i128(value: i128) -> Self {
        let fill = if value < 0 { 0xFF } else { 0x00 };
        let mut bytes = [fill; 32];
        bytes[..16].copy_from_slice(&value.to_le_bytes());
        I256(bytes)
    }

    /// The low 128 bits, reinterpreted as signed.
    pub fn low_i128(&self) -> i128 {
        i128::from_le_bytes(self.0[..16].try_into().unwrap())
    }

    /// Whether the sign bit is set.
    pub fn is_negative(&self) -> bool {
        self.0[31] & 0x80 != 0
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        U256::from_u128(value)
    }
}

impl From<i128> for I256 {
    fn from(value: i128) -> Self {
        I256::from_i128(value)
    }
}

impl FixedWire for U256 {
    const WIDTH: usize = 32;

    fn from_le_slice(bytes: &[u8]) -> Self {
        U256(bytes[..32].try_into().unwrap())
    }

    fn put_le(&self, buffer: &mut BytesMut) {
        buffer.put_slice(&self.0);
    }

    fn into_value(self) -> Value {
        Value::UInt256(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::UInt256(v) => Some(*v),
            _ => None,
        }
    }

    fn zero() -> Self {
        U256::default()
    }
}

impl FixedWire for I256 {
    const WIDTH: usize = 32;

    fn from_le_slice(bytes: &[u8]) -> Self {
        I256(bytes[..32].try_into().unwrap())
    }

    fn put_le(&self, buffer: &mut BytesMut) {
        buffer.put_slice(&self.0);
    }

    fn into_value(self) -> Value {
        Value::Int256(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int256(v) => Some(*v),
            _ => None,
        }
    }

    fn zero() -> Self {
        I256::default()
    }
}
