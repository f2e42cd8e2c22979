//! The ClickHouse type system.
//!
//! A column's wire layout is fully determined by its type spec string (e.g.
//! `Nullable(Array(DateTime64(3, 'UTC')))`). [`Type::parse`] turns that
//! string into a [`Type`] tree; the column codecs are keyed on the variants.

mod parser;

pub use parser::parse_type_spec;

/// Decimal backing width, derived from precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalWidth {
    /// 32-bit backing integer (precision 1..=9).
    W32,
    /// 64-bit backing integer (precision 10..=18).
    W64,
    /// 128-bit backing integer (precision 19..=38).
    W128,
    /// 256-bit backing integer (precision 39..=76).
    W256,
}

impl DecimalWidth {
    /// Width for a given decimal precision.
    pub fn for_precision(precision: u32) -> Option<DecimalWidth> {
        match precision {
            1..=9 => Some(DecimalWidth::W32),
            10..=18 => Some(DecimalWidth::W64),
            19..=38 => Some(DecimalWidth::W128),
            39..=76 => Some(DecimalWidth::W256),
            _ => None,
        }
    }

    /// Bytes one value occupies on the wire.
    pub fn byte_len(self) -> usize {
        match self {
            DecimalWidth::W32 => 4,
            DecimalWidth::W64 => 8,
            DecimalWidth::W128 => 16,
            DecimalWidth::W256 => 32,
        }
    }
}

/// A parsed ClickHouse type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 128-bit signed integer.
    Int128,
    /// 256-bit signed integer (four little-endian u64 limbs).
    Int256,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// 128-bit unsigned integer.
    UInt128,
    /// 256-bit unsigned integer (four little-endian u64 limbs).
    UInt256,
    /// IEEE-754 single precision.
    Float32,
    /// IEEE-754 double precision.
    Float64,
    /// Boolean, carried as UInt8 0/1.
    Bool,
    /// Variable-length UTF-8 string.
    String,
    /// JSON document, carried as String when
    /// `output_format_native_write_json_as_string = 1`.
    Json,
    /// Fixed-width byte string.
    FixedString(usize),
    /// Days since 1970-01-01 as u16.
    Date,
    /// Days since 1970-01-01 as i32.
    Date32,
    /// Seconds since epoch as u32.
    DateTime {
        /// Optional IANA timezone from the type spec.
        timezone: Option<String>,
    },
    /// Ticks of 10^-precision seconds as i64.
    DateTime64 {
        /// Sub-second precision (0..=9).
        precision: u32,
        /// Optional IANA timezone from the type spec.
        timezone: Option<String>,
    },
    /// 16-byte UUID, limb order matching i128.
    Uuid,
    /// IPv4 address as u32.
    Ipv4,
    /// IPv6 address as 16 network-order bytes.
    Ipv6,
    /// Enum backed by Int8 with a name/value mapping.
    Enum8(Vec<(String, i8)>),
    /// Enum backed by Int16 with a name/value mapping.
    Enum16(Vec<(String, i16)>),
    /// Fixed-point decimal.
    Decimal {
        /// Total number of decimal digits.
        precision: u32,
        /// Digits after the decimal point.
        scale: u32,
    },
    /// A value or NULL; nullmask precedes the nested payload.
    Nullable(Box<Type>),
    /// Variable-length array; cumulative u64 offsets precede the payload.
    Array(Box<Type>),
    /// Fixed set of heterogeneous elements, payloads concatenated.
    Tuple(Vec<Type>),
    /// Key/value pairs, encoded as `Array(Tuple(K, V))`.
    Map(Box<Type>, Box<Type>),
    /// Dictionary-encoded values.
    LowCardinality(Box<Type>),
    /// The Nothing type (empty result columns).
    Nothing,
}

impl Type {
    /// Parse a type spec string into a type tree. Results are cached
    /// thread-locally by spec string.
    pub fn parse(spec: &str) -> crate::Result<Type> {
        parse_type_spec(spec)
    }

    /// Backing width of a decimal type.
    pub fn decimal_width(&self) -> Option<DecimalWidth> {
        match self {
            Type::Decimal { precision, .. } => {
                DecimalWidth::for_precision(*precision)
            }
            _ => None,
        }
    }

    /// Render the canonical type spec text.
    pub fn name(&self) -> String {
        match self {
            Type::Int8 => "Int8".to_string(),
            Type::Int16 => "Int16".to_string(),
            Type::Int32 => "Int32".to_string(),
            Type::Int64 => "Int64".to_string(),
            Type::Int128 => "Int128".to_string(),
            Type::Int256 => "Int256".to_string(),
            Type::UInt8 => "UInt8".to_string(),
            Type::UInt16 => "UInt16".to_string(),
            Type::UInt32 => "UInt32".to_string(),
            Type::UInt64 => "UInt64".to_string(),
            Type::UInt128 => "UInt128".to_string(),
            Type::UInt256 => "UInt256".to_string(),
            Type::Float32 => "Float32".to_string(),
            Type::Float64 => "Float64".to_string(),
            Type::Bool => "Bool".to_string(),
            Type::String => "String".to_string(),
            Type::Json => "JSON".to_string(),
            Type::FixedString(n) => format!("FixedString({})", n),
            Type::Date => "Date".to_string(),
            Type::Date32 => "Date32".to_string(),
            Type::DateTime { timezone: None } => "DateTime".to_string(),
            Type::DateTime { timezone: Some(tz) } => {
                format!("DateTime('{}')", tz)
            }
            Type::DateTime64 { precision, timezone: None } => {
                format!("DateTime64({})", precision)
            }
            Type::DateTime64 { precision, timezone: Some(tz) } => {
                format!("DateTime64({}, '{}')", precision, tz)
            }
            Type::Uuid => "UUID".to_string(),
            Type::Ipv4 => "IPv4".to_string(),
            Type::Ipv6 => "IPv6".to_string(),
            Type::Enum8(items) => {
                let body: Vec<String> = items
                    .iter()
                    .map(|(name, value)| format!("'{}' = {}", name, value))
                    .collect();
                format!("Enum8({})", body.join(", "))
            }
            Type::Enum16(items) => {
                let body: Vec<String> = items
                    .iter()
                    .map(|(name, value)| format!("'{}' = {}", name, value))
                    .collect();
                format!("Enum16({})", body.join(", "))
            }
            Type::Decimal { precision, scale } => {
                format!("Decimal({}, {})", precision, scale)
            }
            Type::Nullable(inner) => format!("Nullable({})", inner.name()),
            Type::Array(inner) => format!("Array({})", inner.name()),
            Type::Tuple(items) => {
                let body: Vec<String> =
                    items.iter().map(Type::name).collect();
                format!("Tuple({})", body.join(", "))
            }
            Type::Map(key, value) => {
                format!("Map({}, {})", key.name(), value.name())
            }
            Type::LowCardinality(inner) => {
                format!("LowCardinality({})", inner.name())
            }
            Type::Nothing => "Nothing".to_string(),
        }
    }

    /// Bytes one value occupies on the wire, for fixed-width types.
    pub fn fixed_byte_len(&self) -> Option<usize> {
        match self {
            Type::Int8 | Type::UInt8 | Type::Bool | Type::Enum8(_) => Some(1),
            Type::Int16 | Type::UInt16 | Type::Date | Type::Enum16(_) => {
                Some(2)
            }
            Type::Int32
            | Type::UInt32
            | Type::Float32
            | Type::Date32
            | Type::DateTime { .. }
            | Type::Ipv4 => Some(4),
            Type::Int64
            | Type::UInt64
            | Type::Float64
            | Type::DateTime64 { .. } => Some(8),
            Type::Int128 | Type::UInt128 | Type::Uuid | Type::Ipv6 => {
                Some(16)
            }
            Type::Int256 | Type::UInt256 => Some(32),
            Type::FixedString(n) => Some(*n),
            Type::Decimal { .. } => {
                self.decimal_width().map(DecimalWidth::byte_len)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rendering() {
        assert_eq!(Type::Int32.name(), "Int32");
        assert_eq!(Type::FixedString(16).name(), "FixedString(16)");
        assert_eq!(
            Type::Nullable(Box::new(Type::String)).name(),
            "Nullable(String)"
        );
        assert_eq!(
            Type::Map(Box::new(Type::String), Box::new(Type::UInt64)).name(),
            "Map(String, UInt64)"
        );
        assert_eq!(
            Type::DateTime64 {
                precision: 3,
                timezone: Some("UTC".to_string())
            }
            .name(),
            "DateTime64(3, 'UTC')"
        );
    }

    #[test]
    fn test_decimal_width_boundaries() {
        assert_eq!(DecimalWidth::for_precision(1), Some(DecimalWidth::W32));
        assert_eq!(DecimalWidth::for_precision(9), Some(DecimalWidth::W32));
        assert_eq!(DecimalWidth::for_precision(10), Some(DecimalWidth::W64));
        assert_eq!(DecimalWidth::for_precision(18), Some(DecimalWidth::W64));
        assert_eq!(DecimalWidth::for_precision(19), Some(DecimalWidth::W128));
        assert_eq!(DecimalWidth::for_precision(38), Some(DecimalWidth::W128));
        assert_eq!(DecimalWidth::for_precision(39), Some(DecimalWidth::W256));
        assert_eq!(DecimalWidth::for_precision(76), Some(DecimalWidth::W256));
        assert_eq!(DecimalWidth::for_precision(0), None);
        assert_eq!(DecimalWidth::for_precision(77), None);
    }

    #[test]
    fn test_fixed_byte_len() {
        assert_eq!(Type::UInt64.fixed_byte_len(), Some(8));
        assert_eq!(Type::Uuid.fixed_byte_len(), Some(16));
        assert_eq!(Type::Int256.fixed_byte_len(), Some(32));
        assert_eq!(Type::String.fixed_byte_len(), None);
        assert_eq!(
            Type::Decimal { precision: 20, scale: 4 }.fixed_byte_len(),
            Some(16)
        );
    }
}
