use crate::{
    Error,
    Result,
};
use tokio::io::{
    AsyncRead,
    AsyncReadExt,
    AsyncWrite,
    AsyncWriteExt,
};

/// Longest legal LEB128 encoding of a u64.
pub const MAX_VARINT_BYTES: usize = 10;

/// Upper bound on the length prefix of a wire string.
const MAX_STRING_LEN: usize = 0x00FF_FFFF;

/// Wire format utilities for the ClickHouse native protocol
pub struct WireFormat;

impl WireFormat {
    /// Read a varint-encoded u64
    pub async fn read_varint64<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;

        for _ in 0..MAX_VARINT_BYTES {
            let byte = reader.read_u8().await?;
            result |= ((byte & 0x7F) as u64) << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }

            shift += 7;
        }

        Err(Error::Protocol(
            "Varint not terminated within 10 bytes".to_string(),
        ))
    }

    /// Write a varint-encoded u64
    pub async fn write_varint64<W: AsyncWrite + Unpin>(
        writer: &mut W,
        mut value: u64,
    ) -> Result<()> {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;

            if value != 0 {
                byte |= 0x80;
            }

            writer.write_u8(byte).await?;

            if value == 0 {
                break;
            }
        }

        Ok(())
    }

    /// Read a fixed-size value (little-endian)
    pub async fn read_fixed<R: AsyncRead + Unpin + Send, T: FixedSize>(
        reader: &mut R,
    ) -> Result<T> {
        T::read_from(reader).await
    }

    /// Write a fixed-size value (little-endian)
    pub async fn write_fixed<W: AsyncWrite + Unpin + Send, T: FixedSize>(
        writer: &mut W,
        value: T,
    ) -> Result<()> {
        value.write_to(writer).await
    }

    /// Read a length-prefixed string
    pub async fn read_string<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<String> {
        let len = Self::read_varint64(reader).await? as usize;

        if len > MAX_STRING_LEN {
            return Err(Error::Protocol(format!(
                "String length too large: {}",
                len
            )));
        }

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;

        String::from_utf8(buf)
            .map_err(|e| Error::Protocol(format!("Invalid UTF-8: {}", e)))
    }

    /// Write a length-prefixed string
    pub async fn write_string<W: AsyncWrite + Unpin>(
        writer: &mut W,
        value: &str,
    ) -> Result<()> {
        Self::write_varint64(writer, value.len() as u64).await?;
        writer.write_all(value.as_bytes()).await?;
        Ok(())
    }

    /// Read raw bytes of specified length
    pub async fn read_bytes<R: AsyncRead + Unpin>(
        reader: &mut R,
        len: usize,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Write raw bytes
    pub async fn write_bytes<W: AsyncWrite + Unpin>(
        writer: &mut W,
        bytes: &[u8],
    ) -> Result<()> {
        writer.write_all(bytes).await?;
        Ok(())
    }

    /// Skip a string without materializing it
    pub async fn skip_string<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<()> {
        let len = Self::read_varint64(reader).await? as usize;

        if len > MAX_STRING_LEN {
            return Err(Error::Protocol(format!(
                "String length too large: {}",
                len
            )));
        }

        let mut remaining = len;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let to_read = remaining.min(buf.len());
            reader.read_exact(&mut buf[..to_read]).await?;
            remaining -= to_read;
        }

        Ok(())
    }

    /// Number of bytes the LEB128 encoding of `value` occupies.
    pub fn varint_len(value: u64) -> usize {
        let bits = 64 - value.leading_zeros() as usize;
        (bits.max(1) + 6) / 7
    }
}

/// Trait for types that can be read/written as fixed-size values
#[async_trait::async_trait]
pub trait FixedSize: Sized + Send {
    async fn read_from<R: AsyncRead + Unpin + Send>(
        reader: &mut R,
    ) -> Result<Self>;
    async fn write_to<W: AsyncWrite + Unpin + Send>(
        self,
        writer: &mut W,
    ) -> Result<()>;
}

// Implement FixedSize for primitive types
macro_rules! impl_fixed_size {
    ($type:ty, $read:ident, $write:ident) => {
        #[async_trait::async_trait]
        impl FixedSize for $type {
            async fn read_from<R: AsyncRead + Unpin + Send>(
                reader: &mut R,
            ) -> Result<Self> {
                Ok(reader.$read().await?)
            }

            async fn write_to<W: AsyncWrite + Unpin + Send>(
                self,
                writer: &mut W,
            ) -> Result<()> {
                Ok(writer.$write(self).await?)
            }
        }
    };
}

impl_fixed_size!(u8, read_u8, write_u8);
impl_fixed_size!(u16, read_u16_le, write_u16_le);
impl_fixed_size!(u32, read_u32_le, write_u32_le);
impl_fixed_size!(u64, read_u64_le, write_u64_le);
impl_fixed_size!(i8, read_i8, write_i8);
impl_fixed_size!(i16, read_i16_le, write_i16_le);
impl_fixed_size!(i32, read_i32_le, write_i32_le);
impl_fixed_size!(i64, read_i64_le, write_i64_le);
impl_fixed_size!(f32, read_f32_le, write_f32_le);
impl_fixed_size!(f64, read_f64_le, write_f64_le);
impl_fixed_size!(i128, read_i128_le, write_i128_le);
impl_fixed_size!(u128, read_u128_le, write_u128_le);
