//! Per-block compression framing: CityHash128 checksum + method header +
//! codec payload.
//!
//! Wire layout of one frame:
//!
//! ```text
//! [16 bytes] CityHash128 checksum, two little-endian u64 limbs, low first
//! [ 1 byte ] method tag (0x82 = LZ4, 0x90 = ZSTD, 0x02 = None)
//! [ 4 bytes] u32 compressed size, includes these 9 header bytes
//! [ 4 bytes] u32 uncompressed size
//! [ N bytes] codec payload
//! ```
//!
//! The checksum covers the 9 header bytes plus the codec payload. The
//! decoder validates it before any decompression and rejects frames whose
//! uncompressed size exceeds the configured ceiling.

use crate::{
    protocol::CompressionMethod,
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    Bytes,
    BytesMut,
};
use cityhash_rs::cityhash_102_128;

/// Compression header size (1 byte method + 4 bytes compressed size + 4
/// bytes uncompressed size)
pub const HEADER_SIZE: usize = 9;

/// Checksum size (16 bytes for CityHash128)
pub const CHECKSUM_SIZE: usize = 16;

/// Method tag bytes (ClickHouse CompressionMethodByte values)
pub const METHOD_NONE: u8 = 0x02;
/// LZ4 method tag.
pub const METHOD_LZ4: u8 = 0x82;
/// ZSTD method tag.
pub const METHOD_ZSTD: u8 = 0x90;

/// Default ceiling on a frame's uncompressed size (1 GiB).
pub const MAX_UNCOMPRESSED_SIZE: usize = 0x4000_0000;

const ZSTD_LEVEL: i32 = 3;

fn method_byte(method: CompressionMethod) -> u8 {
    match method {
        CompressionMethod::None => METHOD_NONE,
        CompressionMethod::Lz4 => METHOD_LZ4,
        CompressionMethod::Zstd => METHOD_ZSTD,
    }
}

/// Compress `data` into a complete frame, checksum included.
pub fn compress(method: CompressionMethod, data: &[u8]) -> Result<Bytes> {
    let payload = match method {
        CompressionMethod::None => Bytes::copy_from_slice(data),
        CompressionMethod::Lz4 => {
            let bound = lz4::block::compress_bound(data.len())?;
            let mut scratch = crate::io::BufferPool::global().rent(bound);
            scratch.resize(bound, 0);
            let written = lz4::block::compress_to_buffer(
                data, None, false, &mut scratch,
            )?;
            let out = Bytes::copy_from_slice(&scratch[..written]);
            crate::io::BufferPool::global().give_back(scratch);
            out
        }
        CompressionMethod::Zstd => {
            let out = zstd::bulk::compress(data, ZSTD_LEVEL).map_err(|e| {
                Error::Compression(format!("ZSTD compression failed: {}", e))
            })?;
            Bytes::from(out)
        }
    };

    let mut framed =
        BytesMut::with_capacity(CHECKSUM_SIZE + HEADER_SIZE + payload.len());
    framed.put_bytes(0, CHECKSUM_SIZE);
    framed.put_u8(method_byte(method));
    framed.put_u32_le((HEADER_SIZE + payload.len()) as u32);
    framed.put_u32_le(data.len() as u32);
    framed.put_slice(&payload);

    let checksum = cityhash_102_128(&framed[CHECKSUM_SIZE..]);
    framed[..8].copy_from_slice(&(checksum as u64).to_le_bytes());
    framed[8..16].copy_from_slice(&((checksum >> 64) as u64).to_le_bytes());

    Ok(framed.freeze())
}

/// Decompress a complete frame with the default size ceiling.
pub fn decompress(frame: &[u8]) -> Result<Bytes> {
    decompress_with_limit(frame, MAX_UNCOMPRESSED_SIZE)
}

/// Decompress a complete frame, rejecting uncompressed sizes above
/// `max_uncompressed`. The checksum is validated before the codec runs.
pub fn decompress_with_limit(
    frame: &[u8],
    max_uncompressed: usize,
) -> Result<Bytes> {
    if frame.len() < CHECKSUM_SIZE + HEADER_SIZE {
        return Err(Error::ShortRead {
            needed: CHECKSUM_SIZE + HEADER_SIZE,
            available: frame.len(),
        });
    }

    let mut limbs = &frame[..CHECKSUM_SIZE];
    let expected =
        (limbs.get_u64_le() as u128) | ((limbs.get_u64_le() as u128) << 64);
    let actual = cityhash_102_128(&frame[CHECKSUM_SIZE..]);
    if expected != actual {
        return Err(Error::CorruptFrame);
    }

    let mut header = &frame[CHECKSUM_SIZE..CHECKSUM_SIZE + HEADER_SIZE];
    let method = header.get_u8();
    let compressed_size = header.get_u32_le() as usize;
    let uncompressed_size = header.get_u32_le() as usize;

    if uncompressed_size > max_uncompressed {
        return Err(Error::Compression(format!(
            "Uncompressed size too large: {} (limit {})",
            uncompressed_size, max_uncompressed
        )));
    }
    if compressed_size < HEADER_SIZE
        || frame.len() != CHECKSUM_SIZE + compressed_size
    {
        return Err(Error::Compression(format!(
            "Frame size mismatch: header says {}, frame has {}",
            compressed_size,
            frame.len() - CHECKSUM_SIZE
        )));
    }

    let payload = &frame[CHECKSUM_SIZE + HEADER_SIZE..];

    match method {
        METHOD_NONE => {
            if payload.len() != uncompressed_size {
                return Err(Error::Compression(format!(
                    "Passthrough size mismatch: expected {}, got {}",
                    uncompressed_size,
                    payload.len()
                )));
            }
            Ok(Bytes::copy_from_slice(payload))
        }
        METHOD_LZ4 => {
            let out = lz4::block::decompress(
                payload,
                Some(uncompressed_size as i32),
            )?;
            if out.len() != uncompressed_size {
                return Err(Error::Compression(format!(
                    "LZ4 size mismatch: expected {}, got {}",
                    uncompressed_size,
                    out.len()
                )));
            }
            Ok(Bytes::from(out))
        }
        METHOD_ZSTD => {
            let out = zstd::bulk::decompress(payload, uncompressed_size)
                .map_err(|e| {
                    Error::Compression(format!(
                        "ZSTD decompression failed: {}",
                        e
                    ))
                })?;
            if out.len() != uncompressed_size {
                return Err(Error::Compression(format!(
                    "ZSTD size mismatch: expected {}, got {}",
                    uncompressed_size,
                    out.len()
                )));
            }
            Ok(Bytes::from(out))
        }
        other => Err(Error::UnsupportedCompressionMethod(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METHODS: [CompressionMethod; 3] = [
        CompressionMethod::None,
        CompressionMethod::Lz4,
        CompressionMethod::Zstd,
    ];

    #[test]
    fn test_roundtrip_all_methods_and_sizes() {
        for method in METHODS {
            for size in [0usize, 1, 65535, 65536, 1 << 20] {
                let original: Vec<u8> =
                    (0..size).map(|i| (i % 251) as u8).collect();

                let frame = compress(method, &original).unwrap();
                let decoded = decompress(&frame).unwrap();

                assert_eq!(
                    &decoded[..],
                    &original[..],
                    "roundtrip failed for {:?} at {} bytes",
                    method,
                    size
                );
            }
        }
    }

    #[test]
    fn test_compressible_data_shrinks() {
        let original = b"ClickHouse is a fast column-oriented database "
            .repeat(100);

        for method in [CompressionMethod::Lz4, CompressionMethod::Zstd] {
            let frame = compress(method, &original).unwrap();
            assert!(frame.len() < original.len());
        }
    }

    #[test]
    fn test_none_is_passthrough() {
        let original = b"Hello, ClickHouse!";
        let frame = compress(CompressionMethod::None, original).unwrap();

        // compressed_size - 9 == uncompressed_size for the passthrough
        let compressed_size = u32::from_le_bytes(
            frame[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5].try_into().unwrap(),
        ) as usize;
        let uncompressed_size = u32::from_le_bytes(
            frame[CHECKSUM_SIZE + 5..CHECKSUM_SIZE + 9].try_into().unwrap(),
        ) as usize;
        assert_eq!(compressed_size - HEADER_SIZE, uncompressed_size);
        assert_eq!(uncompressed_size, original.len());
        assert_eq!(&frame[CHECKSUM_SIZE + HEADER_SIZE..], &original[..]);
    }

    #[test]
    fn test_bit_flip_detected_before_decompression() {
        let original = b"payload that will be protected".repeat(10);

        for method in METHODS {
            let frame = compress(method, &original).unwrap();

            // Flip one bit in every header byte and a few payload positions
            for pos in (CHECKSUM_SIZE..CHECKSUM_SIZE + HEADER_SIZE)
                .chain([frame.len() - 1, CHECKSUM_SIZE + HEADER_SIZE])
            {
                let mut corrupted = frame.to_vec();
                corrupted[pos] ^= 0x01;
                let err = decompress(&corrupted).unwrap_err();
                assert!(
                    matches!(err, Error::CorruptFrame),
                    "expected CorruptFrame for {:?} flip at {}, got {:?}",
                    method,
                    pos,
                    err
                );
            }
        }
    }

    #[test]
    fn test_checksum_flip_detected() {
        let frame = compress(CompressionMethod::Lz4, b"abcdef").unwrap();
        let mut corrupted = frame.to_vec();
        corrupted[3] ^= 0x80;
        assert!(matches!(
            decompress(&corrupted).unwrap_err(),
            Error::CorruptFrame
        ));
    }

    #[test]
    fn test_uncompressed_size_ceiling() {
        // Forge a frame whose header claims 2 GiB, with a valid checksum
        let mut framed = BytesMut::new();
        framed.put_bytes(0, CHECKSUM_SIZE);
        framed.put_u8(METHOD_LZ4);
        framed.put_u32_le((HEADER_SIZE + 4) as u32);
        framed.put_u32_le(0x8000_0000);
        framed.put_slice(&[1, 2, 3, 4]);
        let checksum = cityhash_102_128(&framed[CHECKSUM_SIZE..]);
        framed[..8].copy_from_slice(&(checksum as u64).to_le_bytes());
        framed[8..16]
            .copy_from_slice(&((checksum >> 64) as u64).to_le_bytes());

        let err = decompress(&framed).unwrap_err();
        assert!(matches!(err, Error::Compression(_)));
    }

    #[test]
    fn test_unknown_method_byte() {
        let mut framed = BytesMut::new();
        framed.put_bytes(0, CHECKSUM_SIZE);
        framed.put_u8(0x77);
        framed.put_u32_le((HEADER_SIZE + 3) as u32);
        framed.put_u32_le(3);
        framed.put_slice(&[1, 2, 3]);
        let checksum = cityhash_102_128(&framed[CHECKSUM_SIZE..]);
        framed[..8].copy_from_slice(&(checksum as u64).to_le_bytes());
        framed[8..16]
            .copy_from_slice(&((checksum >> 64) as u64).to_le_bytes());

        assert!(matches!(
            decompress(&framed).unwrap_err(),
            Error::UnsupportedCompressionMethod(0x77)
        ));
    }

    #[test]
    fn test_frame_too_small() {
        let frame = vec![0x82u8, 1, 2, 3];
        assert!(matches!(
            decompress(&frame).unwrap_err(),
            Error::ShortRead { .. }
        ));
    }
}
