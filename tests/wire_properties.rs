//! Property tests over the codec and framing layers.

use bytes::BytesMut;
use clickhouse_tcp_client::compression;
use clickhouse_tcp_client::io::buffer_utils;
use clickhouse_tcp_client::io::SegmentedBytes;
use clickhouse_tcp_client::protocol::CompressionMethod;
use clickhouse_tcp_client::wire_format::WireFormat;
use proptest::prelude::*;

proptest! {
    #[test]
    fn varint_roundtrip_and_length(value: u64) {
        let mut buffer = BytesMut::new();
        buffer_utils::write_varint(&mut buffer, value);

        let bits = 64 - value.leading_zeros() as usize;
        let expected_len = bits.max(1).div_ceil(7);
        prop_assert_eq!(buffer.len(), expected_len);
        prop_assert_eq!(buffer.len(), WireFormat::varint_len(value));

        let mut slice = &buffer[..];
        let decoded = buffer_utils::read_varint(&mut slice).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert!(slice.is_empty());
    }

    #[test]
    fn varint_boundary_values(shift in 0usize..63) {
        // Around every power-of-two boundary: 2^s - 1, 2^s, 2^s + 1
        let base = 1u64 << shift;
        for value in [base - 1, base, base.saturating_add(1)] {
            let mut buffer = BytesMut::new();
            buffer_utils::write_varint(&mut buffer, value);
            let mut slice = &buffer[..];
            prop_assert_eq!(
                buffer_utils::read_varint(&mut slice).unwrap(),
                value
            );
        }
    }

    #[test]
    fn string_roundtrip(value in ".*") {
        let mut buffer = BytesMut::new();
        buffer_utils::write_string(&mut buffer, &value);

        let mut slice = &buffer[..];
        let decoded = buffer_utils::read_string(&mut slice).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn frame_roundtrip_all_methods(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
        method_index in 0usize..3,
    ) {
        let method = [
            CompressionMethod::None,
            CompressionMethod::Lz4,
            CompressionMethod::Zstd,
        ][method_index];

        let frame = compression::compress(method, &payload).unwrap();
        let decoded = compression::decompress(&frame).unwrap();
        prop_assert_eq!(&decoded[..], &payload[..]);
    }

    #[test]
    fn frame_bit_flip_detected(
        payload in proptest::collection::vec(any::<u8>(), 1..512),
        flip_position in any::<prop::sample::Index>(),
        flip_bit in 0u8..8,
    ) {
        let frame =
            compression::compress(CompressionMethod::Lz4, &payload)
                .unwrap();
        let mut corrupted = frame.to_vec();
        let position = flip_position.index(corrupted.len());
        corrupted[position] ^= 1 << flip_bit;

        // Flipping any bit of checksum, header, or payload must be
        // caught before decompression
        let result = compression::decompress(&corrupted);
        prop_assert!(matches!(
            result,
            Err(clickhouse_tcp_client::Error::CorruptFrame)
        ));
    }

    #[test]
    fn segmented_reads_equal_contiguous(
        payload in proptest::collection::vec(any::<u8>(), 1..1024),
        cut in any::<prop::sample::Index>(),
        take in any::<prop::sample::Index>(),
    ) {
        let bytes = bytes::Bytes::from(payload.clone());
        let cut = cut.index(bytes.len().max(2) - 1) + 1;
        let take = take.index(bytes.len()) + 1;

        let mut whole = SegmentedBytes::new(vec![bytes.clone()]);
        let mut split = SegmentedBytes::new(vec![
            bytes.slice(..cut),
            bytes.slice(cut..),
        ]);

        let from_whole = whole.read_span(take).unwrap();
        let from_split = split.read_span(take).unwrap();
        prop_assert_eq!(&from_whole[..], &from_split[..]);
        prop_assert_eq!(whole.remaining(), split.remaining());
    }
}
