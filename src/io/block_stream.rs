//! Block reader/writer: the revision-gated wire layout of one Data body.
//!
//! A Data body is the optional external table name, then the block header
//! (block info, column count, row count), then each column as name, type
//! spec, optional serialization hint byte, and payload. With compression
//! enabled everything after the table name rides inside §4.2 frames, and a
//! large block may span several of them — the reader accumulates
//! decompressed frames and re-probes until a whole block parses.

use crate::block::{
    Block,
    BlockInfo,
};
use crate::column::{
    create_column,
    load_column,
};
use crate::compression::{
    self,
    CHECKSUM_SIZE,
    HEADER_SIZE,
    MAX_UNCOMPRESSED_SIZE,
};
use crate::connection::Connection;
use crate::io::pooled::{
    PooledWriter,
    SegmentedBytes,
};
use crate::protocol::{
    CompressionMethod,
    Feature,
    Revision,
};
use crate::types::Type;
use crate::{
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    Bytes,
    BytesMut,
};

/// Reads blocks from the connection.
pub struct BlockReader {
    revision: Revision,
    compression: Option<CompressionMethod>,
    max_uncompressed: usize,
}

impl BlockReader {
    /// Create a reader for the negotiated revision, compression off.
    pub fn new(revision: Revision) -> Self {
        Self {
            revision,
            compression: None,
            max_uncompressed: MAX_UNCOMPRESSED_SIZE,
        }
    }

    /// Enable compressed framing.
    pub fn with_compression(
        mut self,
        method: Option<CompressionMethod>,
    ) -> Self {
        self.compression = method;
        self
    }

    /// Override the decompression size ceiling.
    pub fn with_max_uncompressed(mut self, limit: usize) -> Self {
        self.max_uncompressed = limit;
        self
    }

    /// Read one complete block, including its leading table name string.
    pub async fn read_block(&self, conn: &mut Connection) -> Result<Block> {
        let table_name =
            if self.revision.supports(Feature::TemporaryTables) {
                conn.read_string().await?
            } else {
                String::new()
            };

        let mut block = if self.compression.is_some() {
            self.read_framed(conn).await?
        } else {
            self.read_raw(conn).await?
        };
        block.set_table_name(table_name);
        Ok(block)
    }

    /// Accumulate decompressed frames until a whole block parses.
    async fn read_framed(&self, conn: &mut Connection) -> Result<Block> {
        let mut segments: Vec<Bytes> = Vec::new();
        loop {
            if !segments.is_empty() {
                let mut source = SegmentedBytes::new(segments.clone());
                match self.parse_block(&mut source) {
                    Ok(block) => return Ok(block),
                    Err(Error::ShortRead { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            let frame = read_frame(conn).await?;
            let decompressed = compression::decompress_with_limit(
                &frame,
                self.max_uncompressed,
            )?;
            segments.push(decompressed);
        }
    }

    /// Parse from the connection's read-ahead buffer, growing it until a
    /// whole block is present. Unconsumed bytes stay buffered.
    async fn read_raw(&self, conn: &mut Connection) -> Result<Block> {
        loop {
            let buffered = Bytes::copy_from_slice(conn.buffered());
            let available = buffered.len();
            let mut source = SegmentedBytes::new(vec![buffered]);
            match self.parse_block(&mut source) {
                Ok(block) => {
                    conn.consume(available - source.remaining());
                    return Ok(block);
                }
                Err(Error::ShortRead { .. }) => {
                    conn.fill_some().await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Parse one block out of a byte source.
    pub fn parse_block(&self, source: &mut SegmentedBytes) -> Result<Block> {
        let mut block = Block::new();

        if self.revision.supports(Feature::BlockInfo) {
            block.set_info(read_block_info(source)?);
        }

        let num_columns = source.read_varint()? as usize;
        let num_rows = source.read_varint()? as usize;

        for _ in 0..num_columns {
            let name = source.read_string()?;
            let spec = source.read_string()?;

            if self.revision.supports(Feature::CustomSerialization) {
                let hint = source.read_u8()?;
                if hint != 0 {
                    return Err(Error::Protocol(
                        "Custom column serialization is not supported"
                            .to_string(),
                    ));
                }
            }

            let type_ = Type::parse(&spec)?;
            let column = if num_rows > 0 {
                load_column(&type_, source, num_rows)?
            } else {
                create_column(&type_)?
            };
            if column.len() != num_rows {
                return Err(Error::Protocol(format!(
                    "Column '{}' decoded {} rows, block header says {}",
                    name,
                    column.len(),
                    num_rows
                )));
            }
            block.append_column(name, column)?;
        }

        Ok(block)
    }
}

/// Writes blocks to the connection.
pub struct BlockWriter {
    revision: Revision,
    compression: Option<CompressionMethod>,
}

impl BlockWriter {
    /// Create a writer for the negotiated revision, compression off.
    pub fn new(revision: Revision) -> Self {
        Self { revision, compression: None }
    }

    /// Enable compressed framing.
    pub fn with_compression(
        mut self,
        method: Option<CompressionMethod>,
    ) -> Self {
        self.compression = method;
        self
    }

    /// Queue one complete Data body (table name + block) on the
    /// connection. The caller writes the message tag and flushes.
    pub async fn write_block(
        &self,
        conn: &mut Connection,
        block: &Block,
    ) -> Result<()> {
        let mut message = PooledWriter::new();
        if self.revision.supports(Feature::TemporaryTables) {
            message.put_string(block.table_name());
        }

        let mut body = BytesMut::new();
        self.write_body(&mut body, block)?;

        if let Some(method) = self.compression {
            let frame = compression::compress(method, &body)?;
            message.put_slice(&frame);
        } else {
            message.put_slice(&body);
        }

        conn.write_bytes(message.as_slice());
        Ok(())
    }

    /// Serialize the block header and columns.
    pub fn write_body(
        &self,
        buffer: &mut BytesMut,
        block: &Block,
    ) -> Result<()> {
        if self.revision.supports(Feature::BlockInfo) {
            write_block_info(buffer, block.info());
        }

        crate::io::buffer_utils::write_varint(
            buffer,
            block.column_count() as u64,
        );
        crate::io::buffer_utils::write_varint(
            buffer,
            block.row_count() as u64,
        );

        for (name, type_, column) in block.iter() {
            crate::io::buffer_utils::write_string(buffer, name);
            crate::io::buffer_utils::write_string(buffer, &type_.name());

            if self.revision.supports(Feature::CustomSerialization) {
                buffer.put_u8(0);
            }

            if block.row_count() > 0 {
                column.save_prefix(buffer)?;
                column.save_body(buffer)?;
            }
        }

        Ok(())
    }
}

/// Block info is field-tagged: field 1 is the overflow flag, field 2 the
/// bucket number, field 0 terminates.
fn read_block_info(source: &mut SegmentedBytes) -> Result<BlockInfo> {
    let mut info = BlockInfo { is_overflows: false, bucket_num: -1 };
    loop {
        match source.read_varint()? {
            0 => break,
            1 => info.is_overflows = source.read_u8()? != 0,
            2 => {
                info.bucket_num =
                    i32::from_le_bytes(source.read_array::<4>()?)
            }
            other => {
                return Err(Error::Protocol(format!(
                    "Unknown block info field: {}",
                    other
                )))
            }
        }
    }
    Ok(info)
}

fn write_block_info(buffer: &mut BytesMut, info: &BlockInfo) {
    crate::io::buffer_utils::write_varint(buffer, 1);
    buffer.put_u8(info.is_overflows as u8);
    crate::io::buffer_utils::write_varint(buffer, 2);
    buffer.put_i32_le(info.bucket_num);
    crate::io::buffer_utils::write_varint(buffer, 0);
}

/// Read one compression frame: checksum, header, and payload sized by the
/// header's compressed length.
async fn read_frame(conn: &mut Connection) -> Result<Bytes> {
    let head = conn.read_bytes(CHECKSUM_SIZE + HEADER_SIZE).await?;
    let mut sizes = &head[CHECKSUM_SIZE + 1..];
    let compressed_size = sizes.get_u32_le() as usize;
    if compressed_size < HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "Frame compressed size {} is shorter than its header",
            compressed_size
        )));
    }
    let payload = conn.read_bytes(compressed_size - HEADER_SIZE).await?;

    let mut frame =
        BytesMut::with_capacity(head.len() + payload.len());
    frame.extend_from_slice(&head);
    frame.extend_from_slice(&payload);
    Ok(frame.freeze())
}
