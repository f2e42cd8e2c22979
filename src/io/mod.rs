/// Block reader/writer over the connection.
pub mod block_stream;
/// Synchronous buffer codec and the non-committing try/skip family.
pub mod buffer_utils;
/// Shared buffer pool, pooled writer, and pooled read spans.
pub mod pooled;

pub use block_stream::{
    BlockReader,
    BlockWriter,
};
pub use pooled::{
    BufferPool,
    PooledSpan,
    PooledWriter,
    SegmentedBytes,
};
