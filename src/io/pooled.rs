//! Shared buffer pool, pooled append-only writer, and pooled read spans.
//!
//! Every serialized block and every decompressed frame passes through
//! buffers rented from one process-wide pool. The pool caps both the number
//! of retained buffers and the capacity a returned buffer may keep, so a
//! single huge insert cannot park a gigabyte array for the process lifetime.

use crate::{
    Error,
    Result,
};
use bytes::Bytes;
use std::{
    ops::Deref,
    sync::{
        Mutex,
        OnceLock,
    },
};

/// Buffers handed out by an empty pool start at this capacity.
pub const MIN_BUFFER_CAPACITY: usize = 4096;

/// Buffers larger than this are released instead of returned to the pool.
pub const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// Number of idle buffers the pool keeps; excess returns are dropped.
pub const MAX_POOLED_BUFFERS: usize = 16;

/// A process-wide pool of byte buffers.
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    fn new() -> Self {
        Self { idle: Mutex::new(Vec::new()) }
    }

    /// The shared process-wide pool.
    pub fn global() -> &'static BufferPool {
        static POOL: OnceLock<BufferPool> = OnceLock::new();
        POOL.get_or_init(BufferPool::new)
    }

    /// Rent a cleared buffer with capacity at least `min_capacity`.
    pub fn rent(&self, min_capacity: usize) -> Vec<u8> {
        let mut idle = self.idle.lock().expect("buffer pool poisoned");
        // Prefer an idle buffer that already fits
        if let Some(pos) =
            idle.iter().position(|b| b.capacity() >= min_capacity)
        {
            let mut buf = idle.swap_remove(pos);
            buf.clear();
            return buf;
        }
        drop(idle);
        Vec::with_capacity(min_capacity.max(MIN_BUFFER_CAPACITY))
    }

    /// Return a buffer. Oversized or surplus buffers are released.
    pub fn give_back(&self, buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        let mut idle = self.idle.lock().expect("buffer pool poisoned");
        if idle.len() < MAX_POOLED_BUFFERS {
            idle.push(buf);
        }
    }

    #[cfg(test)]
    fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }
}

/// An append-only writer backed by a pooled buffer.
///
/// `reserve(n)` hands out a writable span of at least `n` bytes and
/// `advance(n)` commits what was written into it. The buffer is returned to
/// its pool on drop.
pub struct PooledWriter {
    pool: &'static BufferPool,
    buf: Vec<u8>,
    len: usize,
}

impl PooledWriter {
    /// Create a writer over the global pool.
    pub fn new() -> Self {
        Self::with_capacity(MIN_BUFFER_CAPACITY)
    }

    /// Create a writer with an initial capacity hint.
    pub fn with_capacity(capacity: usize) -> Self {
        let pool = BufferPool::global();
        let mut buf = pool.rent(capacity);
        buf.resize(buf.capacity(), 0);
        Self { pool, buf, len: 0 }
    }

    /// Committed length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The committed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// A writable span of at least `n` bytes past the committed length.
    /// Growth doubles the current capacity or jumps straight to the
    /// requirement, whichever is larger; the old array goes back to the pool.
    pub fn reserve(&mut self, n: usize) -> &mut [u8] {
        let required = self.len + n;
        if required > self.buf.len() {
            let new_capacity = required.max(self.buf.len() * 2);
            let mut grown = self.pool.rent(new_capacity);
            grown.resize(grown.capacity().max(new_capacity), 0);
            grown[..self.len].copy_from_slice(&self.buf[..self.len]);
            let old = std::mem::replace(&mut self.buf, grown);
            self.pool.give_back(old);
        }
        &mut self.buf[self.len..]
    }

    /// Commit `n` bytes previously written into the span from
    /// [`reserve`](Self::reserve).
    pub fn advance(&mut self, n: usize) -> Result<()> {
        if self.len + n > self.buf.len() {
            return Err(Error::Validation(format!(
                "advance({}) past reserved capacity {}",
                n,
                self.buf.len() - self.len
            )));
        }
        self.len += n;
        Ok(())
    }

    /// Append a byte slice.
    pub fn put_slice(&mut self, data: &[u8]) {
        let span = self.reserve(data.len());
        span[..data.len()].copy_from_slice(data);
        self.len += data.len();
    }

    /// Append a LEB128 varint.
    pub fn put_varint(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.put_slice(&[byte]);
            if value == 0 {
                break;
            }
        }
    }

    /// Append a varint-prefixed string.
    pub fn put_string(&mut self, value: &str) {
        self.put_varint(value.len() as u64);
        self.put_slice(value.as_bytes());
    }

    /// Discard committed data. A buffer that grew beyond the retention cap
    /// is swapped for a minimum-size one, with the big array released.
    pub fn reset(&mut self) {
        self.len = 0;
        if self.buf.capacity() > MAX_RETAINED_CAPACITY {
            let replacement = {
                let mut b = self.pool.rent(MIN_BUFFER_CAPACITY);
                b.resize(b.capacity(), 0);
                b
            };
            let old = std::mem::replace(&mut self.buf, replacement);
            self.pool.give_back(old);
        }
    }

    /// Take the committed bytes as an owned `Bytes`, resetting the writer.
    pub fn take_bytes(&mut self) -> Bytes {
        let out = Bytes::copy_from_slice(self.as_slice());
        self.reset();
        out
    }
}

impl Default for PooledWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PooledWriter {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.give_back(buf);
    }
}

/// A read-only view of `n` bytes taken from a [`SegmentedBytes`] cursor.
///
/// When the requested range lies inside one segment the span borrows it
/// zero-copy; when it crosses a boundary the bytes are gathered into a
/// pooled buffer that returns to the pool on drop.
#[derive(Debug)]
pub enum PooledSpan {
    /// Zero-copy slice of a single segment.
    Contiguous(Bytes),
    /// Gathered copy in a rented buffer; `len` bytes are valid.
    Gathered {
        /// The rented backing buffer.
        buf: Vec<u8>,
        /// Valid prefix length of `buf`.
        len: usize,
    },
}

impl Deref for PooledSpan {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            PooledSpan::Contiguous(bytes) => bytes,
            PooledSpan::Gathered { buf, len } => &buf[..*len],
        }
    }
}

impl Drop for PooledSpan {
    fn drop(&mut self) {
        if let PooledSpan::Gathered { buf, .. } = self {
            BufferPool::global().give_back(std::mem::take(buf));
        }
    }
}

/// A byte source over a sequence of segments (e.g. decompressed frames),
/// with reads allowed to cross segment boundaries.
pub struct SegmentedBytes {
    segments: Vec<Bytes>,
    current: usize,
    offset: usize,
}

impl SegmentedBytes {
    /// Create a source over the given segments.
    pub fn new(segments: Vec<Bytes>) -> Self {
        Self { segments, current: 0, offset: 0 }
    }

    /// Append another segment to the tail.
    pub fn push(&mut self, segment: Bytes) {
        self.segments.push(segment);
    }

    /// Total unread bytes across all segments.
    pub fn remaining(&self) -> usize {
        let mut total = 0;
        for (i, seg) in self.segments.iter().enumerate().skip(self.current) {
            total += if i == self.current {
                seg.len() - self.offset
            } else {
                seg.len()
            };
        }
        total
    }

    /// Whether all bytes have been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Read exactly `n` bytes, zero-copy when they sit in one segment.
    pub fn read_span(&mut self, n: usize) -> Result<PooledSpan> {
        if n == 0 {
            return Ok(PooledSpan::Contiguous(Bytes::new()));
        }
        let available = self.remaining();
        if available < n {
            return Err(Error::ShortRead { needed: n, available });
        }

        // Skip exhausted segments; remaining >= n > 0 guarantees one left
        while self.offset == self.segments[self.current].len() {
            self.current += 1;
            self.offset = 0;
        }

        let seg = &self.segments[self.current];
        if seg.len() - self.offset >= n {
            let span = seg.slice(self.offset..self.offset + n);
            self.offset += n;
            return Ok(PooledSpan::Contiguous(span));
        }

        // Crosses a boundary: gather into a pooled buffer
        let mut buf = BufferPool::global().rent(n);
        buf.resize(n, 0);
        let mut copied = 0;
        while copied < n {
            let seg = &self.segments[self.current];
            let take = (seg.len() - self.offset).min(n - copied);
            buf[copied..copied + take]
                .copy_from_slice(&seg[self.offset..self.offset + take]);
            copied += take;
            self.offset += take;
            if self.offset == seg.len()
                && self.current + 1 < self.segments.len()
            {
                self.current += 1;
                self.offset = 0;
            }
        }
        Ok(PooledSpan::Gathered { buf, len: n })
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let span = self.read_span(1)?;
        Ok(span[0])
    }

    /// Read a fixed-width little-endian byte array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let span = self.read_span(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&span);
        Ok(out)
    }

    /// Read a LEB128 varint.
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;
        for _ in 0..crate::wire_format::MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
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

    /// Read a varint-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let span = self.read_span(len)?;
        Ok(std::str::from_utf8(&span)?.to_string())
    }
}
