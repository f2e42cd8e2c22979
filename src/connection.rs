//! The transport: a TCP (optionally TLS) connection with a read-ahead
//! buffer, per-operation deadlines, cancellation, and a terminal broken
//! state.
//!
//! Reads go through an internal buffer so the protocol engine can probe
//! whether a complete message has arrived (via the try/skip codec) before
//! committing the cursor; unconsumed bytes stay buffered for the next
//! message. Writes accumulate in an output buffer and [`flush`] pushes the
//! whole message, making application-level writes atomic.
//!
//! When the `CLICKHOUSE_TCP_CLIENT_WIRE_DUMP` environment variable names a
//! file, every sent and received chunk is appended to it as a timestamped
//! hex+ASCII dump.
//!
//! [`flush`]: Connection::flush

use crate::{
    io::buffer_utils,
    wire_format::MAX_VARINT_BYTES,
    Error,
    Result,
};
use bytes::{
    Buf,
    Bytes,
    BytesMut,
};
use std::io::Write as _;
use std::time::Duration;
use tokio::io::{
    AsyncReadExt,
    AsyncWriteExt,
    ReadHalf,
    WriteHalf,
};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Environment variable enabling wire hex dumps.
pub const WIRE_DUMP_ENV: &str = "CLICKHOUSE_TCP_CLIENT_WIRE_DUMP";

/// Default per-operation deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 8192;

/// Any duplex byte stream the transport can run over.
pub trait Stream:
    tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send
{
}

impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send> Stream
    for T
{
}

/// Transport options independent of the protocol layer.
#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    /// Per-operation deadline for connect, read, and write.
    pub timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }
}

/// A duplex byte stream with read-ahead buffering.
pub struct Connection {
    reader: ReadHalf<Box<dyn Stream>>,
    writer: WriteHalf<Box<dyn Stream>>,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    timeout: Duration,
    cancel: CancellationToken,
    broken: Option<String>,
    dump: Option<WireDump>,
}

impl Connection {
    /// Wrap an established stream.
    pub fn new(stream: Box<dyn Stream>, options: ConnectionOptions) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer,
            read_buffer: BytesMut::with_capacity(READ_CHUNK),
            write_buffer: BytesMut::with_capacity(READ_CHUNK),
            timeout: options.timeout,
            cancel: CancellationToken::new(),
            broken: None,
            dump: WireDump::from_env(),
        }
    }

    /// Open a TCP connection with TCP_NODELAY and keepalive enabled.
    pub async fn connect(
        host: &str,
        port: u16,
        options: ConnectionOptions,
    ) -> Result<Self> {
        let stream = connect_tcp(host, port, options.timeout).await?;
        Ok(Self::new(Box::new(stream), options))
    }

    /// Replace the cancellation token polled at every suspension point.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// The current cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether the transport has entered its terminal broken state.
    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    fn check_usable(&self) -> Result<()> {
        if let Some(reason) = &self.broken {
            return Err(Error::ConnectionBroken(reason.clone()));
        }
        Ok(())
    }

    fn mark_broken(&mut self, reason: impl Into<String>) -> &str {
        if self.broken.is_none() {
            self.broken = Some(reason.into());
        }
        self.broken.as_deref().unwrap()
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.read_buffer
    }

    /// Drop `n` buffered bytes.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.read_buffer.len());
        self.read_buffer.advance(n);
    }

    /// Read more bytes from the socket into the buffer (at least one).
    /// EOF breaks the transport with `connection_broken`.
    pub async fn fill_some(&mut self) -> Result<usize> {
        self.check_usable()?;
        let cancel = self.cancel.clone();
        let deadline = self.timeout;

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = tokio::time::timeout(
                deadline,
                self.reader.read_buf(&mut self.read_buffer),
            ) => result,
        };

        let n = match read {
            Err(_) => {
                self.mark_broken("read deadline expired");
                return Err(Error::Timeout(deadline));
            }
            Ok(Err(e)) => {
                let reason = self.mark_broken(e.to_string()).to_string();
                return Err(Error::ConnectionBroken(reason));
            }
            Ok(Ok(0)) => {
                self.mark_broken("peer closed the connection");
                return Err(Error::ConnectionBroken(
                    "peer closed the connection".to_string(),
                ));
            }
            Ok(Ok(n)) => n,
        };

        if let Some(dump) = &self.dump {
            let start = self.read_buffer.len() - n;
            dump.record("recv", &self.read_buffer[start..]);
        }
        Ok(n)
    }

    /// Ensure at least `n` bytes are buffered.
    pub async fn fill(&mut self, n: usize) -> Result<()> {
        while self.read_buffer.len() < n {
            self.fill_some().await?;
        }
        Ok(())
    }

    /// Read exactly `len` bytes.
    pub async fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.fill(len).await?;
        Ok(self.read_buffer.split_to(len).freeze())
    }

    /// Read one byte.
    pub async fn read_u8(&mut self) -> Result<u8> {
        self.fill(1).await?;
        let byte = self.read_buffer[0];
        self.consume(1);
        Ok(byte)
    }

    /// Read a little-endian u32.
    pub async fn read_u32(&mut self) -> Result<u32> {
        self.fill(4).await?;
        let mut slice = &self.read_buffer[..4];
        let value = buffer_utils::try_read_i32(&mut slice).unwrap() as u32;
        self.consume(4);
        Ok(value)
    }

    /// Read a little-endian u64.
    pub async fn read_u64(&mut self) -> Result<u64> {
        self.fill(8).await?;
        let mut slice = &self.read_buffer[..8];
        let value = buffer_utils::try_read_u64(&mut slice).unwrap();
        self.consume(8);
        Ok(value)
    }

    /// Read a little-endian i32.
    pub async fn read_i32(&mut self) -> Result<i32> {
        self.fill(4).await?;
        let mut slice = &self.read_buffer[..4];
        let value = buffer_utils::try_read_i32(&mut slice).unwrap();
        self.consume(4);
        Ok(value)
    }

    /// Read a varint, pulling more bytes as needed.
    pub async fn read_varint(&mut self) -> Result<u64> {
        loop {
            let mut slice = &self.read_buffer[..];
            if let Some(value) = buffer_utils::try_read_varint(&mut slice) {
                let used = self.read_buffer.len() - slice.len();
                self.consume(used);
                return Ok(value);
            }
            if self.read_buffer.len() >= MAX_VARINT_BYTES {
                self.mark_broken("unterminated varint");
                return Err(Error::Protocol(
                    "Varint not terminated within 10 bytes".to_string(),
                ));
            }
            self.fill_some().await?;
        }
    }

    /// Read a varint-prefixed UTF-8 string.
    pub async fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint().await? as usize;
        if len > 0x00FF_FFFF {
            self.mark_broken("oversized string length");
            return Err(Error::Protocol(format!(
                "String length too large: {}",
                len
            )));
        }
        let bytes = self.read_bytes(len).await?;
        Ok(std::str::from_utf8(&bytes)?.to_string())
    }

    /// Queue a varint into the output buffer.
    pub fn write_varint(&mut self, value: u64) {
        buffer_utils::write_varint(&mut self.write_buffer, value);
    }

    /// Queue a varint-prefixed string.
    pub fn write_string(&mut self, value: &str) {
        buffer_utils::write_string(&mut self.write_buffer, value);
    }

    /// Queue one byte.
    pub fn write_u8(&mut self, value: u8) {
        self.write_buffer.extend_from_slice(&[value]);
    }

    /// Queue a little-endian u64.
    pub fn write_u64(&mut self, value: u64) {
        self.write_buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Queue a little-endian i64.
    pub fn write_i64(&mut self, value: i64) {
        self.write_buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Queue raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.write_buffer.extend_from_slice(data);
    }

    /// Push the queued message to the socket. Partial writes are retried
    /// until the whole buffer is on the wire.
    pub async fn flush(&mut self) -> Result<()> {
        self.check_usable()?;
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let outgoing = self.write_buffer.split().freeze();
        if let Some(dump) = &self.dump {
            dump.record("send", &outgoing);
        }

        let cancel = self.cancel.clone();
        let deadline = self.timeout;
        let write = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = tokio::time::timeout(deadline, async {
                self.writer.write_all(&outgoing).await?;
                self.writer.flush().await
            }) => result,
        };

        match write {
            Err(_) => {
                self.mark_broken("write deadline expired");
                Err(Error::Timeout(deadline))
            }
            Ok(Err(e)) => {
                let reason = self.mark_broken(e.to_string()).to_string();
                Err(Error::ConnectionBroken(reason))
            }
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Repeatedly grow the read buffer until `predicate` reports that a
    /// complete message can be parsed from it. The predicate must not
    /// consume; the caller consumes after a successful parse.
    pub async fn read_until<F>(&mut self, mut predicate: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> bool,
    {
        while !predicate(&self.read_buffer) {
            self.fill_some().await?;
        }
        Ok(())
    }
}

/// Open a raw TCP socket with TCP_NODELAY and keepalive, under a deadline.
pub async fn connect_tcp(
    host: &str,
    port: u16,
    deadline: Duration,
) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    let stream =
        tokio::time::timeout(deadline, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout(deadline))?
            .map_err(|e| {
                Error::Connection(format!(
                    "Failed to connect to {}: {}",
                    addr, e
                ))
            })?;

    stream.set_nodelay(true).map_err(|e| {
        Error::Connection(format!("Failed to set TCP_NODELAY: {}", e))
    })?;

    let sock = socket2::SockRef::from(&stream);
    let keepalive =
        socket2::TcpKeepalive::new().with_time(Duration::from_secs(60));
    sock.set_tcp_keepalive(&keepalive).map_err(|e| {
        Error::Connection(format!("Failed to set keepalive: {}", e))
    })?;

    Ok(stream)
}

/// Appends hex+ASCII dumps of every sent and received chunk to a file.
struct WireDump {
    file: std::sync::Mutex<std::fs::File>,
}

impl WireDump {
    fn from_env() -> Option<Self> {
        let path = std::env::var(WIRE_DUMP_ENV).ok()?;
        if path.is_empty() {
            return None;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        Some(Self { file: std::sync::Mutex::new(file) })
    }

    fn record(&self, direction: &str, data: &[u8]) {
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        let _ = writeln!(
            file,
            "{} {} {} bytes",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            direction,
            data.len()
        );
        for chunk in data.chunks(16) {
            let hex: Vec<String> =
                chunk.iter().map(|b| format!("{:02x}", b)).collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if (0x20..0x7F).contains(&b) {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            let _ = writeln!(file, "  {:<47} |{}|", hex.join(" "), ascii);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn, accepted) = tokio::join!(
            Connection::connect(
                "127.0.0.1",
                addr.port(),
                ConnectionOptions::default()
            ),
            listener.accept(),
        );
        (conn.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_buffered_reads() {
        let (mut conn, mut peer) = pair().await;

        let mut payload = BytesMut::new();
        buffer_utils::write_varint(&mut payload, 300);
        buffer_utils::write_string(&mut payload, "hello");
        payload.extend_from_slice(&7u64.to_le_bytes());
        peer.write_all(&payload).await.unwrap();

        assert_eq!(conn.read_varint().await.unwrap(), 300);
        assert_eq!(conn.read_string().await.unwrap(), "hello");
        assert_eq!(conn.read_u64().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_flush_is_single_message() {
        let (mut conn, mut peer) = pair().await;

        conn.write_varint(1);
        conn.write_string("query");
        conn.flush().await.unwrap();

        let mut buf = vec![0u8; 7];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[0], 1);
        assert_eq!(buf[1], 5);
        assert_eq!(&buf[2..], b"query");
    }

    #[tokio::test]
    async fn test_peer_close_breaks_transport() {
        let (mut conn, peer) = pair().await;
        drop(peer);

        let err = conn.read_u8().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionBroken(_)));
        assert!(conn.is_broken());

        // Subsequent operations fail fast
        let err = conn.read_u8().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionBroken(_)));
        let err = conn.flush().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionBroken(_)));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_read() {
        let (mut conn, _peer) = pair().await;
        let token = CancellationToken::new();
        conn.set_cancellation(token.clone());

        token.cancel();
        let err = conn.read_u8().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_read_until_predicate() {
        let (mut conn, mut peer) = pair().await;

        let writer = tokio::spawn(async move {
            // Dribble a string message one byte at a time
            let mut payload = BytesMut::new();
            buffer_utils::write_string(&mut payload, "split");
            for byte in payload {
                peer.write_all(&[byte]).await.unwrap();
                peer.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
            peer
        });

        conn.read_until(|buffer| {
            let mut probe = buffer;
            buffer_utils::try_skip_string(&mut probe)
        })
        .await
        .unwrap();

        assert_eq!(conn.read_string().await.unwrap(), "split");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_short_timeout_expires() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let options = ConnectionOptions {
            timeout: Duration::from_millis(50),
        };
        let (conn, _accepted) = tokio::join!(
            Connection::connect("127.0.0.1", addr.port(), options),
            listener.accept(),
        );
        let mut conn = conn.unwrap();

        // Nothing ever arrives
        let err = conn.read_u8().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(conn.is_broken());
    }
}
