//! Mock ClickHouse server plumbing shared by the integration tests.
//!
//! The mock accepts one connection per [`MockServer::serve`] call, runs
//! the server side of the Hello exchange, and then hands the stream to a
//! per-test script. Helpers here mirror the client's revision gating so
//! every byte the client sends is consumed exactly.

#![allow(dead_code)]

use bytes::BytesMut;
use clickhouse_tcp_client::block::Block;
use clickhouse_tcp_client::compression;
use clickhouse_tcp_client::io::{
    BlockReader,
    BlockWriter,
    SegmentedBytes,
};
use clickhouse_tcp_client::protocol::{
    CompressionMethod,
    Feature,
    Revision,
};
use clickhouse_tcp_client::wire_format::WireFormat;
use tokio::io::AsyncReadExt;
use tokio::net::{
    TcpListener,
    TcpStream,
};

/// Client → server packet tags.
pub const CLIENT_HELLO: u64 = 0;
pub const CLIENT_QUERY: u64 = 1;
pub const CLIENT_DATA: u64 = 2;
pub const CLIENT_CANCEL: u64 = 3;
pub const CLIENT_PING: u64 = 4;

/// Server → client packet tags.
pub const SERVER_HELLO: u64 = 0;
pub const SERVER_DATA: u64 = 1;
pub const SERVER_EXCEPTION: u64 = 2;
pub const SERVER_PROGRESS: u64 = 3;
pub const SERVER_PONG: u64 = 4;
pub const SERVER_END_OF_STREAM: u64 = 5;
pub const SERVER_PROFILE_INFO: u64 = 6;
pub const SERVER_TOTALS: u64 = 7;
pub const SERVER_LOG: u64 = 10;
pub const SERVER_PROFILE_EVENTS: u64 = 14;

/// What the mock learned from the client's Hello.
pub struct ClientHello {
    pub client_name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub revision: u64,
    pub database: String,
    pub username: String,
    pub password: String,
}

/// A one-connection mock server bound to a loopback port.
pub struct MockServer {
    listener: TcpListener,
    port: u16,
}

impl MockServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept one connection and run `script` over it after completing
    /// the handshake at `server_revision`.
    pub fn serve<F, Fut>(
        self,
        server_revision: u64,
        script: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(TcpStream, Revision) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        tokio::spawn(async move {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            let hello = read_client_hello(&mut stream).await;
            let session =
                Revision(server_revision.min(hello.revision));
            write_server_hello(&mut stream, server_revision, session)
                .await;
            if session.supports(Feature::Addendum) {
                // Quota key addendum
                let _ = WireFormat::read_string(&mut stream).await.unwrap();
            }
            script(stream, session).await;
        })
    }

    /// Accept connections forever, answering every query on each with
    /// `block` then EndOfStream. Used by the load-balancing tests.
    pub fn serve_queries_forever(
        self,
        server_revision: u64,
        block: Block,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = self.listener.accept().await
                else {
                    return;
                };
                let block = block.clone_shallow();
                tokio::spawn(async move {
                    let hello = read_client_hello(&mut stream).await;
                    let session =
                        Revision(server_revision.min(hello.revision));
                    write_server_hello(
                        &mut stream,
                        server_revision,
                        session,
                    )
                    .await;
                    if session.supports(Feature::Addendum) {
                        let _ = WireFormat::read_string(&mut stream)
                            .await
                            .unwrap();
                    }
                    loop {
                        let Ok(tag) =
                            WireFormat::read_varint64(&mut stream).await
                        else {
                            return;
                        };
                        match tag {
                            CLIENT_QUERY => {
                                let query =
                                    read_query(&mut stream, session)
                                        .await;
                                write_data_block(
                                    &mut stream,
                                    session,
                                    query.compression,
                                    &block,
                                )
                                .await;
                                write_end_of_stream(&mut stream).await;
                            }
                            CLIENT_PING => {
                                write_varint(&mut stream, SERVER_PONG)
                                    .await;
                            }
                            _ => return,
                        }
                    }
                });
            }
        })
    }
}

// Blocks are not Clone (columns are trait objects); the forever-server
// only needs the serialized form, so round-trip through the codec.
trait CloneShallow {
    fn clone_shallow(&self) -> Block;
}

impl CloneShallow for Block {
    fn clone_shallow(&self) -> Block {
        let revision = Revision(54467);
        let writer = BlockWriter::new(revision);
        let mut buffer = BytesMut::new();
        writer.write_body(&mut buffer, self).unwrap();
        let reader = BlockReader::new(revision);
        let mut source = SegmentedBytes::new(vec![buffer.freeze()]);
        reader.parse_block(&mut source).unwrap()
    }
}

pub async fn write_varint(stream: &mut TcpStream, value: u64) {
    WireFormat::write_varint64(stream, value).await.unwrap();
    flush(stream).await;
}

async fn flush(stream: &mut TcpStream) {
    use tokio::io::AsyncWriteExt;
    stream.flush().await.unwrap();
}

pub async fn read_client_hello(stream: &mut TcpStream) -> ClientHello {
    let tag = WireFormat::read_varint64(stream).await.unwrap();
    assert_eq!(tag, CLIENT_HELLO, "expected client hello");
    ClientHello {
        client_name: WireFormat::read_string(stream).await.unwrap(),
        version_major: WireFormat::read_varint64(stream).await.unwrap(),
        version_minor: WireFormat::read_varint64(stream).await.unwrap(),
        revision: WireFormat::read_varint64(stream).await.unwrap(),
        database: WireFormat::read_string(stream).await.unwrap(),
        username: WireFormat::read_string(stream).await.unwrap(),
        password: WireFormat::read_string(stream).await.unwrap(),
    }
}

pub async fn write_server_hello(
    stream: &mut TcpStream,
    server_revision: u64,
    session: Revision,
) {
    WireFormat::write_varint64(stream, SERVER_HELLO).await.unwrap();
    WireFormat::write_string(stream, "MockHouse").await.unwrap();
    WireFormat::write_varint64(stream, 24).await.unwrap();
    WireFormat::write_varint64(stream, 3).await.unwrap();
    WireFormat::write_varint64(stream, server_revision).await.unwrap();
    if session.supports(Feature::ServerTimezone) {
        WireFormat::write_string(stream, "Europe/Berlin").await.unwrap();
    }
    if session.supports(Feature::ServerDisplayName) {
        WireFormat::write_string(stream, "mock-1").await.unwrap();
    }
    if session.supports(Feature::VersionPatch) {
        WireFormat::write_varint64(stream, 7).await.unwrap();
    }
    if session.supports(Feature::PasswordComplexityRules) {
        WireFormat::write_varint64(stream, 0).await.unwrap();
    }
    if session.supports(Feature::InterserverSecretV2) {
        tokio::io::AsyncWriteExt::write_u64_le(stream, 0xA5A5)
            .await
            .unwrap();
    }
    flush(stream).await;
}

/// Everything the mock consumed from one Query packet.
pub struct ReceivedQuery {
    pub query_id: String,
    pub sql: String,
    pub compression: Option<CompressionMethod>,
    pub settings: Vec<(String, u64, String)>,
    pub parameters: Vec<(String, u64, String)>,
}

pub async fn read_query(
    stream: &mut TcpStream,
    session: Revision,
) -> ReceivedQuery {
    let query_id = WireFormat::read_string(stream).await.unwrap();

    if session.supports(Feature::ClientInfo) {
        read_client_info(stream, session).await;
    }

    let mut settings = Vec::new();
    if session.supports(Feature::SettingsSerializedAsStrings) {
        loop {
            let name = WireFormat::read_string(stream).await.unwrap();
            if name.is_empty() {
                break;
            }
            let flags = WireFormat::read_varint64(stream).await.unwrap();
            let value = WireFormat::read_string(stream).await.unwrap();
            settings.push((name, flags, value));
        }
    } else {
        let terminator = WireFormat::read_string(stream).await.unwrap();
        assert!(terminator.is_empty());
    }

    if session.supports(Feature::InterserverSecret) {
        let secret = WireFormat::read_string(stream).await.unwrap();
        assert!(secret.is_empty());
    }

    let stage = WireFormat::read_varint64(stream).await.unwrap();
    assert_eq!(stage, 2, "expected Complete stage");

    let compressed = WireFormat::read_varint64(stream).await.unwrap();
    let compression = if compressed == 1 {
        Some(CompressionMethod::Lz4)
    } else {
        None
    };

    let sql = WireFormat::read_string(stream).await.unwrap();

    let mut parameters = Vec::new();
    if session.supports(Feature::QueryParameters) {
        loop {
            let name = WireFormat::read_string(stream).await.unwrap();
            if name.is_empty() {
                break;
            }
            let flags = WireFormat::read_varint64(stream).await.unwrap();
            let value = WireFormat::read_string(stream).await.unwrap();
            parameters.push((name, flags, value));
        }
    }

    ReceivedQuery { query_id, sql, compression, settings, parameters }
}

/// Consume the revision-gated ClientInfo section. Returns the
/// parallel-replica fields when present.
pub async fn read_client_info(
    stream: &mut TcpStream,
    session: Revision,
) -> Option<(u64, u64, u64)> {
    let _query_kind = stream.read_u8().await.unwrap();
    let _initial_user = WireFormat::read_string(stream).await.unwrap();
    let _initial_query_id =
        WireFormat::read_string(stream).await.unwrap();
    let _initial_address =
        WireFormat::read_string(stream).await.unwrap();
    if session.supports(Feature::InitialQueryStartTime) {
        let _ = stream.read_i64_le().await.unwrap();
    }
    let interface = stream.read_u8().await.unwrap();
    assert_eq!(interface, 1, "expected TCP interface");
    let _os_user = WireFormat::read_string(stream).await.unwrap();
    let _hostname = WireFormat::read_string(stream).await.unwrap();
    let _client_name = WireFormat::read_string(stream).await.unwrap();
    let _major = WireFormat::read_varint64(stream).await.unwrap();
    let _minor = WireFormat::read_varint64(stream).await.unwrap();
    let _revision = WireFormat::read_varint64(stream).await.unwrap();
    if session.supports(Feature::QuotaKeyInClientInfo) {
        let _quota = WireFormat::read_string(stream).await.unwrap();
    }
    if session.supports(Feature::DistributedDepth) {
        let _depth = WireFormat::read_varint64(stream).await.unwrap();
    }
    if session.supports(Feature::VersionPatch) {
        let _patch = WireFormat::read_varint64(stream).await.unwrap();
    }
    if session.supports(Feature::OpenTelemetry) {
        let traced = stream.read_u8().await.unwrap();
        if traced == 1 {
            let mut trace = [0u8; 24];
            stream.read_exact(&mut trace).await.unwrap();
            let _state = WireFormat::read_string(stream).await.unwrap();
            let _flags = stream.read_u8().await.unwrap();
        }
    }
    if session.supports(Feature::ParallelReplicas) {
        let collaborate =
            WireFormat::read_varint64(stream).await.unwrap();
        let participating =
            WireFormat::read_varint64(stream).await.unwrap();
        let current = WireFormat::read_varint64(stream).await.unwrap();
        return Some((collaborate, participating, current));
    }
    None
}

/// Serialize and send one Data packet.
pub async fn write_data_block(
    stream: &mut TcpStream,
    session: Revision,
    compression: Option<CompressionMethod>,
    block: &Block,
) {
    write_tagged_block(stream, SERVER_DATA, session, compression, block)
        .await;
}

pub async fn write_tagged_block(
    stream: &mut TcpStream,
    tag: u64,
    session: Revision,
    compression: Option<CompressionMethod>,
    block: &Block,
) {
    WireFormat::write_varint64(stream, tag).await.unwrap();
    if session.supports(Feature::TemporaryTables) {
        WireFormat::write_string(stream, block.table_name())
            .await
            .unwrap();
    }

    let writer = BlockWriter::new(session);
    let mut body = BytesMut::new();
    writer.write_body(&mut body, block).unwrap();

    match compression {
        Some(method) => {
            let frame = compression::compress(method, &body).unwrap();
            WireFormat::write_bytes(stream, &frame).await.unwrap();
        }
        None => {
            WireFormat::write_bytes(stream, &body).await.unwrap();
        }
    }
    flush(stream).await;
}

/// Read one client Data packet body (tag already consumed) and parse the
/// block. The client compresses insert blocks per its session setting.
pub async fn read_data_block(
    stream: &mut TcpStream,
    session: Revision,
    compression: Option<CompressionMethod>,
) -> Block {
    if session.supports(Feature::TemporaryTables) {
        let _table = WireFormat::read_string(stream).await.unwrap();
    }

    let reader = BlockReader::new(session);
    if compression.is_some() {
        let mut segments = Vec::new();
        loop {
            let mut source = SegmentedBytes::new(segments.clone());
            if !segments.is_empty() {
                match reader.parse_block(&mut source) {
                    Ok(block) => return block,
                    Err(clickhouse_tcp_client::Error::ShortRead {
                        ..
                    }) => {}
                    Err(e) => panic!("bad insert block: {:?}", e),
                }
            }
            let mut head = vec![0u8; 25];
            stream.read_exact(&mut head).await.unwrap();
            let compressed_size = u32::from_le_bytes(
                head[17..21].try_into().unwrap(),
            ) as usize;
            let mut payload = vec![0u8; compressed_size - 9];
            stream.read_exact(&mut payload).await.unwrap();
            head.extend_from_slice(&payload);
            segments.push(
                compression::decompress(&head).unwrap(),
            );
        }
    } else {
        // Uncompressed bodies are not self-delimiting; read one byte at
        // a time and reparse so nothing past the block is consumed.
        let mut buffered = Vec::new();
        loop {
            if !buffered.is_empty() {
                let mut source = SegmentedBytes::new(vec![
                    bytes::Bytes::copy_from_slice(&buffered),
                ]);
                match reader.parse_block(&mut source) {
                    Ok(block) if source.is_exhausted() => return block,
                    Ok(_)
                    | Err(clickhouse_tcp_client::Error::ShortRead {
                        ..
                    }) => {}
                    Err(e) => panic!("bad insert block: {:?}", e),
                }
            }
            let byte = stream.read_u8().await.expect("client closed");
            buffered.push(byte);
        }
    }
}

pub async fn write_progress(
    stream: &mut TcpStream,
    session: Revision,
    read_rows: u64,
    read_bytes: u64,
    written_rows: u64,
) {
    WireFormat::write_varint64(stream, SERVER_PROGRESS).await.unwrap();
    WireFormat::write_varint64(stream, read_rows).await.unwrap();
    WireFormat::write_varint64(stream, read_bytes).await.unwrap();
    WireFormat::write_varint64(stream, 0).await.unwrap(); // total rows
    if session.supports(Feature::TotalBytesInProgress) {
        WireFormat::write_varint64(stream, 0).await.unwrap();
    }
    if session.supports(Feature::ClientWriteInfo) {
        WireFormat::write_varint64(stream, written_rows).await.unwrap();
        WireFormat::write_varint64(stream, 0).await.unwrap();
    }
    if session.supports(Feature::ServerQueryTimeInProgress) {
        WireFormat::write_varint64(stream, 1_000).await.unwrap();
    }
    flush(stream).await;
}

pub async fn write_profile_info(stream: &mut TcpStream, rows: u64) {
    WireFormat::write_varint64(stream, SERVER_PROFILE_INFO)
        .await
        .unwrap();
    WireFormat::write_varint64(stream, rows).await.unwrap();
    WireFormat::write_varint64(stream, 1).await.unwrap(); // blocks
    WireFormat::write_varint64(stream, rows * 8).await.unwrap(); // bytes
    tokio::io::AsyncWriteExt::write_u8(stream, 0).await.unwrap();
    WireFormat::write_varint64(stream, 0).await.unwrap();
    tokio::io::AsyncWriteExt::write_u8(stream, 0).await.unwrap();
    flush(stream).await;
}

/// Log and ProfileEvents blocks ride uncompressed regardless of session
/// compression.
pub async fn write_log_block(
    stream: &mut TcpStream,
    session: Revision,
    block: &Block,
) {
    write_tagged_block(stream, SERVER_LOG, session, None, block).await;
}

pub async fn write_profile_events(
    stream: &mut TcpStream,
    session: Revision,
    block: &Block,
) {
    write_tagged_block(
        stream,
        SERVER_PROFILE_EVENTS,
        session,
        None,
        block,
    )
    .await;
}

pub async fn write_exception(
    stream: &mut TcpStream,
    code: i32,
    name: &str,
    message: &str,
) {
    WireFormat::write_varint64(stream, SERVER_EXCEPTION).await.unwrap();
    tokio::io::AsyncWriteExt::write_i32_le(stream, code).await.unwrap();
    WireFormat::write_string(stream, name).await.unwrap();
    WireFormat::write_string(stream, message).await.unwrap();
    WireFormat::write_string(stream, "<stack>").await.unwrap();
    tokio::io::AsyncWriteExt::write_u8(stream, 0).await.unwrap();
    flush(stream).await;
}

pub async fn write_end_of_stream(stream: &mut TcpStream) {
    WireFormat::write_varint64(stream, SERVER_END_OF_STREAM)
        .await
        .unwrap();
    flush(stream).await;
}
