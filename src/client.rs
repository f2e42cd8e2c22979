//! The client: one logical session over one transport.
//!
//! A session is created by [`Client::connect`], which runs the
//! feature-negotiated Hello exchange and pins the session revision to
//! `min(client, server)`. One query may stream at a time: the streaming
//! reader borrows the client mutably, and a reader dropped mid-stream
//! leaves the session busy until the next operation drains or the caller
//! reconnects.

use crate::block::{
    Block,
    BlockTag,
};
use crate::column::{
    create_column,
    FromValue,
    Value,
};
use crate::connection::{
    Connection,
    ConnectionOptions,
};
use crate::io::{
    BlockReader,
    BlockWriter,
};
use crate::protocol::{
    ClientCode,
    CompressionMethod,
    Feature,
    Revision,
    ServerCode,
    Stage,
    CLIENT_REVISION,
    CLIENT_VERSION_MAJOR,
    CLIENT_VERSION_MINOR,
    MIN_SUPPORTED_REVISION,
};
use crate::query::{
    ClientInfo,
    Exception,
    ProfileInfo,
    Progress,
    Query,
    ServerInfo,
    SETTING_FLAG_CUSTOM,
};
use crate::types::Type;
use crate::{
    Error,
    Result,
};
use std::time::Duration;
use tracing::{
    debug,
    warn,
};

/// ClickHouse AUTHENTICATION_FAILED error code.
const AUTHENTICATION_FAILED: i32 = 516;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 9000;
/// Default TLS port.
pub const DEFAULT_TLS_PORT: u16 = 9440;

/// One `host:port` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Parse `host` or `host:port`, defaulting the port.
    pub fn parse(s: &str, default_port: u16) -> Result<Self> {
        match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::Validation(format!("Bad port in '{}'", s))
                })?;
                Ok(Self { host: host.to_string(), port })
            }
            _ => Ok(Self { host: s.to_string(), port: default_port }),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client options for one session.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Server host.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Default database.
    pub database: String,
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
    /// Block compression, None for raw blocks.
    pub compression: Option<CompressionMethod>,
    /// Per-operation deadline.
    pub timeout: Duration,
    /// Connect with TLS.
    pub use_tls: bool,
    /// Port used when `use_tls` is set.
    pub tls_port: u16,
    /// TLS options (feature `tls`).
    #[cfg(feature = "tls")]
    pub tls: crate::ssl::TlsOptions,
    /// Identity presented with every query.
    pub client_info: ClientInfo,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: "default".to_string(),
            username: "default".to_string(),
            password: String::new(),
            compression: Some(CompressionMethod::Lz4),
            timeout: crate::connection::DEFAULT_TIMEOUT,
            use_tls: false,
            tls_port: DEFAULT_TLS_PORT,
            #[cfg(feature = "tls")]
            tls: crate::ssl::TlsOptions::default(),
            client_info: ClientInfo::default(),
        }
    }
}

impl ClientOptions {
    /// Options for a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Default::default() }
    }

    /// Set the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the compression method, None for raw blocks.
    pub fn compression(
        mut self,
        method: Option<CompressionMethod>,
    ) -> Self {
        self.compression = method;
        self
    }

    /// Set the per-operation deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable TLS.
    pub fn use_tls(mut self, enabled: bool) -> Self {
        self.use_tls = enabled;
        self
    }

    /// Set the TLS port.
    pub fn tls_port(mut self, port: u16) -> Self {
        self.tls_port = port;
        self
    }
}

/// Batching options for [`Client::bulk_insert`].
#[derive(Debug, Clone, Copy)]
pub struct InsertOptions {
    /// Rows per data block.
    pub batch_size: usize,
}

impl Default for InsertOptions {
    fn default() -> Self {
        Self { batch_size: 65_536 }
    }
}

/// A single live session against one server.
pub struct Client {
    conn: Connection,
    server: ServerInfo,
    revision: Revision,
    options: ClientOptions,
    in_flight: bool,
    closed: bool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server", &self.server)
            .field("revision", &self.revision)
            .field("options", &self.options)
            .field("in_flight", &self.in_flight)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Client {
    /// Connect and run the Hello handshake.
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let conn_options =
            ConnectionOptions { timeout: options.timeout };

        let mut conn = open_transport(&options, conn_options).await?;

        Self::send_hello(&mut conn, &options).await?;
        let (server, revision) = Self::receive_hello(&mut conn).await?;

        if revision.supports(Feature::Addendum) {
            conn.write_string(&options.client_info.quota_key);
            conn.flush().await?;
        }

        debug!(
            server = %server.name,
            revision = %revision,
            timezone = %server.timezone,
            "session established"
        );

        Ok(Self {
            conn,
            server,
            revision,
            options,
            in_flight: false,
            closed: false,
        })
    }

    async fn send_hello(
        conn: &mut Connection,
        options: &ClientOptions,
    ) -> Result<()> {
        conn.write_varint(ClientCode::Hello as u64);
        conn.write_string(&options.client_info.client_name);
        conn.write_varint(CLIENT_VERSION_MAJOR);
        conn.write_varint(CLIENT_VERSION_MINOR);
        conn.write_varint(CLIENT_REVISION);
        conn.write_string(&options.database);
        conn.write_string(&options.username);
        conn.write_string(&options.password);
        conn.flush().await
    }

    async fn receive_hello(
        conn: &mut Connection,
    ) -> Result<(ServerInfo, Revision)> {
        let tag = ServerCode::try_from(conn.read_varint().await?)?;
        match tag {
            ServerCode::Hello => {}
            ServerCode::Exception => {
                let exception = Exception::read(conn).await?;
                let inner = exception.innermost();
                if inner.code == AUTHENTICATION_FAILED {
                    return Err(Error::AuthFailed(inner.message.clone()));
                }
                return Err(exception.into_error());
            }
            other => {
                return Err(Error::Protocol(format!(
                    "Expected Hello, got {:?}",
                    other
                )))
            }
        }

        let mut server = ServerInfo {
            name: conn.read_string().await?,
            version_major: conn.read_varint().await?,
            version_minor: conn.read_varint().await?,
            ..Default::default()
        };
        server.revision = conn.read_varint().await?;

        if server.revision < MIN_SUPPORTED_REVISION {
            return Err(Error::UnsupportedProtocol {
                server: server.revision,
                minimum: MIN_SUPPORTED_REVISION,
            });
        }
        let revision = Revision::negotiate(server.revision);

        if revision.supports(Feature::ServerTimezone) {
            server.timezone = conn.read_string().await?;
        }
        if revision.supports(Feature::ServerDisplayName) {
            server.display_name = conn.read_string().await?;
        }
        if revision.supports(Feature::VersionPatch) {
            server.version_patch = conn.read_varint().await?;
        }
        if revision.supports(Feature::PasswordComplexityRules) {
            let rules = conn.read_varint().await?;
            for _ in 0..rules {
                let _pattern = conn.read_string().await?;
                let _message = conn.read_string().await?;
            }
        }
        if revision.supports(Feature::InterserverSecretV2) {
            let _nonce = conn.read_u64().await?;
        }

        Ok((server, revision))
    }

    /// Server identity from the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// The negotiated session revision.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    fn check_ready(&self) -> Result<()> {
        if self.closed {
            return Err(Error::NotOpen);
        }
        if self.in_flight {
            return Err(Error::Busy);
        }
        if self.conn.is_broken() {
            return Err(Error::ConnectionBroken(
                "session transport is broken".to_string(),
            ));
        }
        Ok(())
    }

    fn block_reader(&self) -> BlockReader {
        BlockReader::new(self.revision)
            .with_compression(self.options.compression)
    }

    fn block_writer(&self) -> BlockWriter {
        BlockWriter::new(self.revision)
            .with_compression(self.options.compression)
    }

    async fn send_query(&mut self, query: &mut Query) -> Result<()> {
        query.ensure_id();
        // Token scope is one query; queries without one get a fresh token
        // so an old cancellation cannot leak forward
        let token = query
            .cancellation()
            .cloned()
            .unwrap_or_else(tokio_util::sync::CancellationToken::new);
        self.conn.set_cancellation(token);

        self.conn.write_varint(ClientCode::Query as u64);
        self.conn.write_string(query.id());

        if self.revision.supports(Feature::ClientInfo) {
            self.options.client_info.write(
                &mut self.conn,
                self.revision,
                query.id(),
                query.tracing(),
            );
        }

        if self.revision.supports(Feature::SettingsSerializedAsStrings) {
            for (name, setting) in query.settings() {
                self.conn.write_string(name);
                self.conn.write_varint(setting.flags);
                self.conn.write_string(&setting.value);
            }
        }
        self.conn.write_string(""); // end of settings

        if self.revision.supports(Feature::InterserverSecret) {
            self.conn.write_string("");
        }

        self.conn.write_varint(Stage::Complete as u64);
        let compressed = self.options.compression.is_some();
        self.conn.write_varint(compressed as u64);
        self.conn.write_string(query.text());

        if self.revision.supports(Feature::QueryParameters) {
            for (name, value) in query.parameters() {
                self.conn.write_string(name);
                self.conn.write_varint(SETTING_FLAG_CUSTOM);
                self.conn.write_string(value);
            }
            self.conn.write_string(""); // end of parameters
        }

        self.conn.flush().await?;
        debug!(query_id = %query.id(), "query sent");
        Ok(())
    }

    /// Execute a SELECT-style query and stream its result blocks.
    pub async fn query_reader(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<QueryReader<'_>> {
        self.check_ready()?;
        let mut query = query.into();
        self.send_query(&mut query).await?;
        self.in_flight = true;
        Ok(QueryReader {
            client: self,
            progress: Progress::default(),
            profile: None,
            done: false,
        })
    }

    /// Execute a query and collect every result block.
    pub async fn query(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<QueryResult> {
        let mut reader = self.query_reader(query).await?;
        let mut blocks = Vec::new();
        while let Some(block) = reader.next_block().await? {
            if block.tag() == BlockTag::Data {
                blocks.push(block);
            }
        }
        let progress = reader.progress;
        let profile = reader.profile;
        Ok(QueryResult { blocks, progress, profile })
    }

    /// Execute a statement and return the server-reported written rows.
    pub async fn execute(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<u64> {
        let result = self.query(query).await?;
        Ok(result.progress.written_rows)
    }

    /// The first column of the first row, converted to `T`.
    pub async fn query_scalar<T: FromValue>(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<T> {
        let result = self.query(query).await?;
        let value = result
            .blocks
            .iter()
            .find(|block| block.row_count() > 0)
            .and_then(|block| block.value(0, 0))
            .ok_or(Error::EmptyResult)?;
        T::from_value(value)
    }

    /// All rows projected as values, in order.
    pub async fn query_rows(
        &mut self,
        query: impl Into<Query>,
    ) -> Result<Vec<Vec<Value>>> {
        let result = self.query(query).await?;
        let mut rows = Vec::new();
        for block in &result.blocks {
            for row in 0..block.row_count() {
                rows.push(block.row(row).ok_or_else(|| {
                    Error::Mapping("row projection failed".to_string())
                })?);
            }
        }
        Ok(rows)
    }

    /// Insert one prebuilt block into a table.
    pub async fn insert(
        &mut self,
        table: &str,
        block: Block,
    ) -> Result<()> {
        let columns: Vec<String> = block
            .iter()
            .map(|(name, _, _)| format!("`{}`", name.replace('`', "``")))
            .collect();
        if columns.is_empty() {
            return Err(Error::Validation(
                "Insert block has no columns".to_string(),
            ));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES",
            table,
            columns.join(", ")
        );

        self.check_ready()?;
        let mut query = Query::new(sql);
        self.send_query(&mut query).await?;

        let _schema = self.receive_insert_schema().await?;
        self.write_data_block(&block).await?;
        self.write_data_block(&Block::new()).await?;
        self.await_end_of_stream().await
    }

    /// Insert rows of values in batches of `options.batch_size`,
    /// validating them against the server-provided schema block.
    pub async fn bulk_insert(
        &mut self,
        table: &str,
        rows: &[Vec<Value>],
        options: InsertOptions,
    ) -> Result<()> {
        if options.batch_size == 0 {
            return Err(Error::Validation(
                "batch_size must be positive".to_string(),
            ));
        }

        self.check_ready()?;
        let mut query =
            Query::new(format!("INSERT INTO {} VALUES", table));
        self.send_query(&mut query).await?;

        let schema = self.receive_insert_schema().await?;
        let column_types: Vec<(String, Type)> = schema
            .iter()
            .map(|(name, type_, _)| (name.to_string(), type_.clone()))
            .collect();
        if column_types.is_empty() {
            return Err(Error::Protocol(
                "Server sent no insert schema".to_string(),
            ));
        }

        for batch in rows.chunks(options.batch_size) {
            let mut columns: Vec<Box<dyn crate::column::Column>> =
                column_types
                    .iter()
                    .map(|(_, type_)| create_column(type_))
                    .collect::<Result<_>>()?;

            for row in batch {
                if row.len() != columns.len() {
                    return Err(Error::Validation(format!(
                        "Row has {} values, table has {} columns",
                        row.len(),
                        columns.len()
                    )));
                }
                for (column, value) in columns.iter_mut().zip(row) {
                    column.append_value(value)?;
                }
            }

            let mut block = Block::new();
            for ((name, _), column) in
                column_types.iter().zip(columns)
            {
                block.append_column(name.clone(), column)?;
            }
            self.write_data_block(&block).await?;
        }

        self.write_data_block(&Block::new()).await?;
        self.await_end_of_stream().await
    }

    async fn write_data_block(&mut self, block: &Block) -> Result<()> {
        self.conn.write_varint(ClientCode::Data as u64);
        let writer = self.block_writer();
        writer.write_block(&mut self.conn, block).await?;
        self.conn.flush().await
    }

    /// Consume packets until the insert schema block arrives.
    async fn receive_insert_schema(&mut self) -> Result<Block> {
        let mut progress = Progress::default();
        loop {
            let tag = ServerCode::try_from(self.conn.read_varint().await?)?;
            match tag {
                ServerCode::Data => {
                    let reader = self.block_reader();
                    return reader.read_block(&mut self.conn).await;
                }
                ServerCode::Progress => {
                    progress
                        .read_delta(&mut self.conn, self.revision)
                        .await?;
                }
                ServerCode::TableColumns => {
                    let _name = self.conn.read_string().await?;
                    let _metadata = self.conn.read_string().await?;
                }
                ServerCode::Log => {
                    self.drain_log_block().await?;
                }
                ServerCode::ProfileEvents => {
                    self.drain_uncompressed_block().await?;
                }
                ServerCode::Exception => {
                    let exception =
                        Exception::read(&mut self.conn).await?;
                    return Err(exception.into_error());
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "Unexpected packet while awaiting insert \
                         schema: {:?}",
                        other
                    )))
                }
            }
        }
    }

    /// Consume packets until EndOfStream after an insert.
    async fn await_end_of_stream(&mut self) -> Result<()> {
        let mut progress = Progress::default();
        loop {
            let tag = ServerCode::try_from(self.conn.read_varint().await?)?;
            match tag {
                ServerCode::EndOfStream => return Ok(()),
                ServerCode::Progress => {
                    progress
                        .read_delta(&mut self.conn, self.revision)
                        .await?;
                }
                ServerCode::Data => {
                    let reader = self.block_reader();
                    let _block =
                        reader.read_block(&mut self.conn).await?;
                }
                ServerCode::Log => {
                    self.drain_log_block().await?;
                }
                ServerCode::ProfileEvents => {
                    self.drain_uncompressed_block().await?;
                }
                ServerCode::TableColumns => {
                    let _name = self.conn.read_string().await?;
                    let _metadata = self.conn.read_string().await?;
                }
                ServerCode::Exception => {
                    let exception =
                        Exception::read(&mut self.conn).await?;
                    return Err(exception.into_error());
                }
                other => {
                    warn!(?other, "unexpected packet after insert");
                    return Err(Error::Protocol(format!(
                        "Unexpected packet after insert: {:?}",
                        other
                    )));
                }
            }
        }
    }

    /// Server log blocks are always uncompressed; emit them as debug logs.
    async fn drain_log_block(&mut self) -> Result<()> {
        let reader = BlockReader::new(self.revision);
        let block = reader.read_block(&mut self.conn).await?;
        debug!(rows = block.row_count(), "server log block");
        Ok(())
    }

    async fn drain_uncompressed_block(&mut self) -> Result<()> {
        let reader = BlockReader::new(self.revision);
        let _block = reader.read_block(&mut self.conn).await?;
        Ok(())
    }

    /// Ping the server.
    pub async fn ping(&mut self) -> Result<()> {
        self.check_ready()?;
        self.conn.write_varint(ClientCode::Ping as u64);
        self.conn.flush().await?;

        loop {
            let tag = ServerCode::try_from(self.conn.read_varint().await?)?;
            match tag {
                ServerCode::Pong => return Ok(()),
                // A late Progress from a previous query may still arrive
                ServerCode::Progress => {
                    let mut progress = Progress::default();
                    progress
                        .read_delta(&mut self.conn, self.revision)
                        .await?;
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "Expected Pong, got {:?}",
                        other
                    )))
                }
            }
        }
    }

    /// Close the session. Further operations fail with `not_open`.
    pub async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(feature = "tls")]
async fn open_transport(
    options: &ClientOptions,
    conn_options: ConnectionOptions,
) -> Result<Connection> {
    if options.use_tls {
        let stream = crate::connection::connect_tcp(
            &options.host,
            options.tls_port,
            options.timeout,
        )
        .await?;
        let tls = options.tls.wrap(stream, &options.host).await?;
        Ok(Connection::new(tls, conn_options))
    } else {
        Connection::connect(&options.host, options.port, conn_options)
            .await
    }
}

#[cfg(not(feature = "tls"))]
async fn open_transport(
    options: &ClientOptions,
    conn_options: ConnectionOptions,
) -> Result<Connection> {
    if options.use_tls {
        return Err(Error::Connection(
            "TLS requested but the 'tls' feature is not enabled"
                .to_string(),
        ));
    }
    Connection::connect(&options.host, options.port, conn_options).await
}

/// A collected query result.
pub struct QueryResult {
    /// The data blocks, in arrival order.
    pub blocks: Vec<Block>,
    /// Final progress counters.
    pub progress: Progress,
    /// Execution summary, when the server sent one.
    pub profile: Option<ProfileInfo>,
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("blocks", &self.blocks.len())
            .field("progress", &self.progress)
            .field("profile", &self.profile)
            .finish()
    }
}

impl QueryResult {
    /// Total rows across all blocks.
    pub fn total_rows(&self) -> usize {
        self.blocks.iter().map(Block::row_count).sum()
    }

    /// All rows projected as values.
    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        self.blocks.iter().flat_map(|block| {
            (0..block.row_count()).filter_map(|i| block.row(i))
        })
    }
}

/// Streams result blocks of one query. Borrows the session exclusively;
/// the session frees itself when the stream reaches EndOfStream, fails,
/// or is cancelled and drained.
pub struct QueryReader<'a> {
    client: &'a mut Client,
    progress: Progress,
    profile: Option<ProfileInfo>,
    done: bool,
}

impl QueryReader<'_> {
    /// The next data/totals/extremes block, or `None` at end of stream.
    /// Intermediate Progress/Log/ProfileEvents packets are folded in
    /// without disturbing block order.
    pub async fn next_block(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let tag = ServerCode::try_from(
                self.client.conn.read_varint().await?,
            )?;
            match tag {
                ServerCode::Data => {
                    let reader = self.client.block_reader();
                    let block =
                        reader.read_block(&mut self.client.conn).await?;
                    if block.is_empty() {
                        continue;
                    }
                    return Ok(Some(block));
                }
                ServerCode::Totals => {
                    let reader = self.client.block_reader();
                    let mut block =
                        reader.read_block(&mut self.client.conn).await?;
                    block.set_tag(BlockTag::Totals);
                    return Ok(Some(block));
                }
                ServerCode::Extremes => {
                    let reader = self.client.block_reader();
                    let mut block =
                        reader.read_block(&mut self.client.conn).await?;
                    block.set_tag(BlockTag::Extremes);
                    return Ok(Some(block));
                }
                ServerCode::Progress => {
                    self.progress
                        .read_delta(
                            &mut self.client.conn,
                            self.client.revision,
                        )
                        .await?;
                }
                ServerCode::ProfileInfo => {
                    self.profile = Some(
                        ProfileInfo::read(&mut self.client.conn).await?,
                    );
                }
                ServerCode::ProfileEvents => {
                    self.client.drain_uncompressed_block().await?;
                }
                ServerCode::Log => {
                    self.client.drain_log_block().await?;
                }
                ServerCode::TableColumns => {
                    let _name = self.client.conn.read_string().await?;
                    let _metadata =
                        self.client.conn.read_string().await?;
                }
                ServerCode::EndOfStream => {
                    self.done = true;
                    self.client.in_flight = false;
                    return Ok(None);
                }
                ServerCode::Exception => {
                    let exception =
                        Exception::read(&mut self.client.conn).await?;
                    self.done = true;
                    self.client.in_flight = false;
                    return Err(exception.into_error());
                }
                ServerCode::PartUUIDs => {
                    let count =
                        self.client.conn.read_varint().await? as usize;
                    let _uuids =
                        self.client.conn.read_bytes(count * 16).await?;
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "Unexpected packet during query: {:?}",
                        other
                    )))
                }
            }
        }
    }

    /// Cancel the running query: send one Cancel message and consume the
    /// stream to its end. The session is reusable afterwards.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.client.conn.write_varint(ClientCode::Cancel as u64);
        self.client.conn.flush().await?;
        debug!("cancel sent, draining");

        loop {
            match self.next_block().await {
                Ok(Some(_)) => continue,
                Ok(None) => return Ok(()),
                // A cancelled query may still answer with an exception
                Err(Error::Server { .. }) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    /// Progress so far.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// The execution summary, once received.
    pub fn profile(&self) -> Option<&ProfileInfo> {
        self.profile.as_ref()
    }
}
