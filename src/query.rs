//! Query descriptions and the per-query protocol structures: settings with
//! flags, client info, progress and profile counters, and server
//! exceptions.

use crate::connection::Connection;
use crate::protocol::{
    Feature,
    Revision,
    CLIENT_REVISION,
    CLIENT_VERSION_MAJOR,
    CLIENT_VERSION_MINOR,
    CLIENT_VERSION_PATCH,
};
use crate::Result;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Per-setting flag: the server must not ignore the setting.
pub const SETTING_FLAG_IMPORTANT: u64 = 0x01;
/// Per-setting flag: the setting is custom, serialized as a string.
pub const SETTING_FLAG_CUSTOM: u64 = 0x02;
/// Per-setting flag: the setting is obsolete.
pub const SETTING_FLAG_OBSOLETE: u64 = 0x04;

/// One query setting: value plus its flag bits.
#[derive(Debug, Clone)]
pub struct SettingValue {
    /// The setting value, serialized as a string.
    pub value: String,
    /// Flag bits (`SETTING_FLAG_*`).
    pub flags: u64,
}

/// OpenTelemetry trace context carried in ClientInfo (W3C Trace Context).
#[derive(Clone, Debug, Default)]
pub struct TracingContext {
    /// 128-bit trace id.
    pub trace_id: u128,
    /// 64-bit span id.
    pub span_id: u64,
    /// `tracestate` header value.
    pub tracestate: String,
    /// 8-bit trace flags.
    pub trace_flags: u8,
}

impl TracingContext {
    /// Whether a trace is attached (non-zero trace id).
    pub fn is_enabled(&self) -> bool {
        self.trace_id != 0
    }
}

/// A query to execute: SQL text, identity, settings, and parameters.
#[derive(Clone)]
pub struct Query {
    text: String,
    id: String,
    settings: BTreeMap<String, SettingValue>,
    parameters: BTreeMap<String, String>,
    tracing: Option<TracingContext>,
    cancellation: Option<CancellationToken>,
}

impl Query {
    /// Create a query from SQL text. A query id is generated on send when
    /// none is set.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            id: String::new(),
            settings: BTreeMap::new(),
            parameters: BTreeMap::new(),
            tracing: None,
            cancellation: None,
        }
    }

    /// Set an explicit query id (used for cancellation and tracing).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set a query-level setting.
    pub fn with_setting(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.settings.insert(
            name.into(),
            SettingValue { value: value.into(), flags: 0 },
        );
        self
    }

    /// Set a query-level setting with explicit flags.
    pub fn with_setting_flags(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        flags: u64,
    ) -> Self {
        self.settings.insert(
            name.into(),
            SettingValue { value: value.into(), flags },
        );
        self
    }

    /// Set a server-side query parameter.
    pub fn with_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Attach an OpenTelemetry trace context.
    pub fn with_tracing(mut self, context: TracingContext) -> Self {
        self.tracing = Some(context);
        self
    }

    /// Attach a cancellation token polled while this query runs.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Ask the server to serialize JSON columns as strings.
    pub fn with_json_as_string(self) -> Self {
        self.with_setting("output_format_native_write_json_as_string", "1")
    }

    /// The SQL text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The query id ("" until assigned).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        &self.id
    }

    /// The settings map.
    pub fn settings(&self) -> &BTreeMap<String, SettingValue> {
        &self.settings
    }

    /// The parameters map.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// The attached trace context, if any.
    pub fn tracing(&self) -> Option<&TracingContext> {
        self.tracing.as_ref()
    }

    /// The attached cancellation token, if any.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

/// What kind of query the client info describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueryKind {
    /// No query attached (ping, cancel).
    None = 0,
    /// A query issued directly by this client.
    Initial = 1,
    /// A query forwarded by another server.
    Secondary = 2,
}

/// Identity the client presents with every query. Serialization is
/// revision-gated field by field.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Query kind, normally [`QueryKind::Initial`].
    pub query_kind: QueryKind,
    /// User that started the initial query.
    pub initial_user: String,
    /// Id of the initial query in distributed execution.
    pub initial_query_id: String,
    /// Address the initial query came from.
    pub initial_address: String,
    /// OS user running the client.
    pub os_user: String,
    /// Hostname of the client machine.
    pub client_hostname: String,
    /// Client name presented in the handshake.
    pub client_name: String,
    /// Quota key, empty unless assigned.
    pub quota_key: String,
    /// Distributed query depth.
    pub distributed_depth: u64,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            query_kind: QueryKind::Initial,
            initial_user: String::new(),
            initial_query_id: String::new(),
            initial_address: "0.0.0.0:0".to_string(),
            os_user: std::env::var("USER").unwrap_or_default(),
            client_hostname: std::env::var("HOSTNAME")
                .unwrap_or_else(|_| "localhost".to_string()),
            client_name: "clickhouse-tcp-client".to_string(),
            quota_key: String::new(),
            distributed_depth: 0,
        }
    }
}

impl ClientInfo {
    /// Queue the revision-gated ClientInfo section of a Query packet.
    pub fn write(
        &self,
        conn: &mut Connection,
        revision: Revision,
        query_id: &str,
        tracing: Option<&TracingContext>,
    ) {
        conn.write_u8(self.query_kind as u8);
        conn.write_string(&self.initial_user);
        let initial_query_id = if self.initial_query_id.is_empty() {
            query_id
        } else {
            &self.initial_query_id
        };
        conn.write_string(initial_query_id);
        conn.write_string(&self.initial_address);

        if revision.supports(Feature::InitialQueryStartTime) {
            conn.write_i64(0);
        }

        conn.write_u8(1); // interface: TCP
        conn.write_string(&self.os_user);
        conn.write_string(&self.client_hostname);
        conn.write_string(&self.client_name);
        conn.write_varint(CLIENT_VERSION_MAJOR);
        conn.write_varint(CLIENT_VERSION_MINOR);
        conn.write_varint(CLIENT_REVISION);

        if revision.supports(Feature::QuotaKeyInClientInfo) {
            conn.write_string(&self.quota_key);
        }
        if revision.supports(Feature::DistributedDepth) {
            conn.write_varint(self.distributed_depth);
        }
        if revision.supports(Feature::VersionPatch) {
            conn.write_varint(CLIENT_VERSION_PATCH);
        }
        if revision.supports(Feature::OpenTelemetry) {
            match tracing.filter(|t| t.is_enabled()) {
                Some(context) => {
                    conn.write_u8(1);
                    conn.write_bytes(
                        &context.trace_id.to_be_bytes(),
                    );
                    conn.write_bytes(&context.span_id.to_be_bytes());
                    conn.write_string(&context.tracestate);
                    conn.write_u8(context.trace_flags);
                }
                None => conn.write_u8(0),
            }
        }
        if revision.supports(Feature::ParallelReplicas) {
            conn.write_varint(0); // collaborate_with_initiator
            conn.write_varint(0); // count_participating_replicas
            conn.write_varint(0); // number_of_current_replica
        }
    }
}

/// Server-reported query progress counters, accumulated across packets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Rows read so far.
    pub read_rows: u64,
    /// Bytes read so far.
    pub read_bytes: u64,
    /// Estimated total rows to read.
    pub total_rows_to_read: u64,
    /// Estimated total bytes to read.
    pub total_bytes_to_read: u64,
    /// Rows written (inserts).
    pub written_rows: u64,
    /// Bytes written (inserts).
    pub written_bytes: u64,
    /// Server-side elapsed time in nanoseconds.
    pub elapsed_ns: u64,
}

impl Progress {
    /// Read one Progress packet body and fold it into the totals.
    pub async fn read_delta(
        &mut self,
        conn: &mut Connection,
        revision: Revision,
    ) -> Result<()> {
        self.read_rows += conn.read_varint().await?;
        self.read_bytes += conn.read_varint().await?;
        self.total_rows_to_read = conn.read_varint().await?;
        if revision.supports(Feature::TotalBytesInProgress) {
            self.total_bytes_to_read = conn.read_varint().await?;
        }
        if revision.supports(Feature::ClientWriteInfo) {
            self.written_rows += conn.read_varint().await?;
            self.written_bytes += conn.read_varint().await?;
        }
        if revision.supports(Feature::ServerQueryTimeInProgress) {
            self.elapsed_ns += conn.read_varint().await?;
        }
        Ok(())
    }
}

/// Server-reported execution summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    /// Rows in the result.
    pub rows: u64,
    /// Blocks in the result.
    pub blocks: u64,
    /// Bytes in the result.
    pub bytes: u64,
    /// Whether a LIMIT was applied.
    pub applied_limit: bool,
    /// Row count before the LIMIT.
    pub rows_before_limit: u64,
    /// Whether `rows_before_limit` was actually computed.
    pub calculated_rows_before_limit: bool,
}

impl ProfileInfo {
    /// Read one ProfileInfo packet body.
    pub async fn read(conn: &mut Connection) -> Result<Self> {
        Ok(Self {
            rows: conn.read_varint().await?,
            blocks: conn.read_varint().await?,
            bytes: conn.read_varint().await?,
            applied_limit: conn.read_u8().await? != 0,
            rows_before_limit: conn.read_varint().await?,
            calculated_rows_before_limit: conn.read_u8().await? != 0,
        })
    }
}

/// A server exception, possibly wrapping a nested cause chain.
#[derive(Debug, Clone)]
pub struct Exception {
    /// ClickHouse error code.
    pub code: i32,
    /// Exception class name.
    pub name: String,
    /// Display text.
    pub message: String,
    /// Server-side stack trace.
    pub stack_trace: String,
    /// The wrapped cause, if any.
    pub nested: Option<Box<Exception>>,
}

impl Exception {
    /// Read an exception chain from the connection.
    pub fn read<'a>(
        conn: &'a mut Connection,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Exception>> + Send + 'a>,
    > {
        Box::pin(async move {
            let code = conn.read_i32().await?;
            let name = conn.read_string().await?;
            let message = conn.read_string().await?;
            let stack_trace = conn.read_string().await?;
            let has_nested = conn.read_u8().await? != 0;
            let nested = if has_nested {
                Some(Box::new(Exception::read(conn).await?))
            } else {
                None
            };
            Ok(Exception { code, name, message, stack_trace, nested })
        })
    }

    /// The innermost exception of the chain; its code is the primary one.
    pub fn innermost(&self) -> &Exception {
        match &self.nested {
            Some(nested) => nested.innermost(),
            None => self,
        }
    }

    /// Convert into the crate error, using the innermost code.
    pub fn into_error(self) -> crate::Error {
        let inner = self.innermost();
        crate::Error::Server {
            code: inner.code,
            name: inner.name.clone(),
            message: inner.message.clone(),
        }
    }
}

/// Server identity captured from the Hello exchange.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server name string.
    pub name: String,
    /// Major version.
    pub version_major: u64,
    /// Minor version.
    pub version_minor: u64,
    /// Patch version (revision-gated).
    pub version_patch: u64,
    /// The server's protocol revision (before negotiation).
    pub revision: u64,
    /// Server timezone (revision-gated).
    pub timezone: String,
    /// Server display name (revision-gated).
    pub display_name: String,
}
