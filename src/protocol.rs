//! Protocol constants: packet tags, query stage, compression method, and the
//! revision feature table.
//!
//! Every protocol capability is gated on the negotiated session revision.
//! Instead of scattering numeric comparisons through the codec, each gated
//! capability is a [`Feature`] variant with its minimum revision, and both the
//! reader and writer ask [`Revision::supports`].

/// Types of packets received from server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ServerCode {
    /// Server handshake response containing name, version, and revision.
    Hello = 0,
    /// Block of data, may be compressed.
    Data = 1,
    /// Exception that occurred during query execution.
    Exception = 2,
    /// Query execution progress: rows and bytes read.
    Progress = 3,
    /// Response to a client Ping request.
    Pong = 4,
    /// Signals that all packets for the current operation have been sent.
    EndOfStream = 5,
    /// Profiling data for query execution.
    ProfileInfo = 6,
    /// Block of totals, may be compressed.
    Totals = 7,
    /// Block of extremes (mins and maxs), may be compressed.
    Extremes = 8,
    /// Response to a TablesStatus request.
    TablesStatusResponse = 9,
    /// Query execution log (always uncompressed).
    Log = 10,
    /// Columns description for default values calculation.
    TableColumns = 11,
    /// List of unique part UUIDs.
    PartUUIDs = 12,
    /// Request for the next distributed read task.
    ReadTaskRequest = 13,
    /// Profile events from the server (always uncompressed).
    ProfileEvents = 14,
}

impl TryFrom<u64> for ServerCode {
    type Error = crate::Error;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServerCode::Hello),
            1 => Ok(ServerCode::Data),
            2 => Ok(ServerCode::Exception),
            3 => Ok(ServerCode::Progress),
            4 => Ok(ServerCode::Pong),
            5 => Ok(ServerCode::EndOfStream),
            6 => Ok(ServerCode::ProfileInfo),
            7 => Ok(ServerCode::Totals),
            8 => Ok(ServerCode::Extremes),
            9 => Ok(ServerCode::TablesStatusResponse),
            10 => Ok(ServerCode::Log),
            11 => Ok(ServerCode::TableColumns),
            12 => Ok(ServerCode::PartUUIDs),
            13 => Ok(ServerCode::ReadTaskRequest),
            14 => Ok(ServerCode::ProfileEvents),
            _ => Err(crate::Error::Protocol(format!(
                "Unknown server packet tag: {}",
                value
            ))),
        }
    }
}

/// Types of packets sent by client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ClientCode {
    /// Client handshake containing name, version, and default database.
    Hello = 0,
    /// Query packet with query id, client info, settings, stage, compression,
    /// and query text.
    Query = 1,
    /// Data block (e.g. INSERT data), may be compressed.
    Data = 2,
    /// Cancel the currently running query.
    Cancel = 3,
    /// Ping the server to check the connection is alive.
    Ping = 4,
    /// Request status of tables.
    TablesStatusRequest = 5,
    /// Keep the connection alive.
    KeepAlive = 6,
}

/// Should the server send compressed Blocks of data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum CompressionState {
    /// Block compression is disabled.
    Disable = 0,
    /// Block compression is enabled.
    Enable = 1,
}

/// Query processing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Stage {
    /// Fully process the query and return the final result.
    Complete = 2,
}

/// Methods of block compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression (default).
    #[default]
    None,
    /// LZ4 compression -- fast with good compression ratio.
    Lz4,
    /// ZSTD compression -- better ratio but slower than LZ4.
    Zstd,
}

/// Oldest server revision this client can talk to.
pub const MIN_SUPPORTED_REVISION: u64 = 54406;

/// Revision this client advertises in its Hello.
pub const CLIENT_REVISION: u64 = 54467;

/// Client version sent in Hello and ClientInfo.
pub const CLIENT_VERSION_MAJOR: u64 = 1;
/// Minor component of the advertised client version.
pub const CLIENT_VERSION_MINOR: u64 = 0;
/// Patch component of the advertised client version.
pub const CLIENT_VERSION_PATCH: u64 = 0;

/// Revision-gated protocol capabilities. Each variant knows the minimum
/// server revision where the corresponding wire field appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Temporary table name string preceding each Data block.
    TemporaryTables,
    /// Block info fields (is_overflows, bucket_num) in the block header.
    BlockInfo,
    /// ClientInfo section inside the Query packet.
    ClientInfo,
    /// Timezone string in the server Hello.
    ServerTimezone,
    /// Quota key string inside ClientInfo.
    QuotaKeyInClientInfo,
    /// Display name string in the server Hello.
    ServerDisplayName,
    /// Version patch varint in Hello and ClientInfo.
    VersionPatch,
    /// Server log packets.
    ServerLogs,
    /// Written rows/bytes counters in Progress packets.
    ClientWriteInfo,
    /// Settings serialized as strings with per-setting flags.
    SettingsSerializedAsStrings,
    /// Inter-server secret string in the Query packet.
    InterserverSecret,
    /// OpenTelemetry trace context inside ClientInfo.
    OpenTelemetry,
    /// Distributed depth varint inside ClientInfo.
    DistributedDepth,
    /// Initial query start time inside ClientInfo.
    InitialQueryStartTime,
    /// Parallel-replica fields inside ClientInfo.
    ParallelReplicas,
    /// Per-column custom serialization hint byte.
    CustomSerialization,
    /// Addendum (quota key) sent by the client after the Hello exchange.
    Addendum,
    /// Query parameters section after the query text.
    QueryParameters,
    /// Server-side query elapsed time in Progress packets.
    ServerQueryTimeInProgress,
    /// Password complexity rules in the server Hello.
    PasswordComplexityRules,
    /// Nonce-based inter-server secret exchange.
    InterserverSecretV2,
    /// Total bytes counter in Progress packets.
    TotalBytesInProgress,
}

impl Feature {
    /// The minimum protocol revision where this capability appears on the
    /// wire. Values are the DBMS_MIN_* constants from the ClickHouse source.
    pub const fn min_revision(self) -> u64 {
        match self {
            Feature::TemporaryTables => 50264,
            Feature::BlockInfo => 51903,
            Feature::ClientInfo => 54032,
            Feature::ServerTimezone => 54058,
            Feature::QuotaKeyInClientInfo => 54060,
            Feature::ServerDisplayName => 54372,
            Feature::VersionPatch => 54401,
            Feature::ServerLogs => 54406,
            Feature::ClientWriteInfo => 54405,
            Feature::SettingsSerializedAsStrings => 54429,
            Feature::InterserverSecret => 54441,
            Feature::OpenTelemetry => 54442,
            Feature::DistributedDepth => 54448,
            Feature::InitialQueryStartTime => 54449,
            Feature::ParallelReplicas => 54453,
            Feature::CustomSerialization => 54454,
            Feature::Addendum => 54458,
            Feature::QueryParameters => 54459,
            Feature::ServerQueryTimeInProgress => 54460,
            Feature::PasswordComplexityRules => 54461,
            Feature::InterserverSecretV2 => 54462,
            Feature::TotalBytesInProgress => 54463,
        }
    }
}

/// The negotiated session revision: `min(client_advertised, server_revision)`.
/// Immutable for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Revision(pub u64);

impl Revision {
    /// Negotiate the session revision from the server's advertised value.
    pub fn negotiate(server_revision: u64) -> Self {
        Revision(server_revision.min(CLIENT_REVISION))
    }

    /// Whether the given capability is present on the wire at this revision.
    pub fn supports(self, feature: Feature) -> bool {
        self.0 >= feature.min_revision()
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
