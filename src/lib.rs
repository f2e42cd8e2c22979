//! # ClickHouse TCP Client
//!
//! An async Rust client for the ClickHouse native TCP protocol, with
//! LZ4/ZSTD block compression, TLS, and a resilience layer (retry,
//! circuit breaking, health checking, load balancing) for multi-endpoint
//! deployments.
//!
//! # Quick Start
//!
//! ```no_run
//! use clickhouse_tcp_client::{Client, ClientOptions, Value};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ClientOptions::new("localhost", 9000)
//!     .database("default")
//!     .username("default");
//! let mut client = Client::connect(options).await?;
//!
//! client
//!     .execute("CREATE TABLE IF NOT EXISTS t (id Int32, name String) ENGINE = Memory")
//!     .await?;
//!
//! client
//!     .bulk_insert(
//!         "t",
//!         &[
//!             vec![Value::Int32(1), Value::String("alice".into())],
//!             vec![Value::Int32(2), Value::String("bob".into())],
//!         ],
//!         Default::default(),
//!     )
//!     .await?;
//!
//! let count: u64 = client.query_scalar("SELECT count() FROM t").await?;
//! assert_eq!(count, 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Multiple endpoints
//!
//! ```no_run
//! use clickhouse_tcp_client::resilience::{ResilienceOptions, ResilientClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ResilienceOptions::new(&["ch0:9000", "ch1:9000", "ch2:9000"])?;
//! let client = ResilientClient::new(options)?;
//! let one: u64 = client.query_scalar("SELECT 1").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! - **`tls`** - TLS connections via `rustls` and `tokio-rustls`.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(missing_docs)]

/// Data blocks (collections of named columns).
pub mod block;
/// Session client: handshake, queries, inserts.
pub mod client;
/// Column codecs for every supported type.
pub mod column;
/// CityHash128-checksummed LZ4/ZSTD block framing.
pub mod compression;
/// The buffered TCP/TLS transport.
pub mod connection;
/// Error types and `Result` alias.
pub mod error;
/// Buffer pooling, sync codec helpers, block reader/writer.
pub mod io;
/// Protocol constants and the revision feature table.
pub mod protocol;
/// Query descriptions and per-query protocol structures.
pub mod query;
/// Retry, circuit breaker, health checking, load balancing.
pub mod resilience;
/// The ClickHouse type system and type-spec parser.
pub mod types;
/// Async wire-format primitives (varint, fixed-size, strings).
pub mod wire_format;

/// TLS connection options (requires the `tls` feature).
#[cfg(feature = "tls")]
pub mod ssl;

pub use block::{
    Block,
    BlockInfo,
    BlockTag,
};
pub use client::{
    Client,
    ClientOptions,
    Endpoint,
    InsertOptions,
    QueryReader,
    QueryResult,
};
pub use column::{
    FromValue,
    Value,
};
pub use connection::ConnectionOptions;
pub use error::{
    Error,
    Result,
};
pub use protocol::CompressionMethod;
pub use query::{
    ClientInfo,
    Exception,
    ProfileInfo,
    Progress,
    Query,
    TracingContext,
};
pub use types::Type;

#[cfg(feature = "tls")]
pub use ssl::TlsOptions;
