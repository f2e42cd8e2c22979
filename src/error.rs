//! Error types for the ClickHouse client.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, Error>`.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when using the ClickHouse client.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error occurred on the underlying TCP or TLS connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish a connection to the ClickHouse server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the supplied credentials during the handshake.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The server speaks a protocol revision older than the minimum this
    /// client supports.
    #[error("Unsupported protocol revision {server} (minimum {minimum})")]
    UnsupportedProtocol {
        /// Revision advertised by the server.
        server: u64,
        /// Oldest revision this client can talk to.
        minimum: u64,
    },

    /// An operation exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The transport entered its terminal broken state after an earlier I/O
    /// failure; the session must be reopened.
    #[error("Connection is broken: {0}")]
    ConnectionBroken(String),

    /// The peer closed the stream or a buffer ended before a complete value
    /// could be read.
    #[error("Short read: needed {needed} bytes, had {available}")]
    ShortRead {
        /// Bytes required to finish the read.
        needed: usize,
        /// Bytes that were actually available.
        available: usize,
    },

    /// A compressed frame failed its CityHash128 checksum validation.
    #[error("Corrupt frame: checksum mismatch")]
    CorruptFrame,

    /// An error during LZ4 or ZSTD compression/decompression.
    #[error("Compression error: {0}")]
    Compression(String),

    /// The method byte of a compressed frame is not LZ4, ZSTD, or None.
    #[error("Unsupported compression method byte: 0x{0:02x}")]
    UnsupportedCompressionMethod(u8),

    /// A protocol-level error, such as an unexpected packet tag or
    /// malformed data from the server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A column type spec the client does not know how to decode.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// An exception returned by the ClickHouse server. `code` is the
    /// innermost code of a nested exception chain.
    #[error("Server error {code} ({name}): {message}")]
    Server {
        /// ClickHouse error code (innermost of the chain).
        code: i32,
        /// Exception class name.
        name: String,
        /// Display text from the server.
        message: String,
    },

    /// Another query is already streaming on this session.
    #[error("Session is busy with another query")]
    Busy,

    /// The session has been closed.
    #[error("Session is not open")]
    NotOpen,

    /// The operation was cancelled via its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// The circuit breaker for the selected endpoint is open.
    #[error("Circuit open, retry in {retry_in:?}")]
    CircuitOpen {
        /// Time remaining until the breaker admits a trial request.
        retry_in: Duration,
    },

    /// Every configured endpoint is currently unhealthy.
    #[error("No server available")]
    NoServerAvailable,

    /// All retry attempts failed; the individual attempt errors are retained
    /// in order.
    #[error("All {} attempts failed, last: {}", .0.len(), .0.last().map(|e| e.to_string()).unwrap_or_default())]
    Aggregate(Vec<Error>),

    /// A type mismatch between the expected and actual column type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type that was expected.
        expected: String,
        /// The type that was received.
        actual: String,
    },

    /// A row could not be mapped into the caller's type.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A scalar accessor was called on an empty result.
    #[error("Empty result")]
    EmptyResult,

    /// A validation error, such as mismatched row counts in a block.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid UTF-8 was encountered when reading a string.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    /// The server exception code, if this error carries one. For
    /// [`Error::Aggregate`] the last attempt's code is reported.
    pub fn server_code(&self) -> Option<i32> {
        match self {
            Error::Server { code, .. } => Some(*code),
            Error::Aggregate(errors) => errors.last().and_then(Error::server_code),
            _ => None,
        }
    }
}

/// A type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
