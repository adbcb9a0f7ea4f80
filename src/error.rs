//! Error types for stomp-session.

use thiserror::Error;

use crate::protocol::HeaderMap;

/// Main error type for all session operations.
#[derive(Debug, Error)]
pub enum StompError {
    /// I/O error during transport operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested protocol version is not supported.
    ///
    /// Raised synchronously at configuration time, never retried.
    #[error("STOMP version {0} is not supported")]
    UnsupportedVersion(String),

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The inbound byte stream could not be parsed into a valid frame.
    ///
    /// Always fatal to the current connection; the transport is torn down
    /// and the ordinary reconnect path takes over.
    #[error("{message}")]
    Parse {
        /// Human-readable failure description.
        message: String,
        /// Diagnostic payload, usually a rendering of the offending frame.
        detail: Option<String>,
    },

    /// An `ERROR` frame received from the broker.
    ///
    /// Application-level; does not by itself close the transport.
    #[error("broker error: {message}")]
    Broker {
        /// Value of the frame's `message` header, if present.
        message: String,
        /// All headers of the `ERROR` frame.
        headers: HeaderMap,
        /// Body of the `ERROR` frame.
        body: Vec<u8>,
    },

    /// The broker closed the connection without a disconnect in flight.
    #[error("server has gone away")]
    ServerGone,

    /// The configured reconnect budget is spent.
    #[error("{source} [reconnect attempts reached]")]
    RetriesExhausted {
        /// Number of reconnect attempts made.
        attempts: u32,
        /// The transport error that ended the final attempt.
        source: Box<StompError>,
    },

    /// No transport is currently open.
    #[error("connection closed")]
    ConnectionClosed,

    /// The session task has terminated.
    #[error("session closed")]
    SessionClosed,
}

/// Result type alias using StompError.
pub type Result<T> = std::result::Result<T, StompError>;
