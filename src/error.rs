//! Error types for reconstruction client operations
//!
//! Every fallible operation in this crate returns [`Result`]. A byte-stream
//! protocol cannot be resynchronized after a partial read, so decode and
//! persist errors inside the receive loop terminate the connection; there is
//! no per-message recovery.

use thiserror::Error;

/// Reconstruction client error types
#[derive(Error, Debug)]
pub enum ClientError {
    /// Address resolution or connection failure, including connect timeout
    ///
    /// Connection errors are fatal to the run; the client never reconnects.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The receive loop saw a message identifier with no registered reader
    ///
    /// Message lengths are opaque without a reader, so an unknown identifier
    /// leaves the stream position unknowable. The connection is considered
    /// desynchronized and is terminated.
    #[error("Protocol desynchronized: no reader registered for message id {id}")]
    ProtocolDesync {
        /// The unrecognized message identifier
        id: u16,
    },

    /// Malformed or unsupported wire data
    ///
    /// Raised for unsupported image data-type tags and for payloads whose
    /// declared sizes are inconsistent with the bytes on the wire.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An output artifact could not be written
    ///
    /// Fatal inside a reader: the message bytes have already been consumed
    /// and cannot be replayed.
    #[error("Persist error: {0}")]
    Persist(String),

    /// A compression codec was requested that is not compiled in
    ///
    /// The only caller-recoverable error: callers may fall back to another
    /// codec or to uncompressed transmission.
    #[error("Codec not available: {0}")]
    CodecUnavailable(&'static str),

    /// Contradictory compression configuration
    ///
    /// Rejected before any network activity.
    #[error("Codec configuration error: {0}")]
    CodecConfig(String),

    /// I/O error during network communication or file access
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Text payload was not valid UTF-8
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A diagnostic meta document could not be parsed
    #[error("Meta document error: {0}")]
    Meta(#[from] serde_json::Error),
}

/// Result type alias for reconstruction client operations
pub type Result<T> = std::result::Result<T, ClientError>;
