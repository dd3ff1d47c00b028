use thiserror::Error;

/// Errors that can occur during peer communication.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Dialling a remote host took longer than the dial timeout.
    ///
    /// The downloader treats this as "move on to the next host".
    #[error("dial timeout")]
    DialTimeout,

    /// The peer sent an invalid handshake.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The remote end cannot serve the requested file root.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The peer answered the handshake with a different file root.
    #[error("file hash mismatch")]
    FileHashMismatch,

    /// Received a malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Received an unknown message ID.
    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),

    /// Protocol violation that poisons the stream (e.g. an oversized
    /// frame that cannot be skipped).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// A read or write timed out.
    #[error("timeout")]
    Timeout,
}
