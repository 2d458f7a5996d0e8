use std::time::Duration;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Wire-level error (framing, codec, command construction).
    #[error("wire error: {0}")]
    Wire(#[from] rpcmux_frame::WireError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] rpcmux_transport::TransportError),

    /// A unary call received no matching reply within its timeout.
    #[error("r/w timeout after {0:?}")]
    RwTimeout(Duration),

    /// A ping received no matching reply within its timeout.
    #[error("ping timeout after {0:?}")]
    PingTimeout(Duration),

    /// No handler is registered for the requested command.
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// The stream has ended; no further chunks will be delivered.
    #[error("stream stopped")]
    StreamStopped,

    /// The connection was torn down while the call was outstanding.
    #[error("transport closed")]
    TransportClosed,

    /// The peer's handler reported an error for this call.
    #[error("remote error: {0}")]
    Remote(String),

    /// A command was registered twice.
    #[error("command already registered: {0}")]
    DuplicateCommand(String),

    /// Failed to spawn a worker thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
