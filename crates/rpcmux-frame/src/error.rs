/// Errors that can occur at the wire layer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The frame header carries a different protocol magic.
    #[error("invalid protocol magic 0x{found:04x} (expected 0x{expected:04x})")]
    BadMagic { found: u16, expected: u16 },

    /// The frame header carries an unknown message kind.
    #[error("unknown message kind {0}")]
    UnknownKind(u32),

    /// The frame header carries an unknown codec tag.
    #[error("unknown codec tag {0}")]
    UnknownCodec(u32),

    /// The codec tag is recognized but not implemented.
    #[error("unsupported codec")]
    UnsupportedCodec,

    /// A command name does not fit the fixed identifier capacity.
    #[error("command overlength ({len} bytes, max {max})")]
    CommandOverlength { len: usize, max: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Payload serialization/deserialization failed.
    #[error("codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;
