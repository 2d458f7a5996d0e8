//! Wire envelope and message framing for the rpcmux RPC protocol.
//!
//! Every frame carries a fixed-format envelope:
//! - A 2-byte protocol magic for stream synchronization
//! - A 4-byte sequence number correlating requests with their replies
//! - A 4-byte message kind
//! - A 40-byte fixed-capacity command identifier
//! - A 4-byte codec tag and 4-byte payload length
//!
//! All integers are little-endian. No partial reads, no buffer management
//! in user code.

pub mod codec;
pub mod command;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_message, encode_message, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use command::{Command, COMMAND_CAPACITY};
pub use error::{Result, WireError};
pub use message::{Codec, Message, MessageKind, MAGIC_VERSION};
pub use reader::MessageReader;
pub use writer::MessageWriter;
