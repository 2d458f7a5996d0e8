use bytes::{Buf, BufMut, BytesMut};

use crate::command::{Command, COMMAND_CAPACITY};
use crate::error::{Result, WireError};
use crate::message::{Codec, Message, MessageKind, MAGIC_VERSION};

/// Frame header: magic (2) + seq (4) + kind (4) + command (40) + codec (4)
/// + payload length (4) = 58 bytes.
pub const HEADER_SIZE: usize = 2 + 4 + 4 + COMMAND_CAPACITY + 4 + 4;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode a message into the wire format.
///
/// Wire layout (all integers little-endian):
/// ```text
/// ┌───────────┬─────────┬──────────┬──────────────┬──────────┬──────────┬─────────────────┐
/// │ Magic     │ Seq     │ Kind     │ Command      │ Codec    │ Length   │ Payload         │
/// │ (2B)      │ (4B)    │ (4B)     │ (40B, 0-pad) │ (4B)     │ (4B)     │ (Length bytes)  │
/// └───────────┴─────────┴──────────┴──────────────┴──────────┴──────────┴─────────────────┘
/// ```
pub fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    if msg.payload.len() > u32::MAX as usize {
        return Err(WireError::PayloadTooLarge {
            size: msg.payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + msg.payload.len());
    dst.put_u16_le(MAGIC_VERSION);
    dst.put_u32_le(msg.seq);
    dst.put_u32_le(msg.kind.as_wire());
    dst.put_slice(msg.cmd.as_wire());
    dst.put_u32_le(msg.codec.as_wire());
    dst.put_u32_le(msg.payload.len() as u32);
    dst.put_slice(&msg.payload);
    Ok(())
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. A magic mismatch
/// or unknown kind/codec discriminant is a framing error; the connection
/// owning this buffer must be torn down.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let magic = u16::from_le_bytes([src[0], src[1]]);
    if magic != MAGIC_VERSION {
        return Err(WireError::BadMagic {
            found: magic,
            expected: MAGIC_VERSION,
        });
    }

    let seq = u32::from_le_bytes([src[2], src[3], src[4], src[5]]);
    let kind = MessageKind::from_wire(u32::from_le_bytes([src[6], src[7], src[8], src[9]]))?;

    let mut cmd = [0u8; COMMAND_CAPACITY];
    cmd.copy_from_slice(&src[10..10 + COMMAND_CAPACITY]);

    let codec_off = 10 + COMMAND_CAPACITY;
    let codec = Codec::from_wire(u32::from_le_bytes([
        src[codec_off],
        src[codec_off + 1],
        src[codec_off + 2],
        src[codec_off + 3],
    ]))?;

    let len_off = codec_off + 4;
    let payload_len = u32::from_le_bytes([
        src[len_off],
        src[len_off + 1],
        src[len_off + 2],
        src[len_off + 3],
    ]) as usize;

    if payload_len > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Message {
        seq,
        kind,
        cmd: Command::from_wire(cmd),
        codec,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
