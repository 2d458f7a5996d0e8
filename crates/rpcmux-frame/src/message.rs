use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::command::Command;
use crate::error::{Result, WireError};

/// Protocol magic stamped on every frame.
///
/// A receiver observing any other value treats the connection as corrupted
/// and tears it down; there is no partial-frame recovery.
pub const MAGIC_VERSION: u16 = 0x1b01;

/// Message kind — determines payload interpretation and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageKind {
    /// A new call; the only kind where the command is meaningful.
    Request = 0,
    /// Successful reply to a request or ping.
    Response = 1,
    /// One chunk of a stream, correlated by sequence number.
    StreamData = 2,
    /// Failed reply; payload carries the error text.
    Error = 3,
    /// Connection teardown marker.
    Close = 4,
    /// Liveness probe; answered with an empty `Response`.
    Ping = 5,
    /// End-of-stream marker for one streaming call.
    StreamClose = 6,
}

impl MessageKind {
    /// Decode a wire discriminant.
    pub fn from_wire(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            2 => Ok(Self::StreamData),
            3 => Ok(Self::Error),
            4 => Ok(Self::Close),
            5 => Ok(Self::Ping),
            6 => Ok(Self::StreamClose),
            other => Err(WireError::UnknownKind(other)),
        }
    }

    /// The wire discriminant.
    pub fn as_wire(self) -> u32 {
        self as u32
    }
}

/// Payload serialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum Codec {
    /// Structured text via serde_json. The only implemented codec.
    #[default]
    Json = 0,
    /// Reserved tag; every encode/decode through it fails with
    /// [`WireError::UnsupportedCodec`].
    Binary = 1,
}

impl Codec {
    /// Decode a wire discriminant.
    pub fn from_wire(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::Json),
            1 => Ok(Self::Binary),
            other => Err(WireError::UnknownCodec(other)),
        }
    }

    /// The wire discriminant.
    pub fn as_wire(self) -> u32 {
        self as u32
    }
}

/// The unit of transport: envelope identity plus a codec-tagged payload.
///
/// A message is built once, serialized once and immutable afterwards. The
/// one sanctioned derivation is [`Message::without_payload`], which clones
/// the identity (sequence, kind, command, codec) with an empty payload so
/// replies and stream chunks never re-derive identity fields.
#[derive(Debug, Clone)]
pub struct Message {
    /// Per-connection call correlation number, chosen by the request sender.
    pub seq: u32,
    /// Frame kind.
    pub kind: MessageKind,
    /// Requested operation; only meaningful on `Request` frames.
    pub cmd: Command,
    /// How `payload` is interpreted.
    pub codec: Codec,
    /// Opaque codec-encoded application value.
    pub payload: Bytes,
}

impl Message {
    /// Build a request envelope with an empty payload.
    pub fn request(cmd: Command, seq: u32) -> Self {
        Self {
            seq,
            kind: MessageKind::Request,
            cmd,
            codec: Codec::Json,
            payload: Bytes::new(),
        }
    }

    /// Build a bare control envelope (ping, close) with an empty command.
    pub fn control(kind: MessageKind, seq: u32) -> Self {
        Self {
            seq,
            kind,
            cmd: Command::default(),
            codec: Codec::Json,
            payload: Bytes::new(),
        }
    }

    /// Copy the envelope identity with the payload cleared.
    pub fn without_payload(&self) -> Self {
        Self {
            seq: self.seq,
            kind: self.kind,
            cmd: self.cmd,
            codec: self.codec,
            payload: Bytes::new(),
        }
    }

    /// Serialize `value` into the payload using this message's codec.
    pub fn encode_value<T: Serialize>(&mut self, value: &T) -> Result<()> {
        match self.codec {
            Codec::Json => {
                self.payload = Bytes::from(serde_json::to_vec(value)?);
                Ok(())
            }
            Codec::Binary => Err(WireError::UnsupportedCodec),
        }
    }

    /// Deserialize the payload using this message's codec.
    pub fn decode_value<T: DeserializeOwned>(&self) -> Result<T> {
        match self.codec {
            Codec::Json => Ok(serde_json::from_slice(&self.payload)?),
            Codec::Binary => Err(WireError::UnsupportedCodec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_roundtrip() {
        for kind in [
            MessageKind::Request,
            MessageKind::Response,
            MessageKind::StreamData,
            MessageKind::Error,
            MessageKind::Close,
            MessageKind::Ping,
            MessageKind::StreamClose,
        ] {
            assert_eq!(MessageKind::from_wire(kind.as_wire()).unwrap(), kind);
        }
        assert!(matches!(
            MessageKind::from_wire(7),
            Err(WireError::UnknownKind(7))
        ));
    }

    #[test]
    fn codec_wire_roundtrip() {
        assert_eq!(Codec::from_wire(0).unwrap(), Codec::Json);
        assert_eq!(Codec::from_wire(1).unwrap(), Codec::Binary);
        assert!(matches!(
            Codec::from_wire(9),
            Err(WireError::UnknownCodec(9))
        ));
    }

    #[test]
    fn json_value_roundtrip() {
        let mut msg = Message::request(Command::new("get_host").unwrap(), 7);
        msg.encode_value(&serde_json::json!({"host": "db-1", "port": 9090}))
            .unwrap();

        let value: serde_json::Value = msg.decode_value().unwrap();
        assert_eq!(value["host"], "db-1");
        assert_eq!(value["port"], 9090);
    }

    #[test]
    fn reserved_codec_fails_both_ways() {
        let mut msg = Message::request(Command::new("x").unwrap(), 1);
        msg.codec = Codec::Binary;

        let err = msg.encode_value(&42u32).unwrap_err();
        assert!(matches!(err, WireError::UnsupportedCodec));

        let err = msg.decode_value::<u32>().unwrap_err();
        assert!(matches!(err, WireError::UnsupportedCodec));
    }

    #[test]
    fn without_payload_preserves_identity() {
        let mut msg = Message::request(Command::new("tail_log").unwrap(), 42);
        msg.encode_value(&"chunk").unwrap();
        assert!(!msg.payload.is_empty());

        let shell = msg.without_payload();
        assert_eq!(shell.seq, 42);
        assert_eq!(shell.kind, MessageKind::Request);
        assert_eq!(shell.cmd.as_str(), "tail_log");
        assert_eq!(shell.codec, Codec::Json);
        assert!(shell.payload.is_empty());
    }

    #[test]
    fn control_envelope_has_empty_command() {
        let msg = Message::control(MessageKind::Ping, 3);
        assert!(msg.cmd.is_empty());
        assert!(msg.payload.is_empty());
        assert_eq!(msg.kind, MessageKind::Ping);
    }
}
