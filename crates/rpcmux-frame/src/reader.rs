use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use rpcmux_transport::RpcStream;

use crate::codec::{decode_message, FrameConfig};
use crate::error::{Result, WireError};
use crate::message::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete frames.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(WireError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<Message> {
        loop {
            if let Some(msg) = decode_message(&mut self.buf, self.config.max_payload_size)? {
                return Ok(msg);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };

            if read == 0 {
                return Err(WireError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageReader<RpcStream> {
    /// Create a message reader for `RpcStream` and apply the read timeout
    /// from config to the socket.
    pub fn with_config_stream(inner: RpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_wire_error(err: rpcmux_transport::TransportError) -> WireError {
    match err {
        rpcmux_transport::TransportError::Io(io)
        | rpcmux_transport::TransportError::Accept(io) => WireError::Io(io),
        rpcmux_transport::TransportError::Bind { source, .. }
        | rpcmux_transport::TransportError::Connect { source, .. } => WireError::Io(source),
        other => WireError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, Bytes, BytesMut};

    use super::*;
    use crate::codec::encode_message;
    use crate::command::Command;
    use crate::message::{Codec, MessageKind, MAGIC_VERSION};

    fn wire_for(messages: &[Message]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for msg in messages {
            encode_message(msg, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn request(seq: u32, cmd: &str, payload: &'static [u8]) -> Message {
        Message {
            seq,
            kind: MessageKind::Request,
            cmd: Command::new(cmd).unwrap(),
            codec: Codec::Json,
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn read_single_message() {
        let wire = wire_for(&[request(1, "get_host", b"{}")]);
        let mut reader = MessageReader::new(Cursor::new(wire));

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.seq, 1);
        assert_eq!(msg.cmd.as_str(), "get_host");
        assert_eq!(msg.payload.as_ref(), b"{}");
    }

    #[test]
    fn read_multiple_messages_in_order() {
        let wire = wire_for(&[
            request(1, "one", b"1"),
            request(2, "two", b"2"),
            request(3, "three", b"3"),
        ]);
        let mut reader = MessageReader::new(Cursor::new(wire));

        for (seq, cmd) in [(1, "one"), (2, "two"), (3, "three")] {
            let msg = reader.read_message().unwrap();
            assert_eq!(msg.seq, seq);
            assert_eq!(msg.cmd.as_str(), cmd);
        }
    }

    #[test]
    fn partial_read_handling() {
        let wire = wire_for(&[request(4, "slow", b"chunked")]);
        let mut reader = MessageReader::new(ByteByByteReader {
            bytes: wire,
            pos: 0,
        });

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.seq, 4);
        assert_eq!(msg.payload.as_ref(), b"chunked");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = MessageReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut wire = wire_for(&[request(2, "cut", b"lost-payload")]);
        wire.truncate(crate::codec::HEADER_SIZE + 3);

        let mut reader = MessageReader::new(Cursor::new(wire));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn bad_magic_in_stream() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(0x0102);
        buf.resize(crate::codec::HEADER_SIZE, 0);

        let mut reader = MessageReader::new(Cursor::new(buf.to_vec()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, WireError::BadMagic { found: 0x0102, .. }));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut buf = BytesMut::new();
        encode_message(&request(1, "big", b"0123456789abcdef0123"), &mut buf).unwrap();

        let cfg = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = MessageReader::with_config(Cursor::new(buf.to_vec()), cfg);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, WireError::PayloadTooLarge { .. }));
    }

    #[test]
    fn interrupted_read_retries() {
        let wire = wire_for(&[request(8, "retry", b"ok")]);
        let mut reader = MessageReader::new(InterruptedThenData {
            interrupted: false,
            bytes: wire,
            pos: 0,
        });

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.seq, 8);
        assert_eq!(msg.payload.as_ref(), b"ok");
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_stream_pair() {
        let (left, right) = RpcStream::pair().unwrap();
        let mut writer = crate::writer::MessageWriter::new(left);
        let mut reader = MessageReader::new(right);

        writer.write_message(&request(11, "ping_echo", b"null")).unwrap();
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.seq, 11);
        assert_eq!(msg.cmd.as_str(), "ping_echo");
        assert_eq!(msg.payload.as_ref(), b"null");
    }

    #[test]
    #[cfg(unix)]
    fn applies_read_timeout_for_rpc_stream() {
        let (_left, right) = RpcStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };

        let mut reader = MessageReader::with_config_stream(right, cfg).unwrap();
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, WireError::Io(_)));
    }

    #[test]
    fn magic_matches_protocol_constant() {
        // First two wire bytes of every frame are the protocol magic.
        let wire = wire_for(&[request(1, "x", b"")]);
        assert_eq!(u16::from_le_bytes([wire[0], wire[1]]), MAGIC_VERSION);
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
