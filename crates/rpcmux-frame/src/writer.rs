use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use rpcmux_transport::RpcStream;

use crate::codec::{encode_message, FrameConfig};
use crate::error::{Result, WireError};
use crate::message::Message;
use crate::reader::transport_to_wire_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
///
/// One writer per connection: the session layer funnels every outbound
/// frame through a single owner so frames are never interleaved.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write a complete message, then flush (blocking).
    pub fn write_message(&mut self, msg: &Message) -> Result<()> {
        if msg.payload.len() > self.config.max_payload_size {
            return Err(WireError::PayloadTooLarge {
                size: msg.payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_message(msg, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageWriter<RpcStream> {
    /// Create a message writer for `RpcStream` and apply the write timeout
    /// from config to the socket.
    pub fn with_config_stream(inner: RpcStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }
}
