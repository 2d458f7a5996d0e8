//! Multiplexed RPC over byte streams.
//!
//! One connection carries many concurrent logical calls. Each call is a
//! sequence-numbered frame exchange: unary calls pair one request with one
//! response, streaming calls nest a bidirectional flow of bounded,
//! FIFO-ordered chunks inside a single sequence number. Servers bind
//! command names to handlers in a [`HandlerRegistry`] and accept
//! connections through an [`RpcListener`]; clients open a [`Session`]
//! directly.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use rpcmux::{HandlerRegistry, RpcListener, Session};
//! use serde_json::{json, Value};
//!
//! # fn main() -> rpcmux::Result<()> {
//! let mut registry = HandlerRegistry::new();
//! registry.register("get_host", |msg| {
//!     let name: String = msg.decode_value()?;
//!     Ok(json!({ "host": name, "status": "ok" }))
//! })?;
//!
//! let listener = RpcListener::bind_tcp("127.0.0.1:9090", registry)?;
//! std::thread::spawn(move || listener.serve());
//!
//! let client = Session::connect_tcp("127.0.0.1:9090")?;
//! let reply: Value = client.call("get_host", &"node-1", Duration::from_secs(3))?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub use rpcmux_frame::{
    decode_message, encode_message, Codec, Command, FrameConfig, Message, MessageKind,
    MessageReader, MessageWriter, WireError, COMMAND_CAPACITY, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
    MAGIC_VERSION,
};
pub use rpcmux_session::{
    HandlerRegistry, Result, RpcListener, Session, SessionConfig, SessionError, StreamChannel,
};
pub use rpcmux_transport::{RpcStream, TcpEndpoint, TransportError};
#[cfg(unix)]
pub use rpcmux_transport::UnixDomainSocket;
