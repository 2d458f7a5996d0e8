//! Connection multiplexing for the rpcmux RPC protocol.
//!
//! A [`Session`] owns one byte stream and turns concurrent logical calls
//! into one serialized read sequence and one serialized write sequence.
//! Unary calls block until their correlated reply or a timeout; streaming
//! calls get a [`StreamChannel`] — a bounded bidirectional sub-flow nested
//! inside one call's sequence number. Inbound requests are dispatched
//! through a [`HandlerRegistry`] populated before serving begins.

pub mod error;
pub mod listener;
pub mod registry;
pub mod session;
pub mod stream;

pub use error::{Result, SessionError};
pub use listener::RpcListener;
pub use registry::HandlerRegistry;
pub use session::{Session, SessionConfig};
pub use stream::StreamChannel;
