//! Blocking byte-stream transports for the rpcmux RPC protocol.
//!
//! The protocol layers above only need three things from a transport:
//! blocking read, blocking write, and an explicit shutdown. [`RpcStream`]
//! provides exactly that over Unix domain sockets and TCP.

pub mod error;
pub mod stream;
pub mod tcp;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::RpcStream;
pub use tcp::TcpEndpoint;
#[cfg(unix)]
pub use uds::UnixDomainSocket;
