use std::net::{SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::RpcStream;

/// TCP endpoint.
///
/// The storage tier listens on TCP in networked deployments; Unix domain
/// sockets cover same-host setups and tests.
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on a TCP address, e.g. `"127.0.0.1:9090"`.
    ///
    /// Binding port 0 picks an ephemeral port; see [`TcpEndpoint::local_addr`].
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        info!(%local_addr, "listening on tcp");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<RpcStream> {
        let (stream, peer_addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer_addr, "accepted connection");
        configure(&stream)?;
        Ok(RpcStream::from_tcp(stream))
    }

    /// Connect to a listening TCP endpoint (blocking).
    pub fn connect(addr: &str) -> Result<RpcStream> {
        let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(addr, "connected to tcp endpoint");
        configure(&stream)?;
        Ok(RpcStream::from_tcp(stream))
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Small frames dominate this protocol; Nagle buys nothing but latency.
fn configure(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}
