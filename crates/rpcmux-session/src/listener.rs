use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rpcmux_transport::TcpEndpoint;
#[cfg(unix)]
use rpcmux_transport::UnixDomainSocket;
use tracing::info;

use crate::error::Result;
use crate::registry::HandlerRegistry;
use crate::session::{Session, SessionConfig};

enum Endpoint {
    #[cfg(unix)]
    Uds(UnixDomainSocket),
    Tcp(TcpEndpoint),
}

impl Endpoint {
    fn accept(&self) -> Result<rpcmux_transport::RpcStream> {
        let stream = match self {
            #[cfg(unix)]
            Endpoint::Uds(socket) => socket.accept()?,
            Endpoint::Tcp(endpoint) => endpoint.accept()?,
        };
        Ok(stream)
    }
}

/// Accepts connections and wraps each one in a [`Session`] sharing the
/// same handler registry.
///
/// The registry is frozen at bind time; every accepted session dispatches
/// against the same table.
pub struct RpcListener {
    endpoint: Endpoint,
    registry: Arc<HandlerRegistry>,
    config: SessionConfig,
    next_session: AtomicU64,
}

impl RpcListener {
    /// Listen on a filesystem-path Unix domain socket.
    #[cfg(unix)]
    pub fn bind_uds(path: impl AsRef<Path>, registry: HandlerRegistry) -> Result<Self> {
        let socket = UnixDomainSocket::bind(path)?;
        Ok(Self::from_endpoint(Endpoint::Uds(socket), registry))
    }

    /// Listen on a TCP address, e.g. `"127.0.0.1:9090"`.
    pub fn bind_tcp(addr: &str, registry: HandlerRegistry) -> Result<Self> {
        let endpoint = TcpEndpoint::bind(addr)?;
        Ok(Self::from_endpoint(Endpoint::Tcp(endpoint), registry))
    }

    fn from_endpoint(endpoint: Endpoint, registry: HandlerRegistry) -> Self {
        Self {
            endpoint,
            registry: Arc::new(registry),
            config: SessionConfig::default(),
            next_session: AtomicU64::new(0),
        }
    }

    /// Override the configuration applied to accepted sessions.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// The bound TCP address, when listening on TCP.
    pub fn tcp_addr(&self) -> Option<std::net::SocketAddr> {
        match &self.endpoint {
            Endpoint::Tcp(endpoint) => Some(endpoint.local_addr()),
            #[cfg(unix)]
            Endpoint::Uds(_) => None,
        }
    }

    /// Accept one connection and hand back its session.
    ///
    /// The session serves inbound requests on its own threads from the
    /// moment it is returned; the caller only needs to keep it alive.
    pub fn accept(&self) -> Result<Session> {
        let stream = self.endpoint.accept()?;
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let session =
            Session::with_config(stream, Arc::clone(&self.registry), self.config.clone())?;
        info!(session = id, "session started");
        Ok(session)
    }

    /// Accept connections until the listener fails, keeping accepted
    /// sessions alive and pruning the ones that have closed.
    pub fn serve(&self) -> Result<()> {
        let mut active: Vec<Session> = Vec::new();
        loop {
            let session = self.accept()?;
            active.retain(|s| !s.is_closed());
            active.push(session);
        }
    }
}
