use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// A connected RPC byte stream — implements `Read` + `Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// The session layer clones it once (read half / write half) and owns
/// both halves for the lifetime of the connection.
pub struct RpcStream {
    inner: RpcStreamInner,
}

enum RpcStreamInner {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Read for RpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            RpcStreamInner::Unix(stream) => stream.read(buf),
            RpcStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for RpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            RpcStreamInner::Unix(stream) => stream.write(buf),
            RpcStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            RpcStreamInner::Unix(stream) => stream.flush(),
            RpcStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl RpcStream {
    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: UnixStream) -> Self {
        Self {
            inner: RpcStreamInner::Unix(stream),
        }
    }

    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: RpcStreamInner::Tcp(stream),
        }
    }

    /// Create a connected pair of in-process streams.
    ///
    /// Useful for tests and for embedding a server and client in one
    /// process without binding a socket path.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            RpcStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            RpcStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            RpcStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            RpcStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            RpcStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            RpcStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
        }
    }

    /// Shut down both directions of the connection.
    ///
    /// Unblocks any thread blocked in `read` on a clone of this stream.
    /// Shutting down a stream that is already shut down reports
    /// [`TransportError::Shutdown`].
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            #[cfg(unix)]
            RpcStreamInner::Unix(stream) => stream.shutdown(std::net::Shutdown::Both),
            RpcStreamInner::Tcp(stream) => stream.shutdown(std::net::Shutdown::Both),
        };
        result.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotConnected => TransportError::Shutdown,
            _ => TransportError::Io(err),
        })
    }
}

impl std::fmt::Debug for RpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            #[cfg(unix)]
            RpcStreamInner::Unix(_) => "unix",
            RpcStreamInner::Tcp(_) => "tcp",
        };
        f.debug_struct("RpcStream").field("type", &kind).finish()
    }
}
