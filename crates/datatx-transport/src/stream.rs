use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected loopback stream. Implements Read + Write.
///
/// This is the fundamental I/O type returned by transport operations. Each
/// accepted or connected stream is owned by exactly one worker, which alone
/// reads, writes and closes it.
pub struct ChannelStream {
    inner: TcpStream,
}

impl Read for ChannelStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for ChannelStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl ChannelStream {
    /// Wrap a connected TCP stream.
    ///
    /// Frames are tiny and strictly request/response, so Nagle is disabled.
    pub(crate) fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        Ok(Self { inner: stream })
    }

    /// Set read timeout on the underlying socket.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self { inner: cloned })
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Local address of this end of the connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }

    /// Close both directions, ignoring errors (the peer may already be gone).
    pub fn close(&self) {
        let _ = self.inner.shutdown(Shutdown::Both);
    }

    /// Borrow the underlying TCP stream.
    pub fn as_tcp(&self) -> &TcpStream {
        &self.inner
    }

    /// Convert into a tokio stream for use with the async frame codec.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(feature = "async")]
    pub fn into_tokio(self) -> Result<tokio::net::TcpStream> {
        self.inner.set_nonblocking(true)?;
        tokio::net::TcpStream::from_std(self.inner).map_err(Into::into)
    }
}

impl std::fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStream")
            .field("local", &self.inner.local_addr().ok())
            .field("peer", &self.inner.peer_addr().ok())
            .finish()
    }
}
