use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::ChannelStream;

/// The only host the channel ever binds or connects to.
pub const HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Lowest port of the IANA dynamic/private range.
pub const MIN_PORT: u16 = 49152;
/// Highest port of the IANA dynamic/private range.
pub const MAX_PORT: u16 = 65535;

/// Granularity of the accept poll.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// IPv4 loopback listener on an OS-assigned port.
///
/// The socket is non-blocking; [`LoopbackListener::accept_timeout`] polls it
/// so that an accept loop wakes up at least once per timeout and can check
/// whether it should keep running.
#[derive(Debug)]
pub struct LoopbackListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl LoopbackListener {
    /// Bind to an ephemeral port chosen by the OS.
    pub fn bind() -> Result<Self> {
        Self::bind_port(0)
    }

    /// Bind to an explicit loopback port (0 lets the OS choose).
    pub fn bind_port(port: u16) -> Result<Self> {
        let requested = SocketAddr::from((HOST, port));
        let listener = TcpListener::bind(requested).map_err(|e| TransportError::Bind {
            addr: requested,
            source: e,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::Bind {
                addr: requested,
                source: e,
            })?;
        let addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: requested,
            source: e,
        })?;

        info!(%addr, "listening on loopback port");

        Ok(Self { listener, addr })
    }

    /// Accept an incoming connection, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<ChannelStream>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    return ChannelStream::from_tcp(stream).map(Some);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }

    /// The port this listener is bound to.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The full bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Connect to a loopback listener, giving up after `timeout`.
pub fn connect(port: u16, timeout: Duration) -> Result<ChannelStream> {
    if port == 0 {
        return Err(TransportError::InvalidPort(port));
    }
    let addr = SocketAddr::from((HOST, port));
    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| TransportError::Connect { addr, source: e })?;
    debug!(%addr, "connected to loopback port");
    ChannelStream::from_tcp(stream)
}
