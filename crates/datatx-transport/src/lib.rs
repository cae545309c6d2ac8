//! TCP loopback transport for the datatx channel.
//!
//! Provides the two socket operations the channel protocol needs:
//! - an IPv4 loopback listener bound to an OS-assigned port, with a polled
//!   accept timeout so the accept loop can observe a stop flag
//! - a client connect with a bounded connect timeout
//!
//! This is the lowest layer of datatx. Everything else builds on top of
//! the [`ChannelStream`] type provided here.

pub mod error;
pub mod loopback;
pub mod stream;

pub use error::{Result, TransportError};
pub use loopback::{connect, LoopbackListener, HOST, MAX_PORT, MIN_PORT};
pub use stream::ChannelStream;
