//! Acknowledged data transmission between processes on one machine.
//!
//! A receiving process binds an ephemeral loopback port and publishes it,
//! together with its channel identity, to the processes that want to talk to
//! it. A sender connects, announces how many items it will send, and delivers
//! them one at a time, each acknowledged before the next. The receiver hands
//! the concatenated items to a callback once the sender signals the end.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP loopback listener and timed connect
//! - [`frame`]: Sentinel-delimited text frames and the protocol's message ids
//! - [`channel`]: Identities, the receiver state machine and the transmitter
//!   (behind the default `channel` feature)
//!
//! ```no_run
//! use datatx::channel::{ChannelId, Receiver, Transmitter};
//!
//! let receiver = Receiver::bind(ChannelId::random())?;
//! let _handle = receiver.listen(|payload| println!("got {payload}"))?;
//!
//! let transmitter = Transmitter::new(ChannelId::random());
//! assert!(transmitter.transmit(receiver.port(), receiver.id(), &["hello, ", "world"]));
//! # Ok::<(), datatx::channel::ChannelError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use datatx_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use datatx_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use datatx_channel::*;
}
