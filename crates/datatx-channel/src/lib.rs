//! Acknowledged data-transmission channel between local processes.
//!
//! A [`Receiver`] binds an ephemeral loopback port and runs one
//! [`Session`] per accepted connection. A [`Transmitter`] connects to that
//! port and delivers an ordered list of string items, each acknowledged
//! before the next is sent:
//!
//! ```text
//! transmitter                     receiver
//!   START <n>        ──────────▶
//!                    ◀──────────   ACK START
//!   DATA.0 <item>    ──────────▶
//!                    ◀──────────   ACK DATA.0
//!   ...
//!   END              ──────────▶   (handler gets the concatenated items)
//! ```
//!
//! Endpoints address each other with [`ChannelId`]s.

pub mod config;
pub mod error;
pub mod identity;
pub mod receiver;
pub mod session;
pub mod transmitter;

pub use config::{ChannelConfig, MAX_DATA_ITEMS};
pub use error::{ChannelError, Result};
pub use identity::{id_suffix, ChannelId, ID_SUFFIX_LEN, MAX_ID_LEN};
pub use receiver::{ListenerHandle, PayloadHandler, Receiver};
pub use session::{Session, SessionState, Step};
pub use transmitter::Transmitter;
