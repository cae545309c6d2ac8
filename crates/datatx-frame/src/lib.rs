//! Sentinel-delimited text framing for the datatx channel protocol.
//!
//! Every message is one line of UTF-8 text with five `:`-separated fields,
//! terminated by a single `U+0003` sentinel:
//!
//! ```text
//! φchan:<source id>:<target id>:<message id>:<payload>\u{3}
//! ```
//!
//! The first field is a fixed channel tag that distinguishes this protocol's
//! traffic from anything else arriving on the socket. One frame is decoded
//! per read cycle; the protocol never pipelines.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use codec::FrameCodec;
pub use codec::{
    decode_frame, encode_frame, parse_frame, Frame, FrameConfig, CHANNEL_TAG,
    DEFAULT_MAX_FRAME_LEN, NUM_FIELDS, SENTINEL, SEPARATOR,
};
pub use error::{FrameError, Result};
pub use message::{data_message_id, MessageKind, ACK, DATA_PREFIX, END, NAK, START};
pub use reader::{FrameReader, ReadTimeout};
pub use writer::FrameWriter;
