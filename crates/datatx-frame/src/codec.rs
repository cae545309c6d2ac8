use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::MessageKind;

/// Literal first field of every frame.
pub const CHANNEL_TAG: &str = "\u{03C6}chan";

/// Field separator.
pub const SEPARATOR: char = ':';

/// End-of-frame marker. Never appears inside a field.
pub const SENTINEL: char = '\u{3}';

const SENTINEL_BYTE: u8 = 0x03;

/// Tag, source, target, message id, payload.
pub const NUM_FIELDS: usize = 5;

/// Default maximum frame length: 1 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Identity of the sender.
    pub source_id: String,
    /// Identity of the intended recipient.
    pub target_id: String,
    /// Control token or `DATA.<n>`.
    pub message_id: String,
    /// Message body; may be empty.
    pub payload: String,
}

impl Frame {
    /// Create a new frame.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        message_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            message_id: message_id.into(),
            payload: payload.into(),
        }
    }

    /// Classify the message id.
    pub fn kind(&self) -> MessageKind {
        MessageKind::parse(&self.message_id)
    }

    /// True if every field equals the given value.
    pub fn matches(&self, source_id: &str, target_id: &str, message_id: &str, payload: &str) -> bool {
        self.source_id == source_id
            && self.target_id == target_id
            && self.message_id == message_id
            && self.payload == payload
    }

    /// The total wire size of this frame (text + sentinel).
    pub fn wire_size(&self) -> usize {
        CHANNEL_TAG.len()
            + self.source_id.len()
            + self.target_id.len()
            + self.message_id.len()
            + self.payload.len()
            + (NUM_FIELDS - 1)
            + 1
    }
}

/// Renders the frame text without the sentinel.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{CHANNEL_TAG}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.source_id, self.target_id, self.message_id, self.payload
        )
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// φchan : source : target : message-id : payload  U+0003
/// ```
///
/// The address and message-id fields must not contain `:`; no field may
/// contain the sentinel. The payload is the last field, so it may contain `:`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    check_field("source id", &frame.source_id, true)?;
    check_field("target id", &frame.target_id, true)?;
    check_field("message id", &frame.message_id, true)?;
    check_field("payload", &frame.payload, false)?;

    dst.reserve(frame.wire_size());
    for (i, field) in [
        CHANNEL_TAG,
        frame.source_id.as_str(),
        frame.target_id.as_str(),
        frame.message_id.as_str(),
        frame.payload.as_str(),
    ]
    .into_iter()
    .enumerate()
    {
        if i > 0 {
            dst.put_u8(SEPARATOR as u8);
        }
        dst.put_slice(field.as_bytes());
    }
    dst.put_u8(SENTINEL_BYTE);
    Ok(())
}

fn check_field(field: &'static str, value: &str, reject_separator: bool) -> Result<()> {
    if value.contains(SENTINEL) || (reject_separator && value.contains(SEPARATOR)) {
        return Err(FrameError::InvalidField { field });
    }
    Ok(())
}

/// Parse frame text (sentinel already stripped).
pub fn parse_frame(text: &str) -> Result<Frame> {
    let parts: Vec<&str> = text.splitn(NUM_FIELDS, SEPARATOR).collect();
    if parts.len() != NUM_FIELDS {
        return Err(FrameError::FieldCount { found: parts.len() });
    }
    if parts[0] != CHANNEL_TAG {
        return Err(FrameError::InvalidTag);
    }
    Ok(Frame::new(parts[1], parts[2], parts[3], parts[4]))
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a sentinel yet. Once a
/// sentinel is found, the text before it is parsed and the whole buffer is
/// cleared: anything after the sentinel is discarded, so exactly one frame is
/// decoded per read cycle.
pub fn decode_frame(src: &mut BytesMut, max_frame_len: usize) -> Result<Option<Frame>> {
    let Some(end) = src.iter().position(|&b| b == SENTINEL_BYTE) else {
        if src.len() > max_frame_len {
            let size = src.len();
            src.clear();
            return Err(FrameError::FrameTooLarge {
                size,
                max: max_frame_len,
            });
        }
        return Ok(None); // Need more data
    };

    let text = src.split_to(end);
    src.clear();

    if text.len() > max_frame_len {
        return Err(FrameError::FrameTooLarge {
            size: text.len(),
            max: max_frame_len,
        });
    }

    let text = std::str::from_utf8(&text).map_err(|_| FrameError::InvalidUtf8)?;
    parse_frame(text).map(Some)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame length in bytes, sentinel excluded. Default: 1 MiB.
    pub max_frame_len: usize,
    /// Read timeout applied to the socket by `with_config_stream`.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout applied to the socket by `with_config_stream`.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// `tokio_util` codec with the same framing rules as the blocking reader
/// and writer.
#[cfg(feature = "async")]
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
}

#[cfg(feature = "async")]
impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

#[cfg(feature = "async")]
impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_frame(src, self.max_frame_len)
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.wire_size() - 1 > self.max_frame_len {
            return Err(FrameError::FrameTooLarge {
                size: item.wire_size() - 1,
                max: self.max_frame_len,
            });
        }
        encode_frame(&item, dst)
    }
}
