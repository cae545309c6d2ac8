//! Protocol message identifiers.
//!
//! A transmission is `START` (payload: item count), one `DATA.<n>` per item,
//! then `END`. The receiver answers each with `ACK` or `NAK`, whose payload
//! echoes the message id being acknowledged or rejected.

/// Opens a transmission; payload is the decimal item count.
pub const START: &str = "START";

/// Prefix of a data message; followed by the zero-based item index.
pub const DATA_PREFIX: &str = "DATA.";

/// Closes a transmission.
pub const END: &str = "END";

/// Positive acknowledgement.
pub const ACK: &str = "ACK";

/// Rejection.
pub const NAK: &str = "NAK";

/// Build the message id for item `index`.
pub fn data_message_id(index: usize) -> String {
    format!("{DATA_PREFIX}{index}")
}

/// Classification of a frame's message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Start,
    Data(usize),
    End,
    Ack,
    Nak,
    /// Anything else, including a `DATA.` id whose index does not parse.
    Unknown,
}

impl MessageKind {
    pub fn parse(message_id: &str) -> Self {
        match message_id {
            START => Self::Start,
            END => Self::End,
            ACK => Self::Ack,
            NAK => Self::Nak,
            other => match other.strip_prefix(DATA_PREFIX) {
                Some(index) => index.parse().map(Self::Data).unwrap_or(Self::Unknown),
                None => Self::Unknown,
            },
        }
    }
}
