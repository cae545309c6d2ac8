/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The first field is not the channel tag.
    #[error("invalid channel tag")]
    InvalidTag,

    /// The frame text did not split into exactly five fields.
    #[error("malformed frame ({found} fields, expected 5)")]
    FieldCount { found: usize },

    /// The frame text is not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// A field contains a character that would break framing.
    #[error("{field} contains a separator or sentinel character")]
    InvalidField { field: &'static str },

    /// The frame exceeds the configured maximum length.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// No complete frame arrived within the read window.
    #[error("timed out after {0:?} waiting for frame")]
    Timeout(std::time::Duration),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors caused by the content of a frame rather than the
    /// connection carrying it.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidTag | FrameError::FieldCount { .. } | FrameError::InvalidUtf8
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
