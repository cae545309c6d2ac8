/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] datatx_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] datatx_frame::FrameError),

    /// No response arrived in time.
    #[error("timed out after {0:?} waiting for response")]
    Timeout(std::time::Duration),

    /// The receiver answered NAK.
    #[error("receiver rejected {message_id}")]
    Rejected { message_id: String },

    /// A well-formed reply that does not acknowledge the last request.
    #[error("unexpected response to {expected}: {found}")]
    UnexpectedResponse { expected: String, found: String },

    /// A reply that could not be parsed as a frame.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// More items than one transmission may carry.
    #[error("too many data items ({count}, max {max})")]
    TooManyItems { count: usize, max: usize },

    /// The string cannot be used as a channel identity.
    #[error("invalid channel id: {0}")]
    InvalidId(String),

    /// A background worker could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
