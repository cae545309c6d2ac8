use std::time::Duration;

use datatx_frame::{FrameConfig, DEFAULT_MAX_FRAME_LEN};

/// Most data items one transmission may carry.
pub const MAX_DATA_ITEMS: usize = 1 << 12;

/// Timeouts and limits shared by receivers and transmitters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Transmitter: how long to wait for the TCP connection.
    pub connect_timeout: Duration,
    /// Transmitter: how long to wait for each ACK.
    pub response_timeout: Duration,
    /// Receiver: how long one accept poll blocks before re-checking the stop flag.
    pub accept_timeout: Duration,
    /// Receiver: window for one frame read.
    pub read_timeout: Duration,
    /// Receiver: a session with no addressed frame for this long is closed.
    pub session_idle_timeout: Duration,
    /// Bound on each socket write.
    pub write_timeout: Duration,
    /// Largest item count accepted in START.
    pub max_items: usize,
    /// Largest frame, in bytes, either side will read or write.
    pub max_frame_len: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(200),
            response_timeout: Duration::from_millis(400),
            accept_timeout: Duration::from_millis(100),
            read_timeout: Duration::from_millis(500),
            session_idle_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_millis(500),
            max_items: MAX_DATA_ITEMS,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ChannelConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Frame settings for a connected stream.
    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_len: self.max_frame_len,
            read_timeout: Some(self.read_timeout),
            write_timeout: Some(self.write_timeout),
        }
    }
}
