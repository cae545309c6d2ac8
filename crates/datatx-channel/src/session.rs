use datatx_frame::{Frame, MessageKind, ACK, NAK};
use tracing::{debug, warn};

use crate::identity::ChannelId;

/// Receiver-side protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for START.
    Ready,
    /// Waiting for the next DATA item.
    Data,
    /// All items received; waiting for END.
    Done,
    /// Terminal.
    Stop,
}

/// Outcome of one addressed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// ACK or NAK to send back.
    pub reply: Frame,
    /// The reassembled payload, once END has been accepted.
    pub delivered: Option<String>,
}

/// State machine for one accepted connection.
///
/// Pure: it never touches the socket. The connection worker reads frames,
/// feeds them to [`Session::handle`], and writes back the reply it returns.
#[derive(Debug)]
pub struct Session {
    own_id: ChannelId,
    max_items: usize,
    state: SessionState,
    expected: usize,
    received: usize,
    buffer: String,
}

impl Session {
    pub fn new(own_id: ChannelId, max_items: usize) -> Self {
        Self {
            own_id,
            max_items,
            state: SessionState::Ready,
            expected: 0,
            received: 0,
            buffer: String::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Items accepted so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Advance on one frame.
    ///
    /// Returns `None` when the frame is addressed to another endpoint or the
    /// session has already stopped; such frames cause no reply and no
    /// progress.
    pub fn handle(&mut self, frame: &Frame) -> Option<Step> {
        if frame.target_id != self.own_id.as_str() || self.state == SessionState::Stop {
            return None;
        }

        let step = match (self.state, frame.kind()) {
            (SessionState::Ready, MessageKind::Start) => match self.parse_count(&frame.payload) {
                Some(count) => {
                    self.expected = count;
                    self.state = if count == 0 {
                        SessionState::Done
                    } else {
                        SessionState::Data
                    };
                    debug!(count, "transmission started");
                    self.ack(frame)
                }
                None => {
                    warn!(payload = %frame.payload, "rejecting invalid item count");
                    self.nak(frame)
                }
            },
            (SessionState::Data, MessageKind::Data(index)) if index == self.received => {
                self.buffer.push_str(&frame.payload);
                self.received += 1;
                if self.received == self.expected {
                    self.state = SessionState::Done;
                }
                self.ack(frame)
            }
            (SessionState::Done, MessageKind::End) => {
                let mut step = self.ack(frame);
                self.state = SessionState::Stop;
                step.delivered = Some(std::mem::take(&mut self.buffer));
                debug!(items = self.received, "transmission complete");
                step
            }
            (state, _) => {
                warn!(
                    ?state,
                    message_id = %frame.message_id,
                    expected_index = self.received,
                    "rejecting unexpected message"
                );
                self.nak(frame)
            }
        };
        Some(step)
    }

    fn parse_count(&self, payload: &str) -> Option<usize> {
        let count: i64 = payload.parse().ok()?;
        usize::try_from(count)
            .ok()
            .filter(|&count| count <= self.max_items)
    }

    fn ack(&self, frame: &Frame) -> Step {
        self.reply(frame, ACK)
    }

    fn nak(&mut self, frame: &Frame) -> Step {
        self.state = SessionState::Stop;
        self.reply(frame, NAK)
    }

    fn reply(&self, frame: &Frame, message_id: &str) -> Step {
        Step {
            reply: Frame::new(
                self.own_id.as_str(),
                frame.source_id.as_str(),
                message_id,
                frame.message_id.as_str(),
            ),
            delivered: None,
        }
    }
}
