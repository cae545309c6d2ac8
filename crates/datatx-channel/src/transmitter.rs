use datatx_frame::{data_message_id, Frame, FrameError, FrameReader, FrameWriter, ACK, END, NAK, START};
use datatx_transport::ChannelStream;
use tracing::{debug, error, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::identity::ChannelId;

/// Sends item lists to receivers on the local machine.
///
/// Stateless between calls: every transmission opens its own connection, so
/// one `Transmitter` may be shared across threads.
#[derive(Debug, Clone)]
pub struct Transmitter {
    id: ChannelId,
    config: ChannelConfig,
}

struct Exchange<'a> {
    source: &'a str,
    target: &'a str,
    reader: FrameReader<ChannelStream>,
    writer: FrameWriter<ChannelStream>,
    config: &'a ChannelConfig,
}

impl Transmitter {
    pub fn new(id: ChannelId) -> Self {
        Self::with_config(id, ChannelConfig::default())
    }

    pub fn with_config(id: ChannelId, config: ChannelConfig) -> Self {
        Self { id, config }
    }

    /// Identity written as the source of every frame.
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Deliver `items` to the receiver `target` listening on `port`.
    ///
    /// Returns `true` once every item has been acknowledged and END has been
    /// written. Failures are logged and reported as `false`; use
    /// [`Transmitter::try_transmit`] to inspect them.
    pub fn transmit<S: AsRef<str>>(&self, port: u16, target: &ChannelId, items: &[S]) -> bool {
        match self.try_transmit(port, target, items) {
            Ok(()) => true,
            Err(err) => {
                error!(port, target = %target, items = items.len(), error = %err, "transmission failed");
                false
            }
        }
    }

    /// Like [`Transmitter::transmit`], returning the reason for a failure.
    ///
    /// END is not acknowledged in turn: once it is written the transmission
    /// counts as delivered, and a failure to write it is only logged.
    pub fn try_transmit<S: AsRef<str>>(
        &self,
        port: u16,
        target: &ChannelId,
        items: &[S],
    ) -> Result<()> {
        if items.len() > self.config.max_items {
            return Err(ChannelError::TooManyItems {
                count: items.len(),
                max: self.config.max_items,
            });
        }

        let stream = datatx_transport::connect(port, self.config.connect_timeout)?;
        let result = self.exchange(&stream, port, target, items);
        stream.close();
        result
    }

    fn exchange<S: AsRef<str>>(
        &self,
        stream: &ChannelStream,
        port: u16,
        target: &ChannelId,
        items: &[S],
    ) -> Result<()> {
        let frame_config = self.config.frame_config();
        let mut exchange = Exchange {
            source: self.id.as_str(),
            target: target.as_str(),
            reader: FrameReader::with_config_stream(stream.try_clone()?, frame_config.clone())?,
            writer: FrameWriter::with_config_stream(stream.try_clone()?, frame_config)?,
            config: &self.config,
        };

        exchange.request(START, &items.len().to_string())?;
        for (index, item) in items.iter().enumerate() {
            exchange.request(&data_message_id(index), item.as_ref())?;
        }

        if let Err(err) = exchange.writer.send(exchange.source, exchange.target, END, "") {
            warn!(error = %err, "failed to write END");
        }
        debug!(port, items = items.len(), "transmission complete");
        Ok(())
    }
}

impl Exchange<'_> {
    /// Send one frame and wait for the ACK that echoes its message id.
    fn request(&mut self, message_id: &str, payload: &str) -> Result<()> {
        self.writer.send(self.source, self.target, message_id, payload)?;

        let timeout = self.config.response_timeout;
        let reply = match self.reader.read_frame_timeout(timeout) {
            Ok(reply) => reply,
            Err(FrameError::Timeout(_)) => return Err(ChannelError::Timeout(timeout)),
            Err(err) if err.is_malformed() => {
                return Err(ChannelError::InvalidResponse(err.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        self.check_reply(&reply, message_id)
    }

    fn check_reply(&self, reply: &Frame, message_id: &str) -> Result<()> {
        if reply.matches(self.target, self.source, ACK, message_id) {
            return Ok(());
        }
        if reply.matches(self.target, self.source, NAK, message_id) {
            return Err(ChannelError::Rejected {
                message_id: message_id.to_string(),
            });
        }
        Err(ChannelError::UnexpectedResponse {
            expected: message_id.to_string(),
            found: reply.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    use datatx_transport::LoopbackListener;

    use super::*;

    fn fast_config() -> ChannelConfig {
        ChannelConfig::default().with_response_timeout(Duration::from_millis(100))
    }

    /// Accept one connection and answer each frame with `respond`.
    fn fake_receiver<F>(respond: F) -> (u16, thread::JoinHandle<Vec<Frame>>)
    where
        F: Fn(&Frame) -> Option<Frame> + Send + 'static,
    {
        let listener = LoopbackListener::bind().unwrap();
        let port = listener.port();
        let handle = thread::spawn(move || {
            let stream = loop {
                if let Some(stream) = listener.accept_timeout(Duration::from_secs(2)).unwrap() {
                    break stream;
                }
            };
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            let mut writer = FrameWriter::new(stream);
            let mut seen = Vec::new();
            while let Ok(frame) = reader.read_frame() {
                if let Some(reply) = respond(&frame) {
                    // The transmitter hangs up right after END.
                    let _ = writer.write_frame(&reply);
                }
                seen.push(frame);
            }
            seen
        });
        (port, handle)
    }

    fn ack(frame: &Frame) -> Frame {
        Frame::new(&*frame.target_id, &*frame.source_id, ACK, &*frame.message_id)
    }

    fn ids() -> (ChannelId, ChannelId) {
        (ChannelId::new("tx").unwrap(), ChannelId::new("rx").unwrap())
    }

    #[test]
    fn sends_expected_frame_sequence() {
        let (port, handle) = fake_receiver(|f| Some(ack(f)));
        let (tx_id, rx_id) = ids();

        Transmitter::new(tx_id)
            .try_transmit(port, &rx_id, &["a", "b:c"])
            .unwrap();

        let seen = handle.join().unwrap();
        let sequence: Vec<(&str, &str)> = seen
            .iter()
            .map(|f| (f.message_id.as_str(), f.payload.as_str()))
            .collect();
        assert_eq!(
            sequence,
            vec![("START", "2"), ("DATA.0", "a"), ("DATA.1", "b:c"), ("END", "")]
        );
        assert!(seen.iter().all(|f| f.source_id == "tx" && f.target_id == "rx"));
    }

    #[test]
    fn nak_aborts_transmission() {
        let (port, handle) = fake_receiver(|f| {
            let id = if f.message_id == "DATA.1" { NAK } else { ACK };
            Some(Frame::new(&*f.target_id, &*f.source_id, id, &*f.message_id))
        });
        let (tx_id, rx_id) = ids();

        let err = Transmitter::new(tx_id)
            .try_transmit(port, &rx_id, &["a", "b", "c"])
            .unwrap_err();
        assert!(
            matches!(&err, ChannelError::Rejected { message_id } if message_id == "DATA.1"),
            "{err:?}"
        );

        // Nothing after the rejected item is sent.
        let seen = handle.join().unwrap();
        assert_eq!(seen.last().unwrap().message_id, "DATA.1");
    }

    #[test]
    fn reply_from_wrong_source_is_unexpected() {
        let (port, _handle) = fake_receiver(|f| {
            Some(Frame::new("impostor", &*f.source_id, ACK, &*f.message_id))
        });
        let (tx_id, rx_id) = ids();

        let err = Transmitter::new(tx_id)
            .try_transmit(port, &rx_id, &["a"])
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnexpectedResponse { .. }), "{err:?}");
    }

    #[test]
    fn ack_for_wrong_message_is_unexpected() {
        let (port, _handle) = fake_receiver(|f| {
            Some(Frame::new(&*f.target_id, &*f.source_id, ACK, "DATA.9"))
        });
        let (tx_id, rx_id) = ids();

        let err = Transmitter::new(tx_id)
            .try_transmit(port, &rx_id, &["a"])
            .unwrap_err();
        match err {
            ChannelError::UnexpectedResponse { expected, found } => {
                assert_eq!(expected, "START");
                assert!(found.ends_with(":ACK:DATA.9"), "{found}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn silent_receiver_times_out() {
        let (port, _handle) = fake_receiver(|_| None);
        let (tx_id, rx_id) = ids();

        let start = Instant::now();
        let err = Transmitter::with_config(tx_id, fast_config())
            .try_transmit(port, &rx_id, &["a"])
            .unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn receiver_that_stops_reading_times_out_write() {
        let listener = LoopbackListener::bind().unwrap();
        let port = listener.port();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let stream = loop {
                if let Some(stream) = listener.accept_timeout(Duration::from_secs(2)).unwrap() {
                    break stream;
                }
            };
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            let mut writer = FrameWriter::new(stream);
            let start = reader.read_frame().unwrap();
            writer.write_frame(&ack(&start)).unwrap();
            // Hold the connection open without reading any further.
            let _ = done_rx.recv_timeout(Duration::from_secs(10));
        });
        let (tx_id, rx_id) = ids();
        let config = fast_config()
            .with_max_frame_len(64 * 1024 * 1024)
            .with_write_timeout(Duration::from_millis(200));
        let item = "x".repeat(32 * 1024 * 1024);

        let start = Instant::now();
        let err = Transmitter::with_config(tx_id, config)
            .try_transmit(port, &rx_id, &[item])
            .unwrap_err();
        assert!(
            matches!(err, ChannelError::Frame(FrameError::Timeout(_))),
            "{err:?}"
        );
        assert!(start.elapsed() < Duration::from_secs(5));

        let _ = done_tx.send(());
        handle.join().unwrap();
    }

    #[test]
    fn no_listener_fails_to_connect() {
        let port = {
            let listener = LoopbackListener::bind().unwrap();
            listener.port()
        };
        let (tx_id, rx_id) = ids();

        let transmitter = Transmitter::new(tx_id);
        let err = transmitter.try_transmit(port, &rx_id, &["a"]).unwrap_err();
        assert!(matches!(err, ChannelError::Transport(_)), "{err:?}");
        assert!(!transmitter.transmit(port, &rx_id, &["a"]));
    }

    #[test]
    fn too_many_items_fails_before_connecting() {
        let (tx_id, rx_id) = ids();
        let transmitter =
            Transmitter::with_config(tx_id, ChannelConfig::default().with_max_items(2));

        // Port 1 would fail to connect; the count check comes first.
        let err = transmitter
            .try_transmit(1, &rx_id, &["a", "b", "c"])
            .unwrap_err();
        assert!(
            matches!(err, ChannelError::TooManyItems { count: 3, max: 2 }),
            "{err:?}"
        );
    }
}
