use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use datatx_transport::ChannelStream;
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete frames to any `Write` stream.
///
/// Every frame is flushed as soon as its sentinel is written, so the peer's
/// read observes the frame boundary without further buffering.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame and flush (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        let text_len = self.buf.len() - 1;
        if text_len > self.config.max_frame_len {
            return Err(FrameError::FrameTooLarge {
                size: text_len,
                max: self.config.max_frame_len,
            });
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => return Err(self.timeout_error()),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        trace!(message_id = %frame.message_id, bytes = offset, "frame written");
        self.flush()
    }

    /// Build a frame from its fields and write it.
    pub fn send(
        &mut self,
        source_id: &str,
        target_id: &str,
        message_id: &str,
        payload: &str,
    ) -> Result<()> {
        self.write_frame(&Frame::new(source_id, target_id, message_id, payload))
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => return Err(self.timeout_error()),
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// A blocked write on a socket with a write timeout surfaces as
    /// `WouldBlock` (EAGAIN) or `TimedOut`; the peer has stopped reading.
    fn timeout_error(&self) -> FrameError {
        FrameError::Timeout(self.config.write_timeout.unwrap_or_default())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame length for subsequent encoding.
    pub fn set_max_frame_len(&mut self, max_frame_len: usize) {
        self.config.max_frame_len = max_frame_len;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

impl FrameWriter<ChannelStream> {
    /// Create a frame writer for `ChannelStream` and apply write timeout from config.
    pub fn with_config_stream(inner: ChannelStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::codec::DEFAULT_MAX_FRAME_LEN;
    use crate::reader::FrameReader;

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send("me", "you", "START", "2").unwrap();

        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes, "\u{03C6}chan:me:you:START:2\u{3}".as_bytes());
    }

    #[test]
    fn write_then_read_sequence() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send("me", "you", "START", "1").unwrap();

        let bytes = writer.into_inner().into_inner();
        let mut reader = FrameReader::new(Cursor::new(bytes));
        let frame = reader.read_frame().unwrap();
        assert!(frame.matches("me", "you", "START", "1"));
    }

    #[test]
    fn write_rejects_oversized_frame() {
        let cfg = FrameConfig {
            max_frame_len: 32,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let err = writer
            .send("me", "you", "DATA.0", &"x".repeat(64))
            .unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { max: 32, .. }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn write_rejects_invalid_field_before_writing() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let err = writer.send("me", "you:2", "START", "0").unwrap_err();
        assert!(matches!(err, FrameError::InvalidField { .. }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn write_zero_reports_connection_closed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send("me", "you", "END", "").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_write_retries() {
        let mut writer = FrameWriter::new(InterruptedOnce {
            interrupted: false,
            out: Vec::new(),
        });
        writer.send("me", "you", "END", "").unwrap();
        assert!(writer.get_ref().out.ends_with(b"END:\x03"));
    }

    #[test]
    fn set_max_frame_len_updates_config() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(writer.config().max_frame_len, DEFAULT_MAX_FRAME_LEN);
        writer.set_max_frame_len(8);
        assert_eq!(writer.config().max_frame_len, 8);
    }

    #[test]
    fn blocked_write_reports_timeout() {
        let cfg = FrameConfig {
            write_timeout: Some(Duration::from_millis(50)),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(BlockedWriter, cfg);
        let err = writer.send("me", "you", "DATA.0", "x").unwrap_err();
        assert!(
            matches!(err, FrameError::Timeout(t) if t == Duration::from_millis(50)),
            "{err:?}"
        );
    }

    #[test]
    fn stalled_peer_times_out_large_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        // Accepted but never read from.
        let (_server, _) = listener.accept().unwrap();
        client
            .set_write_timeout(Some(Duration::from_millis(200)))
            .unwrap();

        let cfg = FrameConfig {
            max_frame_len: 64 * 1024 * 1024,
            write_timeout: Some(Duration::from_millis(200)),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(client, cfg);

        let start = Instant::now();
        let err = writer
            .send("me", "you", "DATA.0", &"x".repeat(32 * 1024 * 1024))
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout(_)), "{err:?}");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    struct ZeroWriter;

    struct BlockedWriter;

    impl Write for BlockedWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InterruptedOnce {
        interrupted: bool,
        out: Vec<u8>,
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
