use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use datatx_transport::ChannelStream;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Streams whose blocking reads can be bounded by a timeout.
pub trait ReadTimeout {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;
}

impl ReadTimeout for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

impl ReadTimeout for ChannelStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.as_tcp().set_read_timeout(timeout)
    }
}

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame, blocking for as long as the stream does.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.next_frame(None, |_, _| Ok(()))
    }

    fn next_frame<F>(&mut self, deadline: Option<(Instant, Duration)>, arm: F) -> Result<Frame>
    where
        F: Fn(&T, Duration) -> std::io::Result<()>,
    {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_frame_len)? {
                return Ok(frame);
            }

            if let Some((deadline, timeout)) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    // A frame must arrive whole within one read window.
                    self.buf.clear();
                    return Err(FrameError::Timeout(timeout));
                }
                arm(&self.inner, deadline - now)?;
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if deadline.is_some()
                        && matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + ReadTimeout> FrameReader<T> {
    /// Read the next frame, giving up once `timeout` has elapsed.
    ///
    /// The socket's read timeout is re-armed with the remaining budget before
    /// every blocking read, so the call never overruns the window by more
    /// than one scheduling tick.
    pub fn read_frame_timeout(&mut self, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        self.next_frame(Some((deadline, timeout)), |inner, remaining| {
            inner.set_read_timeout(Some(remaining))
        })
    }
}

impl FrameReader<ChannelStream> {
    /// Create a frame reader for `ChannelStream` and apply read timeout from config.
    pub fn with_config_stream(inner: ChannelStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: datatx_transport::TransportError) -> FrameError {
    match err {
        datatx_transport::TransportError::Io(io)
        | datatx_transport::TransportError::Accept(io) => FrameError::Io(io),
        datatx_transport::TransportError::Bind { source, .. }
        | datatx_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::net::TcpListener;

    use super::*;
    use crate::codec::encode_frame;
    use crate::writer::FrameWriter;

    fn wire(frames: &[Frame]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for frame in frames {
            encode_frame(frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn read_single_frame() {
        let frame = Frame::new("a", "b", "START", "3");
        let mut reader = FrameReader::new(Cursor::new(wire(&[frame.clone()])));

        assert_eq!(reader.read_frame().unwrap(), frame);
    }

    #[test]
    fn partial_read_handling() {
        let frame = Frame::new("a", "b", "DATA.0", "slow");
        let byte_reader = ByteByByteReader {
            bytes: wire(&[frame.clone()]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        assert_eq!(reader.read_frame().unwrap(), frame);
    }

    #[test]
    fn one_frame_per_read_cycle() {
        let first = Frame::new("a", "b", "START", "1");
        let second = Frame::new("a", "b", "DATA.0", "x");
        let mut reader = FrameReader::new(Cursor::new(wire(&[first.clone(), second])));

        assert_eq!(reader.read_frame().unwrap(), first);
        // The second frame arrived in the same chunk and was dropped.
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn malformed_frame_does_not_poison_reader() {
        let good = Frame::new("a", "b", "END", "");
        let mut bytes = b"garbage\x03".to_vec();
        bytes.extend_from_slice(&wire(&[good.clone()]));
        let mut reader = FrameReader::new(ByteByByteReader { bytes, pos: 0 });

        assert!(reader.read_frame().unwrap_err().is_malformed());
        assert_eq!(reader.read_frame().unwrap(), good);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let mut reader = FrameReader::new(Cursor::new(b"\xCF\x86chan:a:b:ST".to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn oversized_frame_in_stream() {
        let cfg = FrameConfig {
            max_frame_len: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(vec![b'x'; 4096]), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
    }

    #[test]
    fn read_would_block_propagates_io_error_without_deadline() {
        let reader = WouldBlockThenData {
            state: 0,
            bytes: wire(&[Frame::new("a", "b", "ACK", "START")]),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn read_timeout_expires_without_frame() {
        let (_client, server) = tcp_pair();
        let mut reader = FrameReader::new(server);

        let start = Instant::now();
        let err = reader
            .read_frame_timeout(Duration::from_millis(80))
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, FrameError::Timeout(t) if t == Duration::from_millis(80)));
        assert!(elapsed >= Duration::from_millis(80));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn read_timeout_receives_frame_split_across_writes() {
        let (mut client, server) = tcp_pair();
        let frame = Frame::new("a", "b", "DATA.2", "split");
        let bytes = wire(&[frame.clone()]);

        let writer = std::thread::spawn(move || {
            let (head, tail) = bytes.split_at(6);
            client.write_all(head).unwrap();
            std::thread::sleep(Duration::from_millis(30));
            client.write_all(tail).unwrap();
            client
        });

        let mut reader = FrameReader::new(server);
        let got = reader.read_frame_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got, frame);
        let _client = writer.join().unwrap();
    }

    #[test]
    fn timed_out_partial_frame_is_discarded() {
        let (mut client, server) = tcp_pair();
        client.write_all(b"\xCF\x86chan:a:b:START").unwrap();

        let mut reader = FrameReader::new(server);
        let err = reader
            .read_frame_timeout(Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout(_)));

        // The tail alone is not a valid frame.
        client.write_all(b":1\x03").unwrap();
        let err = reader
            .read_frame_timeout(Duration::from_secs(1))
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn roundtrip_over_channel_stream() {
        let listener = datatx_transport::LoopbackListener::bind().unwrap();
        let port = listener.port();

        let client = std::thread::spawn(move || {
            let stream = datatx_transport::connect(port, Duration::from_millis(500)).unwrap();
            let mut writer = FrameWriter::new(stream);
            writer
                .write_frame(&Frame::new("a", "b", "START", "0"))
                .unwrap();
        });

        let stream = listener
            .accept_timeout(Duration::from_secs(2))
            .unwrap()
            .expect("client should connect");
        let cfg = FrameConfig {
            read_timeout: Some(Duration::from_millis(500)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_stream(stream, cfg).unwrap();
        let frame = reader.read_frame_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.message_id, "START");

        client.join().unwrap();
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct WouldBlockThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for WouldBlockThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
