use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use datatx_frame::{FrameError, FrameReader, FrameWriter};
use datatx_transport::{ChannelStream, LoopbackListener};
use tracing::{debug, error, info, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::identity::ChannelId;
use crate::session::{Session, SessionState};

/// Callback invoked with the reassembled payload of each completed
/// transmission.
pub type PayloadHandler = Arc<dyn Fn(String) + Send + Sync + 'static>;

const RECEIVER_THREAD_NAME: &str = "datatx-receiver";
const CONNECTION_THREAD_PREFIX: &str = "datatx-connection-port";

/// Accepts transmissions addressed to one [`ChannelId`].
pub struct Receiver {
    id: ChannelId,
    config: ChannelConfig,
    listener: Arc<LoopbackListener>,
}

impl Receiver {
    /// Bind an OS-assigned loopback port.
    ///
    /// A bind failure is returned rather than treated as fatal; the caller
    /// decides whether to run without a receiver.
    pub fn bind(id: ChannelId) -> Result<Self> {
        Self::bind_with_config(id, ChannelConfig::default())
    }

    /// Bind with explicit configuration.
    pub fn bind_with_config(id: ChannelId, config: ChannelConfig) -> Result<Self> {
        let listener = LoopbackListener::bind()?;
        Ok(Self {
            id,
            config,
            listener: Arc::new(listener),
        })
    }

    /// Identity that frames must be addressed to.
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// Bound port, to be published to transmitters.
    pub fn port(&self) -> u16 {
        self.listener.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Start the accept loop on a background thread.
    ///
    /// Every accepted connection gets its own worker thread, so a slow peer
    /// never holds up the accept loop. `handler` runs on the connection's
    /// worker once END has been acknowledged; a panic inside it is caught and
    /// logged there.
    pub fn listen<F>(&self, handler: F) -> Result<ListenerHandle>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let context = Arc::new(SessionContext {
            id: self.id.clone(),
            config: self.config.clone(),
            handler: Arc::new(handler),
            port: self.port(),
        });

        let listener = Arc::clone(&self.listener);
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name(RECEIVER_THREAD_NAME.to_string())
            .spawn(move || accept_loop(&listener, &context, &flag))
            .map_err(ChannelError::Spawn)?;

        info!(port = self.port(), id = %self.id, "receiver listening");

        Ok(ListenerHandle {
            port: self.port(),
            running,
            thread: Some(thread),
        })
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.id)
            .field("port", &self.port())
            .finish()
    }
}

/// Running accept loop.
///
/// Dropping the handle detaches the loop, which then runs for the rest of
/// the process. [`ListenerHandle::shutdown`] stops it.
#[derive(Debug)]
pub struct ListenerHandle {
    port: u16,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop accepting and wait for the accept loop to exit.
    ///
    /// Sessions already in progress run to completion on their own workers.
    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(port = self.port, "accept loop panicked");
            }
        }
        debug!(port = self.port, "receiver stopped");
    }
}

struct SessionContext {
    id: ChannelId,
    config: ChannelConfig,
    handler: PayloadHandler,
    port: u16,
}

fn accept_loop(listener: &LoopbackListener, context: &Arc<SessionContext>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        match listener.accept_timeout(context.config.accept_timeout) {
            Ok(Some(stream)) => spawn_connection(stream, Arc::clone(context)),
            Ok(None) => {}
            Err(err) => {
                error!(port = context.port, error = %err, "accept failed");
                // Avoid spinning on a persistent error.
                thread::sleep(context.config.accept_timeout);
            }
        }
    }
}

fn spawn_connection(stream: ChannelStream, context: Arc<SessionContext>) {
    let name = format!("{CONNECTION_THREAD_PREFIX}{}", context.port);
    let spawned = thread::Builder::new()
        .name(name)
        .spawn(move || run_connection(stream, &context));
    if let Err(err) = spawned {
        error!(error = %err, "failed to start connection worker");
    }
}

fn run_connection(stream: ChannelStream, context: &SessionContext) {
    let peer = stream.peer_addr().ok();
    match serve_session(&stream, context) {
        Ok(state) => debug!(?peer, ?state, "connection finished"),
        Err(err) => error!(?peer, error = %err, "connection failed"),
    }
    stream.close();
}

fn serve_session(stream: &ChannelStream, context: &SessionContext) -> Result<SessionState> {
    let config = &context.config;
    let frame_config = config.frame_config();
    let mut reader = FrameReader::with_config_stream(stream.try_clone()?, frame_config.clone())?;
    let mut writer = FrameWriter::with_config_stream(stream.try_clone()?, frame_config)?;

    let mut session = Session::new(context.id.clone(), config.max_items);
    let mut last_progress = Instant::now();

    while session.state() != SessionState::Stop {
        match reader.read_frame_timeout(config.read_timeout) {
            Ok(frame) => match session.handle(&frame) {
                Some(step) => {
                    last_progress = Instant::now();
                    let sent = writer.write_frame(&step.reply);
                    match step.delivered {
                        Some(payload) => {
                            // The transmitter does not wait for this ACK, so a
                            // failed write must not lose the payload.
                            if let Err(err) = sent {
                                debug!(error = %err, "final ACK not delivered");
                            }
                            deliver(&context.handler, payload);
                        }
                        None => sent?,
                    }
                    continue;
                }
                None => debug!(target_id = %frame.target_id, "ignoring frame for another target"),
            },
            Err(FrameError::Timeout(_)) => {}
            Err(err) if err.is_malformed() => debug!(error = %err, "ignoring invalid frame"),
            Err(FrameError::ConnectionClosed) => {
                debug!(state = ?session.state(), "peer closed connection");
                break;
            }
            Err(err) => return Err(err.into()),
        }

        if last_progress.elapsed() >= config.session_idle_timeout {
            warn!(state = ?session.state(), "closing idle session");
            break;
        }
    }

    Ok(session.state())
}

fn deliver(handler: &PayloadHandler, payload: String) {
    let len = payload.len();
    if catch_unwind(AssertUnwindSafe(|| handler(payload))).is_err() {
        error!(len, "payload handler panicked");
    } else {
        debug!(len, "payload delivered");
    }
}
