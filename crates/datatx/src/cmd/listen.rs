use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use datatx_channel::{ChannelConfig, Receiver};
use tracing::info;

use crate::cmd::{parse_duration, resolve_id, ListenArgs};
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, print_payload, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == Some(0) {
        return Err(CliError::usage("--count must be at least 1"));
    }
    let idle_timeout = parse_duration(&args.idle_timeout)?;
    let id = resolve_id(args.id.as_deref())?;
    let config = ChannelConfig::default().with_session_idle_timeout(idle_timeout);

    let receiver =
        Receiver::bind_with_config(id, config).map_err(|err| channel_error("bind failed", err))?;
    let port = receiver.port();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel::<String>();
    let handle = receiver
        .listen(move |payload| {
            // The main loop may already have exited after --count payloads.
            let _ = tx.send(payload);
        })
        .map_err(|err| channel_error("listen failed", err))?;

    print_listening(port, receiver.id().as_str(), format);

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(payload) => {
                print_payload(port, &payload, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    handle.shutdown();
    info!(port, received = printed, "listener stopped");
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
