use std::fs;
use std::path::Path;

use datatx_channel::{ChannelConfig, ChannelId, Transmitter};
use datatx_transport::{MAX_PORT, MIN_PORT};
use tracing::warn;

use crate::cmd::{parse_duration, resolve_id, SendArgs};
use crate::exit::{channel_error, io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_sent, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let response_timeout = parse_duration(&args.response_timeout)?;
    let source = resolve_id(args.id.as_deref())?;
    let target = ChannelId::new(args.target.as_str())
        .map_err(|err| CliError::usage(format!("invalid target: {err}")))?;

    if !(MIN_PORT..=MAX_PORT).contains(&args.port) {
        warn!(
            port = args.port,
            "port is outside the dynamic range {MIN_PORT}-{MAX_PORT}"
        );
    }

    let items = match &args.file {
        Some(path) => read_items(path)?,
        None => args.items.clone(),
    };

    let config = ChannelConfig::default()
        .with_connect_timeout(connect_timeout)
        .with_response_timeout(response_timeout);
    let transmitter = Transmitter::with_config(source, config);

    transmitter
        .try_transmit(args.port, &target, &items)
        .map_err(|err| channel_error("send failed", err))?;

    print_sent(
        args.port,
        transmitter.id().as_str(),
        target.as_str(),
        items.len(),
        format,
    );
    Ok(SUCCESS)
}

/// One item per line, without line terminators.
fn read_items(path: &Path) -> CliResult<Vec<String>> {
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    Ok(text.lines().map(str::to_string).collect())
}
