use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use datatx_channel::ChannelId;

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod id;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bind a receiver and print every payload delivered to it.
    Listen(ListenArgs),
    /// Transmit items to a listening receiver.
    Send(SendArgs),
    /// Generate channel identities.
    Id(IdArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Id(args) => id::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Identity that senders must address. Default: a random id.
    #[arg(long, env = "DATATX_ID")]
    pub id: Option<String>,
    /// Exit after receiving N payloads.
    #[arg(long)]
    pub count: Option<usize>,
    /// Close a connection that makes no progress for this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub idle_timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Port the receiver is listening on.
    pub port: u16,
    /// Identity of the receiver.
    pub target: String,
    /// Items to send, in order.
    #[arg(conflicts_with = "file")]
    pub items: Vec<String>,
    /// Send the lines of a file, one item per line.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// Identity to send from. Default: a random id.
    #[arg(long)]
    pub id: Option<String>,
    /// Maximum time to wait for the connection (e.g. 200ms, 1s).
    #[arg(long, default_value = "200ms")]
    pub connect_timeout: String,
    /// Maximum time to wait for each acknowledgement.
    #[arg(long, default_value = "400ms")]
    pub response_timeout: String,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    /// Prepend this string to every generated id.
    #[arg(long)]
    pub prefix: Option<String>,
    /// Number of ids to generate.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a duration such as `500ms`, `2s` or `3` (seconds).
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Use the given identity, or generate one.
pub fn resolve_id(id: Option<&str>) -> CliResult<ChannelId> {
    match id {
        Some(id) => ChannelId::new(id).map_err(|err| CliError::usage(err.to_string())),
        None => Ok(ChannelId::random()),
    }
}
