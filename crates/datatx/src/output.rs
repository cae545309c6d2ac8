use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    port: u16,
    id: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct PayloadOutput<'a> {
    event: &'static str,
    port: u16,
    payload_size: usize,
    payload: &'a str,
    timestamp: String,
}

#[derive(Serialize)]
struct SentOutput<'a> {
    event: &'static str,
    port: u16,
    source: &'a str,
    target: &'a str,
    items: usize,
    timestamp: String,
}

#[derive(Serialize)]
struct IdOutput<'a> {
    id: &'a str,
}

/// Announce a bound receiver. Peers need both values to reach it.
pub fn print_listening(port: u16, id: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            port,
            id,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => print_table(
            vec!["PORT", "ID"],
            vec![vec![port.to_string(), id.to_string()]],
        ),
        OutputFormat::Pretty => println!("listening port={port} id={id}"),
        OutputFormat::Raw => print_raw(format!("{port} {id}\n").as_bytes()),
    }
}

pub fn print_payload(port: u16, payload: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PayloadOutput {
            event: "payload",
            port,
            payload_size: payload.len(),
            payload,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => print_table(
            vec!["PORT", "SIZE", "PAYLOAD"],
            vec![vec![
                port.to_string(),
                payload.len().to_string(),
                payload.to_string(),
            ]],
        ),
        OutputFormat::Pretty => {
            println!("port={port} size={} payload={payload}", payload.len())
        }
        OutputFormat::Raw => print_raw(format!("{payload}\n").as_bytes()),
    }
}

pub fn print_sent(port: u16, source: &str, target: &str, items: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SentOutput {
            event: "sent",
            port,
            source,
            target,
            items,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => print_table(
            vec!["PORT", "SOURCE", "TARGET", "ITEMS"],
            vec![vec![
                port.to_string(),
                source.to_string(),
                target.to_string(),
                items.to_string(),
            ]],
        ),
        OutputFormat::Pretty => {
            println!("sent port={port} source={source} target={target} items={items}")
        }
        // Raw output is reserved for payload bytes.
        OutputFormat::Raw => {}
    }
}

pub fn print_ids(ids: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for id in ids {
                print_json(&IdOutput { id });
            }
        }
        OutputFormat::Table => print_table(
            vec!["ID"],
            ids.iter().map(|id| vec![id.clone()]).collect(),
        ),
        OutputFormat::Pretty | OutputFormat::Raw => {
            for id in ids {
                println!("{id}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_table(header: Vec<&str>, rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
