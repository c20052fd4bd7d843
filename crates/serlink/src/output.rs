use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serlink_frame::{command_name, DecodedFrame};

#[derive(Clone, Debug, Copy, ValueEnum)]
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
struct FrameOutput<'a> {
    command_id: u8,
    command: &'a str,
    parameters: String,
    size: usize,
    valid: bool,
    timestamp: String,
}

#[derive(Serialize)]
struct EncodedOutput {
    payload: String,
    frame: String,
    size: usize,
}

/// Print one decoded frame. `Raw` writes the unframed payload bytes.
pub fn print_frame(frame: &DecodedFrame, format: OutputFormat) {
    let name = command_name(frame.command_id);
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                command_id: frame.command_id,
                command: name,
                parameters: hex::encode(&frame.parameters),
                size: frame.parameters.len() + 1,
                valid: frame.valid,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "ID", "SIZE", "VALID", "PARAMETERS"])
                .add_row(vec![
                    name.to_string(),
                    format!("0x{:02X}", frame.command_id),
                    (frame.parameters.len() + 1).to_string(),
                    frame.valid.to_string(),
                    hex::encode(&frame.parameters),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command=0x{:02X} ({}) size={} valid={} parameters={}",
                frame.command_id,
                name,
                frame.parameters.len() + 1,
                frame.valid,
                hex::encode(&frame.parameters)
            );
        }
        OutputFormat::Raw => print_raw(&frame.payload()),
    }
}

/// Print an encoded frame. `Raw` writes the wire bytes.
pub fn print_encoded(payload: &[u8], frame: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            payload: hex::encode(payload),
            frame: hex::encode(frame),
            size: frame.len(),
        }),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PAYLOAD", "FRAME", "SIZE"])
                .add_row(vec![
                    hex::encode(payload),
                    hex::encode(frame),
                    frame.len().to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", spaced_hex(frame)),
        OutputFormat::Raw => print_raw(frame),
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

/// `05 00 02 0A 32 C2 04` style dump.
pub fn spaced_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
