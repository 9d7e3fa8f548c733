//! Command-line surface: argument parsing and command execution.
//!
//! Parsing and execution live here rather than in `main.rs` so they can be
//! tested against a scripted bus.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use dxl_core::{Ack, Device, DriverError, FactoryResetMode, Transport};

use crate::config::ToolConfig;

/// Talk to one DYNAMIXEL servo over a serial bus.
#[derive(Debug, Parser)]
#[command(name = "dxl-tool", version, about)]
pub struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Serial port, overriding the config file.
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Baud rate, overriding the config file.
    #[arg(short, long, global = true)]
    pub baud: Option<u32>,

    /// Device id (0-252, or 254 for broadcast), overriding the config file.
    #[arg(short, long, global = true)]
    pub id: Option<u8>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Check that the device answers and print its model and firmware.
    Ping,
    /// Read COUNT bytes starting at ADDRESS.
    Read {
        #[arg(value_parser = parse_u16)]
        address: u16,
        #[arg(value_parser = parse_u16)]
        count: u16,
    },
    /// Write bytes starting at ADDRESS.
    Write {
        #[arg(value_parser = parse_u16)]
        address: u16,
        #[arg(value_parser = parse_byte, num_args = 1.., required = true)]
        data: Vec<u8>,
    },
    /// Stage a write that takes effect on `action`.
    RegWrite {
        #[arg(value_parser = parse_u16)]
        address: u16,
        #[arg(value_parser = parse_byte, num_args = 1.., required = true)]
        data: Vec<u8>,
    },
    /// Apply a staged write.
    Action,
    /// Restart the device.
    Reboot,
    /// Restore factory settings.
    FactoryReset {
        #[arg(value_enum, default_value_t = ResetMode::ExceptId)]
        mode: ResetMode,
    },
}

/// Which settings a factory reset leaves alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResetMode {
    All,
    ExceptId,
    ExceptIdAndBaud,
}

impl From<ResetMode> for FactoryResetMode {
    fn from(mode: ResetMode) -> Self {
        match mode {
            ResetMode::All => FactoryResetMode::All,
            ResetMode::ExceptId => FactoryResetMode::ExceptId,
            ResetMode::ExceptIdAndBaud => FactoryResetMode::ExceptIdAndBaud,
        }
    }
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut ToolConfig) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(id) = self.id {
            config.device.id = id;
        }
    }
}

/// Runs `command` against `device` and returns the text to print.
///
/// # Errors
///
/// Propagates the driver error of a failed transaction.
pub fn execute<T: Transport>(
    device: &mut Device<T>,
    command: &Command,
) -> Result<String, DriverError> {
    let out = match command {
        Command::Ping => {
            let pong = device.ping()?;
            format!(
                "id {}: model {} firmware {} (error {})",
                device.id(),
                pong.data.model_number,
                pong.data.firmware_version,
                pong.error
            )
        }
        Command::Read { address, count } => {
            let read = device.read(*address, *count)?;
            format!("{} (error {})", hex(&read.data), read.error)
        }
        Command::Write { address, data } => describe(device.write(*address, data)?),
        Command::RegWrite { address, data } => describe(device.reg_write(*address, data)?),
        Command::Action => describe(device.action()?),
        Command::Reboot => describe(device.reboot()?),
        Command::FactoryReset { mode } => describe(device.factory_reset((*mode).into())?),
    };
    Ok(out)
}

fn describe(ack: Ack) -> String {
    match ack {
        Ack::Broadcast => "sent to broadcast, no reply expected".to_string(),
        Ack::Device(error) => format!("ok (error {error})"),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}

fn parse_number(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("`{s}` is not a number: {e}"))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    u16::try_from(parse_number(s)?).map_err(|_| format!("`{s}` does not fit in 16 bits"))
}

fn parse_byte(s: &str) -> Result<u8, String> {
    u8::try_from(parse_number(s)?).map_err(|_| format!("`{s}` does not fit in a byte"))
}
