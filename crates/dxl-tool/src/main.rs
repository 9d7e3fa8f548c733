//! `dxl-tool` entry point.
//!
//! Startup sequence:
//! 1. Parse the command line.
//! 2. Load the TOML config (defaults when the file does not exist) and apply
//!    command-line overrides.
//! 3. Initialise structured logging.  `RUST_LOG` wins over the config's
//!    `log_level`.
//! 4. Open the serial port, run one transaction and print the result.

use anyhow::Context;
use clap::Parser;
use dxl_core::{Device, DeviceId};
use dxl_tool::cli::{execute, Cli};
use dxl_tool::config::{config_file_path, load_config};
use dxl_tool::serial::SerialTransport;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    let mut config = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    cli.apply_overrides(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        port = %config.serial.port,
        baud = config.serial.baud_rate,
        id = config.device.id,
        "dxl-tool starting"
    );

    let id = DeviceId::new(config.device.id).context("invalid device id")?;
    let transport = SerialTransport::open(&config.serial)?;
    let mut device = Device::with_config(id, transport, config.driver);

    match execute(&mut device, &cli.command) {
        Ok(output) => {
            println!("{output}");
            Ok(())
        }
        Err(e) => {
            error!(kind = ?e.kind(), "transaction failed: {e}");
            Err(e.into())
        }
    }
}
