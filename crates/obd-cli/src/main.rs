//! obd - raw SocketCAN OBD-II diagnostic tool.
//!
//! Enumerates ECUs, reads live/freeze frame data and vehicle information,
//! and reads or clears trouble codes over ISO 15765-4 (11-bit, 500 kbit/s
//! buses as configured on the host interface).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use obd_canbus::{CanInterface, ObdSession};
use obd_cli::commands::{self, Command};
use obd_cli::config::{CliConfig, Overrides};
use obd_cli::output;

#[derive(Parser)]
#[command(name = "obd")]
#[command(version, about = "Raw SocketCAN OBD-II tool")]
#[command(after_help = "Commands:
  enum, list          enumerate ECUs
  show, data          show data for ECU (service=0x01)
  frozen, freeze      show freeze frame data for ECU (service=0x02)
  clear               clear fault codes (DTCs) (service=0x04)
  faults, dtc         read fault codes (DTCs) (service=0x03)
  pending             read pending fault codes (DTCs) (service=0x07)
  permanent, perm     read permanent fault codes (DTCs) (service=0x0a)
  info                read info (service=0x09)
  request, read       read custom service/pid
  vin                 read the vehicle identification number")]
struct Cli {
    /// Command to run
    command: Option<String>,

    /// CAN network interface [default: can0]
    #[arg(short, long, env = "OBD_INTERFACE")]
    interface: Option<String>,

    /// Only request from this ECU (0-7) instead of broadcasting to 0x7df
    #[arg(short, long)]
    ecu: Option<u8>,

    /// Service number, hex (request command only)
    #[arg(short, long, value_parser = parse_hex)]
    service: Option<u32>,

    /// PID number, hex
    #[arg(short, long, value_parser = parse_hex)]
    pid: Option<u32>,

    /// Seconds to wait for responses [default: 1]
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Configuration file path
    #[arg(short, long, env = "OBD_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Hex number with or without a `0x` prefix.
fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("'{s}' is not a hex number: {e}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();

    let Some(word) = cli.command.as_deref() else {
        Cli::command().print_help()?;
        return Ok(());
    };
    let command = match word.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            return Ok(());
        }
    };

    let config = match &cli.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };
    let settings = config.resolve(Overrides {
        interface: cli.interface.clone(),
        ecu: cli.ecu,
        timeout_secs: cli.timeout,
        json: cli.json,
    });

    let action = match command.action(cli.service, cli.pid) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{e}");
            return Ok(());
        }
    };

    let iface = open_interface(&settings.interface)?;
    tracing::debug!(interface = %settings.interface, ?action, "running command");

    let session = ObdSession::new(iface.as_ref()).with_timeout(settings.timeout);
    let outcome = commands::execute(&session, action, settings.target)
        .await
        .with_context(|| format!("{command} failed on {}", settings.interface))?;

    print!("{}", output::render(&outcome, settings.output)?);
    Ok(())
}

#[cfg(target_os = "linux")]
fn open_interface(name: &str) -> Result<Box<dyn CanInterface>> {
    let iface = obd_canbus::SocketCanInterface::open(name)
        .with_context(|| format!("cannot open CAN interface {name}"))?;
    Ok(Box::new(iface))
}

#[cfg(not(target_os = "linux"))]
fn open_interface(name: &str) -> Result<Box<dyn CanInterface>> {
    anyhow::bail!("cannot open CAN interface {name}: SocketCAN requires Linux")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_arguments() {
        assert_eq!(parse_hex("0c"), Ok(0x0C));
        assert_eq!(parse_hex("0xF190"), Ok(0xF190));
        assert_eq!(parse_hex("3F"), Ok(0x3F));
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_original_style_arguments() {
        let cli = Cli::try_parse_from([
            "obd", "request", "-s", "22", "-p", "f190", "-e", "3", "-t", "2",
        ])
        .unwrap();
        assert_eq!(cli.command.as_deref(), Some("request"));
        assert_eq!(cli.service, Some(0x22));
        assert_eq!(cli.pid, Some(0xF190));
        assert_eq!(cli.ecu, Some(3));
        assert_eq!(cli.timeout, Some(2));
    }
}
