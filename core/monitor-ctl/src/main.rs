//! cnc-monitorctl: command-line client for the CNC monitor daemon.
//!
//! ## Subcommands
//!
//! - `update`: Send one pin report (what controller firmware does over HTTP)
//! - `devices`: Live shift snapshot of every device
//! - `report`: Utilization over a time range (defaults to the last 24 hours)
//! - `status`: Daemon health
//! - `reset`: Drop all tracked state (requires `--yes`)

mod daemon_client;
mod logging;
mod render;

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use cnc_daemon_protocol::PinReportEnvelope;
use daemon_client::{ClientError, DaemonClient};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "cnc-monitorctl")]
#[command(about = "Query and feed the CNC monitor daemon")]
#[command(version)]
struct Cli {
    /// Print raw JSON payloads instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one pin report for a device
    Update {
        /// Device name as reported by its controller
        #[arg(long)]
        name: String,

        /// Spindle pin level
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
        pin2: u8,

        /// Manufacturing pin level
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
        pin3: u8,

        /// Auxiliary pin level
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
        pin4: u8,

        /// Cumulative powered-on time in milliseconds
        #[arg(long)]
        on_time: Option<u64>,
    },

    /// Show the live shift snapshot for every device
    Devices,

    /// Summarize utilization over a time range
    Report {
        /// Range start: epoch ms or local YYYY-MM-DDTHH:MM[:SS]
        #[arg(long)]
        from: Option<String>,

        /// Range end: epoch ms or local YYYY-MM-DDTHH:MM[:SS]
        #[arg(long)]
        to: Option<String>,
    },

    /// Check that the daemon is up
    Status,

    /// Discard all device state
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Error, Debug)]
enum CommandError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("invalid --{field}: {message}")]
    InvalidTime { field: &'static str, message: String },

    #[error("reset discards every device; pass --yes to confirm")]
    ResetNotConfirmed,

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => print!("{}", output),
        Err(err) => {
            tracing::error!(error = %err, "cnc-monitorctl failed");
            eprintln!("cnc-monitorctl: {}", err);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<String, CommandError> {
    if let Commands::Reset { yes: false } = cli.command {
        return Err(CommandError::ResetNotConfirmed);
    }

    let client = DaemonClient::from_env()?;
    tracing::debug!(socket = %client.socket().display(), "Using daemon socket");

    match cli.command {
        Commands::Update {
            name,
            pin2,
            pin3,
            pin4,
            on_time,
        } => {
            let report = PinReportEnvelope {
                name: Some(name),
                pin2: Some(pin2),
                pin3: Some(pin3),
                pin4: Some(pin4),
                on_time: on_time.map(serde_json::Value::from),
            };
            let ack = client.update(&report)?;
            if cli.json {
                json_output(&serde_json::json!({"success": ack.success, "created": ack.created}))
            } else if ack.created {
                Ok("ok (new device)\n".to_string())
            } else {
                Ok("ok\n".to_string())
            }
        }
        Commands::Devices => {
            let devices = client.devices()?;
            if cli.json {
                json_output(&devices)
            } else {
                Ok(render::device_table(&devices))
            }
        }
        Commands::Report { from, to } => {
            let from = parse_bound(from.as_deref(), "from")?;
            let to = parse_bound(to.as_deref(), "to")?;
            let (from, to) = render::resolve_range(from, to, Utc::now().timestamp_millis());
            let report = client.report(from, to)?;
            if cli.json {
                json_output(&report)
            } else {
                Ok(render::report_table(&report))
            }
        }
        Commands::Status => {
            let health = client.health()?;
            if cli.json {
                json_output(&health)
            } else {
                Ok(render::health_line(&health))
            }
        }
        Commands::Reset { .. } => {
            let ack = client.reset()?;
            if cli.json {
                json_output(&ack)
            } else {
                Ok(render::reset_line(&ack))
            }
        }
    }
}

fn parse_bound(value: Option<&str>, field: &'static str) -> Result<Option<i64>, CommandError> {
    value
        .map(|value| render::parse_time_arg(value, &Local))
        .transpose()
        .map_err(|message| CommandError::InvalidTime { field, message })
}

fn json_output<T: Serialize>(value: &T) -> Result<String, CommandError> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_update_flags() {
        let cli = Cli::try_parse_from([
            "cnc-monitorctl",
            "update",
            "--name",
            "lathe-1",
            "--pin2",
            "1",
            "--pin3",
            "0",
            "--on-time",
            "1200",
        ])
        .unwrap();
        match cli.command {
            Commands::Update {
                name,
                pin2,
                pin3,
                pin4,
                on_time,
            } => {
                assert_eq!(name, "lathe-1");
                assert_eq!((pin2, pin3, pin4), (1, 0, 0));
                assert_eq!(on_time, Some(1_200));
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn cli_rejects_pin_levels_other_than_zero_or_one() {
        assert!(Cli::try_parse_from([
            "cnc-monitorctl",
            "update",
            "--name",
            "x",
            "--pin2",
            "2",
            "--pin3",
            "0",
        ])
        .is_err());
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["cnc-monitorctl", "devices", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn reset_requires_confirmation() {
        let cli = Cli::try_parse_from(["cnc-monitorctl", "reset"]).unwrap();
        assert!(matches!(run(cli), Err(CommandError::ResetNotConfirmed)));
    }

    #[test]
    fn bad_report_bound_names_the_flag() {
        let err = parse_bound(Some("noon"), "from").unwrap_err();
        assert!(err.to_string().starts_with("invalid --from"));
        assert_eq!(parse_bound(None, "to").unwrap(), None);
    }
}
