//! File logging for the CLI.
//!
//! Stdout carries command output, so diagnostics go to a daily-rolling file
//! under `~/.cnc-monitor/logs/`. If that directory cannot be created the
//! subscriber falls back to stderr.

use std::env;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "monitorctl.log";
const DEBUG_ENV: &str = "CNC_MONITOR_DEBUG_LOG";

/// Installs the global subscriber. Keep the returned guard alive for the
/// whole process or buffered lines are lost on exit.
pub fn init() -> Option<WorkerGuard> {
    let filter = env_filter();

    match log_dir().and_then(|dir| fs_err::create_dir_all(&dir).ok().map(|_| dir)) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .is_ok();
            installed.then_some(guard)
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
    }
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cnc-monitor").join("logs"))
}
