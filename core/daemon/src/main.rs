//! CNC monitor daemon entrypoint.
//!
//! A small, single-writer service that owns device tracking state. Controllers
//! push pin reports and dashboards poll projections over a Unix socket using
//! newline-delimited JSON requests. State is memory-resident only.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chrono::Utc;
use cnc_daemon_protocol::{
    parse_pin_report, parse_range_params, ErrorInfo, Method, Request, Response,
    ERROR_TOO_MANY_CONNECTIONS, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use monitor_core::{EpochMillis, ValidationError};
use serde::Serialize;

mod config;
mod state;

use config::RuntimeSettings;
use state::{pin_report_from_envelope, SharedState};

const SOCKET_NAME: &str = "daemon.sock";
const SOCKET_ENV: &str = "CNC_MONITOR_SOCKET";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;
const MAX_ACTIVE_CONNECTIONS: usize = 64;

fn main() {
    init_logging();

    let socket_path = match daemon_socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "CNC monitor daemon started");

    let settings = load_settings();
    info!(
        debounce_ms = settings.tracker.debounce_ms,
        shift_day_start = %settings.calendar.day_start(),
        shift_zone = ?settings.zone,
        "Tracking config loaded"
    );
    let shared_state = Arc::new(SharedState::new(settings));
    let active_connections = Arc::new(AtomicUsize::new(0));

    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                let Some(slot) = ConnectionSlot::acquire(&active_connections) else {
                    warn!(limit = MAX_ACTIVE_CONNECTIONS, "Rejecting connection; too many active");
                    let response = Response::error(
                        None,
                        ERROR_TOO_MANY_CONNECTIONS,
                        "daemon is at its connection limit",
                    );
                    let _ = write_response(&mut stream, response);
                    continue;
                };
                let state = Arc::clone(&shared_state);
                thread::spawn(move || {
                    let _slot = slot;
                    handle_connection(stream, state);
                });
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

/// Counts an accepted connection until dropped.
struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>) -> Option<Self> {
        let previous = active.fetch_add(1, Ordering::SeqCst);
        if previous >= MAX_ACTIVE_CONNECTIONS {
            active.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self {
            active: Arc::clone(active),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn init_logging() {
    let debug_enabled = env::var("CNC_MONITOR_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings() -> RuntimeSettings {
    let mut config = match config::load_config(None) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load daemon config; using defaults");
            config::DaemonConfig::default()
        }
    };
    config.apply_env_overrides();

    match config.resolve() {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "Invalid daemon config; using defaults");
            let mut defaults = config::DaemonConfig::default();
            defaults.apply_env_overrides();
            defaults.resolve().unwrap_or_default()
        }
    }
}

fn daemon_socket_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".cnc-monitor").join(SOCKET_NAME))
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<SharedState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state, now_millis());
    let _ = write_response(&mut stream, response);
}

fn now_millis() -> EpochMillis {
    Utc::now().timestamp_millis()
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    if buffer.is_empty() {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let request_bytes = match newline_index {
        Some(index) => {
            if buffer.len() > index + 1 {
                let trailing = &buffer[index + 1..];
                if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                    warn!("Extra bytes detected after newline; ignoring trailing data");
                }
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, state: &SharedState, now: EpochMillis) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => serialize_payload(request.id, &state.health(), "health"),
        Method::Update => handle_update(request, state, now),
        Method::GetDevices => {
            let snapshot = state.live_snapshot(now);
            tracing::debug!(devices = snapshot.len(), "Device snapshot");
            serialize_payload(request.id, &snapshot, "device snapshot")
        }
        Method::GetReport => {
            let params = match parse_range_params(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match state.range_report(params, now) {
                Ok(report) => {
                    tracing::debug!(
                        from = report.from,
                        to = report.to,
                        devices = report.devices.len(),
                        "Range report"
                    );
                    serialize_payload(request.id, &report, "range report")
                }
                Err(err) => validation_error(request.id, err),
            }
        }
        Method::Reset => serialize_payload(request.id, &state.reset(now), "reset acknowledgment"),
    }
}

fn handle_update(request: Request, state: &SharedState, now: EpochMillis) -> Response {
    let params = match request.params {
        Some(params) => params,
        None => return Response::error(request.id, "invalid_params", "pin report is required"),
    };

    let envelope = match parse_pin_report(params) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Rejected pin report");
            return Response::error_with_info(request.id, err);
        }
    };

    let report = pin_report_from_envelope(&envelope);
    match state.ingest(&report, now) {
        Ok(outcome) => Response::ok(
            request.id,
            serde_json::json!({"success": true, "created": outcome.created}),
        ),
        Err(err) => validation_error(request.id, err),
    }
}

fn validation_error(id: Option<String>, err: ValidationError) -> Response {
    warn!(code = err.code(), error = %err, "Rejected request");
    Response::error(id, err.code(), err.to_string())
}

fn serialize_payload<T: Serialize>(id: Option<String>, payload: &T, label: &str) -> Response {
    match serde_json::to_value(payload) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize {}: {}", label, err),
        ),
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
