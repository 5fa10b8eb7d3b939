//! Client helper for talking to the CNC monitor daemon.
//!
//! The daemon owns all device state; this module only frames requests and
//! decodes the typed payloads. Failures are surfaced to the caller.

use cnc_daemon_protocol::{
    HealthStatus, Method, PinReportEnvelope, RangeParams, Request, ResetAck, Response,
    MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use chrono::Utc;
use monitor_core::{DeviceSnapshot, EpochMillis, RangeReport};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SOCKET_ENV: &str = "CNC_MONITOR_SOCKET";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_MS: u64 = 2_000;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Failed to connect to daemon socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write request: {0}")]
    Write(#[source] std::io::Error),

    #[error("Failed to read response: {0}")]
    Read(#[source] std::io::Error),

    #[error("Timed out waiting for daemon response")]
    Timeout,

    #[error("Daemon response was empty")]
    EmptyResponse,

    #[error("Response exceeded maximum size")]
    ResponseTooLarge,

    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to parse daemon response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Daemon returned no payload")]
    MissingPayload,

    #[error("{code}: {message}")]
    Daemon { code: String, message: String },
}

impl ClientError {
    /// Errors the daemon produced after reading the request. Resending the
    /// same request would fail the same way.
    fn is_rejection(&self) -> bool {
        matches!(self, ClientError::Daemon { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Payload of a successful `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UpdateAck {
    pub success: bool,
    pub created: bool,
}

pub struct DaemonClient {
    socket: PathBuf,
}

impl DaemonClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// Uses `CNC_MONITOR_SOCKET` when set, else `~/.cnc-monitor/daemon.sock`.
    pub fn from_env() -> Result<Self> {
        socket_path().map(Self::new)
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn health(&self) -> Result<HealthStatus> {
        self.call(Method::GetHealth, None)
    }

    /// Sends one pin report, retrying once on transport failure. The retry
    /// reuses the request id, and a report whose pins match the previous one
    /// only refreshes bookkeeping, so a duplicate delivery is harmless.
    pub fn update(&self, report: &PinReportEnvelope) -> Result<UpdateAck> {
        let params = serde_json::to_value(report).map_err(ClientError::Encode)?;
        let request_id = make_request_id("upd");
        let build = || Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::Update,
            id: Some(request_id.clone()),
            params: Some(params.clone()),
        };

        match self.send(build()) {
            Ok(response) => decode_payload(response),
            Err(err) if err.is_rejection() => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to send pin report to daemon");
                std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                self.send(build())
                    .map_err(|retry_err| {
                        tracing::warn!(error = %retry_err, "Retry failed sending pin report");
                        retry_err
                    })
                    .and_then(decode_payload)
            }
        }
    }

    pub fn devices(&self) -> Result<BTreeMap<String, DeviceSnapshot>> {
        self.call(Method::GetDevices, None)
    }

    pub fn report(&self, from: EpochMillis, to: EpochMillis) -> Result<RangeReport> {
        let params = RangeParams {
            from: Some(from),
            to: Some(to),
        };
        let params = serde_json::to_value(params).map_err(ClientError::Encode)?;
        self.call(Method::GetReport, Some(params))
    }

    pub fn reset(&self) -> Result<ResetAck> {
        self.call(Method::Reset, None)
    }

    fn call<T: DeserializeOwned>(&self, method: Method, params: Option<serde_json::Value>) -> Result<T> {
        let request = Request {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: Some(make_request_id("req")),
            params,
        };
        self.send(request).and_then(decode_payload)
    }

    fn send(&self, request: Request) -> Result<Response> {
        let mut stream = UnixStream::connect(&self.socket).map_err(|source| ClientError::Connect {
            path: self.socket.clone(),
            source,
        })?;
        let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
        let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

        tracing::debug!(method = ?request.method, id = ?request.id, "Sending daemon request");
        let mut payload = serde_json::to_vec(&request).map_err(ClientError::Encode)?;
        payload.push(b'\n');
        stream.write_all(&payload).map_err(ClientError::Write)?;
        stream.flush().ok();

        let response = read_response(&mut stream)?;
        if response.ok {
            Ok(response)
        } else {
            let (code, message) = response
                .error
                .map(|err| (err.code, err.message))
                .unwrap_or_else(|| ("unknown".to_string(), "Unknown daemon error".to_string()));
            Err(ClientError::Daemon { code, message })
        }
    }
}

fn decode_payload<T: DeserializeOwned>(response: Response) -> Result<T> {
    let data = response.data.ok_or(ClientError::MissingPayload)?;
    serde_json::from_value(data).map_err(ClientError::Decode)
}

fn socket_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir().ok_or(ClientError::HomeNotFound)?;
    Ok(home.join(".cnc-monitor").join(SOCKET_NAME))
}

fn read_response(stream: &mut UnixStream) -> Result<Response> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ClientError::ResponseTooLarge);
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(ClientError::Timeout);
            }
            Err(err) => return Err(ClientError::Read(err)),
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err(ClientError::EmptyResponse);
    }

    serde_json::from_slice(response_bytes).map_err(ClientError::Decode)
}

fn make_request_id(prefix: &str) -> String {
    let mut random = rand::thread_rng();
    format!(
        "{}-{}-{}-{:x}",
        prefix,
        Utc::now().timestamp_millis(),
        std::process::id(),
        random.next_u64()
    )
}
