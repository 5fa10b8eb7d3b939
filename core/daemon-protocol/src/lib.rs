//! IPC protocol types and validation for cnc-monitor-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB
pub const ERROR_TOO_MANY_CONNECTIONS: &str = "too_many_connections";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    /// Ingest one pin report from a controller.
    Update,
    /// Live shift-aligned snapshot of every device.
    GetDevices,
    /// Utilization over a caller-supplied range.
    GetReport,
    /// Drop every device. Destructive.
    Reset,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Pin report as sent by controller firmware:
/// `{"name": "...", "pin2": 0|1, "pin3": 0|1, "pin4": 0|1, "onTime": ms}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct PinReportEnvelope {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pin2: Option<u8>,
    #[serde(default)]
    pub pin3: Option<u8>,
    #[serde(default)]
    pub pin4: Option<u8>,
    /// Cumulative powered-on milliseconds. Non-numeric values are ignored.
    #[serde(default, rename = "onTime", skip_serializing_if = "Option::is_none")]
    pub on_time: Option<Value>,
}

impl PinReportEnvelope {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_string(&self.name, "name")?;
        require_pin(self.pin2, "pin2")?;
        require_pin(self.pin3, "pin3")?;
        require_pin(self.pin4, "pin4")?;
        Ok(())
    }

    pub fn on_time_ms(&self) -> Option<f64> {
        self.on_time.as_ref().and_then(Value::as_f64)
    }
}

pub fn parse_pin_report(params: Value) -> Result<PinReportEnvelope, ErrorInfo> {
    let envelope: PinReportEnvelope = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("pin report is invalid JSON: {}", err),
        )
    })?;
    envelope.validate()?;
    Ok(envelope)
}

/// Range report bounds in epoch milliseconds. Presence and ordering are
/// checked by the daemon; this only enforces that provided values are integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<i64>,
}

pub fn parse_range_params(params: Option<Value>) -> Result<RangeParams, ErrorInfo> {
    let params = match params {
        Some(params) => params,
        None => return Ok(RangeParams::default()),
    };
    if !params.is_object() {
        return Err(ErrorInfo::new("invalid_params", "params must be an object"));
    }

    Ok(RangeParams {
        from: epoch_millis_field(&params, "from")?,
        to: epoch_millis_field(&params, "to")?,
    })
}

/// Accepts integers, whole floats, and numeric strings (query-string style).
fn epoch_millis_field(params: &Value, field: &str) -> Result<Option<i64>, ErrorInfo> {
    let value = match params.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.is_finite()).map(|v| v as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.map(Some).ok_or_else(|| {
        ErrorInfo::new(
            "invalid_range",
            format!("{} must be an epoch-millisecond timestamp", field),
        )
    })
}

/// Payload of `get_health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub devices: Vec<String>,
    pub uptime_secs: f64,
    pub pid: u32,
    pub version: String,
    pub protocol_version: u32,
}

/// Payload of `reset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetAck {
    pub success: bool,
    pub message: String,
    pub timestamp: i64,
    pub devices_cleared: usize,
}

fn require_string(value: &Option<String>, field: &str) -> Result<(), ErrorInfo> {
    if let Some(candidate) = value {
        if !candidate.trim().is_empty() {
            return Ok(());
        }
    }
    Err(ErrorInfo::new(
        "missing_field",
        format!("{} is required", field),
    ))
}

fn require_pin(value: Option<u8>, field: &str) -> Result<(), ErrorInfo> {
    match value {
        Some(0) | Some(1) => Ok(()),
        Some(other) => Err(ErrorInfo::new(
            "invalid_pin",
            format!("{} must be 0 or 1 (got {})", field, other),
        )),
        None => Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        )),
    }
}
