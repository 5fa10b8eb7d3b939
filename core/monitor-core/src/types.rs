//! Pin-level input types.
//!
//! Controllers send `0`/`1` integers. They are converted to [`PinLevel`] once at
//! the boundary and stay typed from then on.

use serde::{Deserialize, Serialize};

/// Logic level of a single digital pin. Serialized as `0` / `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PinLevel {
    #[default]
    Low,
    High,
}

impl PinLevel {
    pub fn is_high(self) -> bool {
        self == PinLevel::High
    }

    /// True when moving from `previous` to `self` is a 0→1 edge.
    pub fn rose_from(self, previous: PinLevel) -> bool {
        previous == PinLevel::Low && self == PinLevel::High
    }

    /// True when moving from `previous` to `self` is a 1→0 edge.
    pub fn fell_from(self, previous: PinLevel) -> bool {
        previous == PinLevel::High && self == PinLevel::Low
    }
}

impl From<bool> for PinLevel {
    fn from(value: bool) -> Self {
        if value {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

impl From<PinLevel> for u8 {
    fn from(level: PinLevel) -> Self {
        match level {
            PinLevel::Low => 0,
            PinLevel::High => 1,
        }
    }
}

impl TryFrom<u8> for PinLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PinLevel::Low),
            1 => Ok(PinLevel::High),
            other => Err(format!("pin level must be 0 or 1, got {}", other)),
        }
    }
}

/// The three pins a controller reports.
///
/// - `pin2`: spindle running
/// - `pin3`: manufacturing (high) vs. idle (low)
/// - `pin4`: auxiliary, recorded but not classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PinSnapshot {
    pub pin2: PinLevel,
    pub pin3: PinLevel,
    pub pin4: PinLevel,
}

impl PinSnapshot {
    pub fn new(pin2: PinLevel, pin3: PinLevel, pin4: PinLevel) -> Self {
        Self { pin2, pin3, pin4 }
    }

    pub fn spindle(&self) -> PinLevel {
        self.pin2
    }

    pub fn manufacturing(&self) -> PinLevel {
        self.pin3
    }
}

/// One periodic report from a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct PinReport {
    pub device: String,
    pub pins: PinSnapshot,
    /// Cumulative powered-on time reported by the controller, in milliseconds.
    pub on_time_ms: Option<f64>,
}

impl PinReport {
    pub fn new(device: impl Into<String>, pins: PinSnapshot) -> Self {
        Self {
            device: device.into(),
            pins,
            on_time_ms: None,
        }
    }

    pub fn with_on_time_ms(mut self, on_time_ms: f64) -> Self {
        self.on_time_ms = Some(on_time_ms);
        self
    }

    /// Whole powered-on seconds, if the report carried a usable value.
    pub fn powered_on_seconds(&self) -> Option<u64> {
        self.on_time_ms
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(|value| (value / 1000.0).floor() as u64)
    }
}
