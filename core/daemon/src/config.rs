//! Daemon configuration.
//!
//! Read from `~/.cnc-monitor/daemon/config.toml`. Every field has a default,
//! so a missing file (or a missing section) yields the stock 500 ms debounce
//! and 08:30/20:30 local-time shifts.
//!
//! ```toml
//! [tracking]
//! debounce_ms = 500
//!
//! [shift]
//! day_start = "08:30"
//! timezone = "local"   # or "utc"
//! ```

use chrono::NaiveTime;
use monitor_core::{EpochMillis, ShiftCalendar, ShiftWindow, TrackerConfig, DEFAULT_DEBOUNCE_MS};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".cnc-monitor/daemon/config.toml";
const TZ_UTC_ENV: &str = "CNC_MONITOR_TZ_UTC";

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShiftZone {
    #[default]
    Local,
    Utc,
}

impl ShiftZone {
    pub fn window_for(&self, calendar: &ShiftCalendar, now: EpochMillis) -> ShiftWindow {
        match self {
            ShiftZone::Local => calendar.window_for(&chrono::Local, now),
            ShiftZone::Utc => calendar.window_for(&chrono::Utc, now),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: i64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShiftConfig {
    #[serde(default = "default_day_start")]
    pub day_start: String,
    #[serde(default)]
    pub timezone: ShiftZone,
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            day_start: default_day_start(),
            timezone: ShiftZone::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub shift: ShiftConfig,
}

/// Validated settings the daemon runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub tracker: TrackerConfig,
    pub calendar: ShiftCalendar,
    pub zone: ShiftZone,
}

impl DaemonConfig {
    pub fn resolve(&self) -> Result<RuntimeSettings, String> {
        if self.tracking.debounce_ms < 0 {
            return Err(format!(
                "tracking.debounce_ms must not be negative (got {})",
                self.tracking.debounce_ms
            ));
        }

        let day_start = parse_day_start(&self.shift.day_start)?;
        let calendar = ShiftCalendar::new(day_start).map_err(|err| err.to_string())?;

        Ok(RuntimeSettings {
            tracker: TrackerConfig {
                debounce_ms: self.tracking.debounce_ms,
            },
            calendar,
            zone: self.shift.timezone,
        })
    }

    pub fn apply_env_overrides(&mut self) {
        let force_utc = env::var(TZ_UTC_ENV)
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(false);
        if force_utc {
            self.shift.timezone = ShiftZone::Utc;
        }
    }
}

pub fn default_config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

pub fn load_config(path: Option<PathBuf>) -> Result<DaemonConfig, String> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(DaemonConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| {
        format!(
            "Failed to read daemon config {}: {}",
            config_path.display(),
            err
        )
    })?;
    toml::from_str::<DaemonConfig>(&content).map_err(|err| {
        format!(
            "Failed to parse daemon config {}: {}",
            config_path.display(),
            err
        )
    })
}

fn parse_day_start(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M"))
        .map_err(|_| format!("shift.day_start must be HH:MM or HH:MM:SS (got {:?})", value))
}

fn default_debounce_ms() -> i64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_day_start() -> String {
    "08:30".to_string()
}
