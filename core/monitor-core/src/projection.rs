//! Read-only projections over the registry.
//!
//! Both projections sum whole-second overlaps of every run (closed runs plus
//! the open run, clamped at `now`) against a reporting window. The live
//! snapshot uses the current shift; the range report uses a caller-supplied
//! `[from, to)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::device::DeviceState;
use crate::error::{Result, ValidationError};
use crate::interval::{whole_seconds, EpochMillis, TimeInterval};
use crate::registry::DeviceRegistry;
use crate::shift::{ShiftName, ShiftWindow, SHIFT_SECONDS};
use crate::types::{PinLevel, PinSnapshot};

/// Dashboard view of one device for the current shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub spindle: PinLevel,
    pub spindle_time: u64,
    pub manufacturing_active: bool,
    pub manufacturing_runs: Vec<TimeInterval>,
    pub idle_active: bool,
    pub idle_runs: Vec<TimeInterval>,
    /// Both ledgers merged, newest first.
    pub recent: Vec<TimeInterval>,
    /// Completed parts; one per manufacturing run.
    pub parts: Vec<TimeInterval>,
    pub on_time: u64,
    pub total_shift_on_seconds: u64,
    pub efficiency_percent: f64,
    pub shift_name: ShiftName,
    pub shift_start: EpochMillis,
    pub shift_end: EpochMillis,
    pub shift_elapsed_seconds: u64,
    pub last_update: EpochMillis,
    pub current_state: PinSnapshot,
}

impl DeviceSnapshot {
    fn project(device: &DeviceState, shift: &ShiftWindow, now: EpochMillis) -> Self {
        let (manufacturing, idle) = device.seconds_within(shift.start, shift.end, now);
        let total = (manufacturing + idle).min(SHIFT_SECONDS);

        let mut recent: Vec<TimeInterval> = device
            .manufacturing_runs()
            .iter()
            .chain(device.idle_runs().iter())
            .copied()
            .collect();
        recent.sort_by(|a, b| b.start.cmp(&a.start));

        Self {
            spindle: PinLevel::from(device.spindle_on()),
            spindle_time: device.spindle_accumulated_seconds(),
            manufacturing_active: device.manufacturing_active(),
            manufacturing_runs: device.manufacturing_runs().to_vec(),
            idle_active: device.idle_active(),
            idle_runs: device.idle_runs().to_vec(),
            recent,
            parts: device.manufacturing_runs().to_vec(),
            on_time: device.powered_on_seconds(),
            total_shift_on_seconds: total,
            efficiency_percent: round_percent(100.0 * total as f64 / SHIFT_SECONDS as f64),
            shift_name: shift.name,
            shift_start: shift.start,
            shift_end: shift.end,
            shift_elapsed_seconds: shift.elapsed_seconds(now),
            last_update: device.last_report_at(),
            current_state: device.last_pins(),
        }
    }
}

/// Live dashboard snapshot for every known device.
pub fn live_snapshot(
    registry: &DeviceRegistry,
    shift: &ShiftWindow,
    now: EpochMillis,
) -> BTreeMap<String, DeviceSnapshot> {
    registry
        .iter()
        .map(|(name, device)| {
            if let Err(issue) = device.check_timeline() {
                tracing::warn!(device = %name, issue = %issue, "Device timeline failed consistency check");
            }
            (name.to_string(), DeviceSnapshot::project(device, shift, now))
        })
        .collect()
}

/// A validated `[from, to)` reporting range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeQuery {
    from: EpochMillis,
    to: EpochMillis,
}

impl RangeQuery {
    pub fn new(from: Option<EpochMillis>, to: Option<EpochMillis>) -> Result<Self> {
        let from = from.ok_or(ValidationError::MissingRangeBound { field: "from" })?;
        let to = to.ok_or(ValidationError::MissingRangeBound { field: "to" })?;
        if from <= 0 {
            return Err(ValidationError::NonPositiveRangeBound {
                field: "from",
                value: from,
            });
        }
        if to <= 0 {
            return Err(ValidationError::NonPositiveRangeBound {
                field: "to",
                value: to,
            });
        }
        if from >= to {
            return Err(ValidationError::EmptyRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> EpochMillis {
        self.from
    }

    pub fn to(&self) -> EpochMillis {
        self.to
    }

    pub fn seconds(&self) -> u64 {
        whole_seconds(self.from, self.to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRangeSummary {
    pub manufacturing_seconds: u64,
    pub idle_seconds: u64,
    pub total_on_seconds: u64,
    pub efficiency_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeReport {
    pub from: EpochMillis,
    pub to: EpochMillis,
    pub devices: BTreeMap<String, DeviceRangeSummary>,
}

/// Utilization of every known device over `range`. Not clamped to a shift
/// length; the range itself bounds the totals.
pub fn range_report(registry: &DeviceRegistry, range: RangeQuery, now: EpochMillis) -> RangeReport {
    let range_seconds = range.seconds();
    let devices = registry
        .iter()
        .map(|(name, device)| {
            let (manufacturing_seconds, idle_seconds) =
                device.seconds_within(range.from, range.to, now);
            let total_on_seconds = manufacturing_seconds + idle_seconds;
            let efficiency_percent = if range_seconds > 0 {
                round_percent(100.0 * total_on_seconds as f64 / range_seconds as f64)
            } else {
                0.0
            };
            (
                name.to_string(),
                DeviceRangeSummary {
                    manufacturing_seconds,
                    idle_seconds,
                    total_on_seconds,
                    efficiency_percent,
                },
            )
        })
        .collect();

    RangeReport {
        from: range.from,
        to: range.to,
        devices,
    }
}

/// Rounds to two decimal places.
pub fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
