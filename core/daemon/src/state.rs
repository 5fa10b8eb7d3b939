//! In-memory state managed by the daemon.
//!
//! The registry lives behind a single `Mutex`: ingests, queries, and resets
//! are serialized, so a query never observes a half-applied report and a
//! reset is visible all at once. Nothing is persisted; a restart starts empty.

use cnc_daemon_protocol::{HealthStatus, PinReportEnvelope, RangeParams, ResetAck, PROTOCOL_VERSION};
use monitor_core::{
    live_snapshot, range_report, DeviceRegistry, DeviceSnapshot, EpochMillis, IngestOutcome,
    PinLevel, PinReport, PinSnapshot, RangeQuery, RangeReport, ShiftCalendar, ValidationError,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use crate::config::{RuntimeSettings, ShiftZone};

pub struct SharedState {
    registry: Mutex<DeviceRegistry>,
    calendar: ShiftCalendar,
    zone: ShiftZone,
    started_at: Instant,
}

impl SharedState {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            registry: Mutex::new(DeviceRegistry::new(settings.tracker)),
            calendar: settings.calendar,
            zone: settings.zone,
            started_at: Instant::now(),
        }
    }

    fn registry(&self) -> MutexGuard<'_, DeviceRegistry> {
        self.registry.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Device registry lock was poisoned; continuing with inner state");
            poisoned.into_inner()
        })
    }

    pub fn ingest(&self, report: &PinReport, now: EpochMillis) -> Result<IngestOutcome, ValidationError> {
        let outcome = self.registry().ingest(report, now)?;
        tracing::debug!(
            device = %report.device,
            pins = ?report.pins,
            created = outcome.created,
            transitions = outcome.transitions.len(),
            "Pin report applied"
        );
        Ok(outcome)
    }

    pub fn live_snapshot(&self, now: EpochMillis) -> BTreeMap<String, DeviceSnapshot> {
        let shift = self.zone.window_for(&self.calendar, now);
        let registry = self.registry();
        live_snapshot(&registry, &shift, now)
    }

    pub fn range_report(&self, params: RangeParams, now: EpochMillis) -> Result<RangeReport, ValidationError> {
        let range = RangeQuery::new(params.from, params.to)?;
        let registry = self.registry();
        Ok(range_report(&registry, range, now))
    }

    pub fn reset(&self, now: EpochMillis) -> ResetAck {
        let devices_cleared = self.registry().reset();
        tracing::warn!(devices_cleared, "Reset all device data");
        ResetAck {
            success: true,
            message: "All data has been reset".to_string(),
            timestamp: now,
            devices_cleared,
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "online".to_string(),
            devices: self.registry().device_names(),
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Converts a validated wire report into the core's typed report.
pub fn pin_report_from_envelope(envelope: &PinReportEnvelope) -> PinReport {
    let level = |value: Option<u8>| PinLevel::from(value == Some(1));
    PinReport {
        device: envelope.name.clone().unwrap_or_default(),
        pins: PinSnapshot::new(
            level(envelope.pin2),
            level(envelope.pin3),
            level(envelope.pin4),
        ),
        on_time_ms: envelope.on_time_ms(),
    }
}
