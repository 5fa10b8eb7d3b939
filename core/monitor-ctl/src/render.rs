//! Human-readable output and argument parsing for report times.

use chrono::{NaiveDateTime, TimeZone};
use cnc_daemon_protocol::{HealthStatus, ResetAck};
use monitor_core::{DeviceSnapshot, EpochMillis, RangeReport};
use std::collections::BTreeMap;
use std::fmt::Write;

const DAY_MILLIS: EpochMillis = 24 * 60 * 60 * 1000;
const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Seconds as `HH:MM:SS`. Hours are not wrapped.
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Parses a report bound: epoch milliseconds, or a wall-clock datetime
/// (`YYYY-MM-DDTHH:MM[:SS]`) read in `tz`. Ambiguous local times resolve to
/// the earlier instant.
pub fn parse_time_arg<Tz: TimeZone>(value: &str, tz: &Tz) -> Result<EpochMillis, String> {
    let trimmed = value.trim();
    if let Ok(millis) = trimmed.parse::<EpochMillis>() {
        return Ok(millis);
    }

    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| {
            format!(
                "expected epoch milliseconds or YYYY-MM-DDTHH:MM[:SS], got {:?}",
                value
            )
        })?;

    tz.from_local_datetime(&naive)
        .earliest()
        .map(|instant| instant.timestamp_millis())
        .ok_or_else(|| format!("{} does not exist in the local time zone", trimmed))
}

/// Resolves optional bounds; a missing `to` is `now` and a missing `from`
/// is 24 hours before `to`.
pub fn resolve_range(
    from: Option<EpochMillis>,
    to: Option<EpochMillis>,
    now: EpochMillis,
) -> (EpochMillis, EpochMillis) {
    let to = to.unwrap_or(now);
    let from = from.unwrap_or(to - DAY_MILLIS);
    (from, to)
}

fn activity(device: &DeviceSnapshot) -> &'static str {
    if device.manufacturing_active {
        "manufacturing"
    } else if device.idle_active {
        "idle"
    } else {
        "-"
    }
}

pub fn device_table(devices: &BTreeMap<String, DeviceSnapshot>) -> String {
    if devices.is_empty() {
        return "No devices reported yet.\n".to_string();
    }

    let width = name_width(devices.keys());
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:<13}  {:<7}  {:>9}  {:>5}  {:>5}  {:>8}  {:>7}  {}",
        "DEVICE", "STATE", "SPINDLE", "SPINDLE T", "PARTS", "IDLE", "ON SHIFT", "EFF %", "SHIFT",
    );
    for (name, device) in devices {
        let _ = writeln!(
            out,
            "{:<width$}  {:<13}  {:<7}  {:>9}  {:>5}  {:>5}  {:>8}  {:>7.2}  {}",
            name,
            activity(device),
            if device.spindle.is_high() { "on" } else { "off" },
            format_hms(device.spindle_time),
            device.parts.len(),
            device.idle_runs.len(),
            format_hms(device.total_shift_on_seconds),
            device.efficiency_percent,
            device.shift_name.as_str(),
        );
    }
    out
}

pub fn report_table(report: &RangeReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Range {} .. {}", report.from, report.to);
    if report.devices.is_empty() {
        out.push_str("No devices reported yet.\n");
        return out;
    }

    let width = name_width(report.devices.keys());
    let _ = writeln!(
        out,
        "{:<width$}  {:>13}  {:>9}  {:>9}  {:>7}",
        "DEVICE", "MANUFACTURING", "IDLE", "TOTAL ON", "EFF %",
    );
    for (name, summary) in &report.devices {
        let _ = writeln!(
            out,
            "{:<width$}  {:>13}  {:>9}  {:>9}  {:>7.2}",
            name,
            format_hms(summary.manufacturing_seconds),
            format_hms(summary.idle_seconds),
            format_hms(summary.total_on_seconds),
            summary.efficiency_percent,
        );
    }
    out
}

pub fn health_line(health: &HealthStatus) -> String {
    format!(
        "daemon {} (v{}, protocol {}, pid {}), up {}, {} device(s)\n",
        health.status,
        health.version,
        health.protocol_version,
        health.pid,
        format_hms(health.uptime_secs.max(0.0) as u64),
        health.devices.len()
    )
}

pub fn reset_line(ack: &ResetAck) -> String {
    format!("{} ({} device(s) cleared)\n", ack.message, ack.devices_cleared)
}

fn name_width<'a>(names: impl Iterator<Item = &'a String>) -> usize {
    names.map(|name| name.chars().count()).max().unwrap_or(0).max("DEVICE".len())
}
