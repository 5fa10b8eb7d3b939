//! # monitor-core
//!
//! Tracking engine for CNC machine monitoring. Controllers report raw pin
//! levels; this crate turns them into debounced manufacturing/idle runs and
//! derives shift-aligned and arbitrary-range utilization from those runs.
//!
//! ## Design Principles
//!
//! - **Synchronous and I/O-free**: every operation completes immediately.
//! - **Explicit time**: callers capture "now" once per operation and pass it in
//!   as epoch milliseconds, so one ingest or query is internally consistent.
//! - **Not thread-safe**: the owner (the daemon) serializes access with a `Mutex`.
//! - **Single source of truth for shift math**: clients render projections,
//!   they never recompute shift windows.
//!
//! ## Quick Start
//!
//! ```rust
//! use monitor_core::{live_snapshot, DeviceRegistry, PinLevel, PinReport, PinSnapshot, ShiftCalendar};
//! use chrono::Utc;
//!
//! let mut registry = DeviceRegistry::default();
//! let pins = PinSnapshot::new(PinLevel::Low, PinLevel::Low, PinLevel::Low);
//! let t0 = 1_767_260_000_000;
//! registry.ingest(&PinReport::new("lathe-1", pins), t0).unwrap();
//!
//! let shift = ShiftCalendar::default().window_for(&Utc, t0 + 5_000);
//! let snapshot = live_snapshot(&registry, &shift, t0 + 5_000);
//! assert!(snapshot["lathe-1"].idle_active);
//! ```

pub mod device;
pub mod error;
pub mod interval;
pub mod projection;
pub mod registry;
pub mod shift;
pub mod types;

pub use device::{DeviceState, TimelineIssue, TrackerConfig, Transition, DEFAULT_DEBOUNCE_MS};
pub use error::{Result, ValidationError};
pub use interval::{overlap_seconds, whole_seconds, EpochMillis, TimeInterval, MIN_RUN_SECONDS};
pub use projection::{
    live_snapshot, range_report, round_percent, DeviceRangeSummary, DeviceSnapshot, RangeQuery,
    RangeReport,
};
pub use registry::{DeviceRegistry, IngestOutcome};
pub use shift::{InvalidShiftStart, ShiftCalendar, ShiftName, ShiftWindow, SHIFT_SECONDS};
pub use types::{PinLevel, PinReport, PinSnapshot};
