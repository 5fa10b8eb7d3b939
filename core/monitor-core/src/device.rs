//! Per-device state machine.
//!
//! Each report drives two independent trackers:
//!
//! - **Spindle** (`pin2`): rising edges open a spindle run when at least the
//!   debounce interval has passed since the last *accepted* rising edge.
//!   Falling edges always close the run; runs of at least one second are
//!   added to the accumulated spindle time.
//! - **Manufacturing / idle** (`pin3`): exactly one of the two runs is open at
//!   any time. A rising edge, gated by the debounce interval since the last
//!   *raw* edge, closes idle and opens manufacturing. A falling edge always
//!   closes manufacturing and opens idle at the same instant.
//!
//! Closed runs shorter than one second are noise: they are not appended, and
//! the run that replaces them starts where the discarded run started, so the
//! two ledgers always tile the timeline from the first report onward.
//!
//! The successor is therefore backdated by up to 999 ms and inherits that
//! time under its own label. Idle at `t`, rising at `t+900` and falling at
//! `t+2500` records manufacturing `[t, t+2500)` of 2 s, not `[t+900, t+2500)`
//! of 1 s.

use serde::Serialize;
use tracing::{debug, info};

use crate::interval::{overlap_seconds, whole_seconds, EpochMillis, TimeInterval, MIN_RUN_SECONDS};
use crate::types::{PinLevel, PinReport, PinSnapshot};

pub const DEFAULT_DEBOUNCE_MS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub debounce_ms: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// State changes produced by one report, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    SpindleOn,
    /// `duration` is `None` when the spindle run was shorter than a second.
    SpindleOff { duration: Option<u64> },
    ManufacturingStart { at: EpochMillis },
    /// `run` is `None` when the run was discarded as noise.
    ManufacturingEnd { run: Option<TimeInterval> },
    IdleStart { at: EpochMillis },
    IdleEnd { run: Option<TimeInterval> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DebounceGate {
    last: Option<EpochMillis>,
}

impl DebounceGate {
    fn allows(&self, now: EpochMillis, debounce_ms: i64) -> bool {
        self.last
            .map(|last| now - last >= debounce_ms)
            .unwrap_or(true)
    }

    fn mark(&mut self, now: EpochMillis) {
        self.last = Some(now);
    }
}

enum Closed {
    Appended(TimeInterval),
    Discarded { started_at: EpochMillis },
}

/// One open-or-closed run tracker with its append-only history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RunLedger {
    started_at: Option<EpochMillis>,
    runs: Vec<TimeInterval>,
}

impl RunLedger {
    fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    fn open(&mut self, at: EpochMillis) {
        self.started_at = Some(at);
    }

    fn close(&mut self, now: EpochMillis) -> Option<Closed> {
        let started_at = self.started_at.take()?;
        match TimeInterval::closed(started_at, now) {
            Some(run) => {
                self.runs.push(run);
                Some(Closed::Appended(run))
            }
            None => Some(Closed::Discarded { started_at }),
        }
    }

    fn seconds_within(&self, from: EpochMillis, to: EpochMillis, now: EpochMillis) -> u64 {
        let closed: u64 = self.runs.iter().map(|run| run.overlap_with(from, to)).sum();
        let open = self
            .started_at
            .map(|start| overlap_seconds(start, now, from, to))
            .unwrap_or(0);
        closed + open
    }
}

/// Why a device timeline failed its consistency check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineIssue {
    #[error("manufacturing and idle runs are both {0}")]
    OpenRunCount(&'static str),
    #[error("run {start}..{end} is malformed")]
    MalformedRun { start: EpochMillis, end: EpochMillis },
    #[error("runs overlap at {at}")]
    Overlap { at: EpochMillis },
    #[error("gap between {from} and {to}")]
    Gap { from: EpochMillis, to: EpochMillis },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    name: String,
    first_report_at: EpochMillis,

    spindle_on: bool,
    spindle_started_at: Option<EpochMillis>,
    spindle_accumulated_seconds: u64,
    spindle_gate: DebounceGate,

    manufacturing: RunLedger,
    idle: RunLedger,
    manufacturing_gate: DebounceGate,

    last_pins: PinSnapshot,
    powered_on_seconds: u64,
    last_report_at: EpochMillis,
}

impl DeviceState {
    /// Creates state for a device seen for the first time. A device whose
    /// manufacturing pin is low is idle from this instant; a high pin is
    /// handled as a rising edge by the following [`DeviceState::apply`].
    pub fn first_seen(name: &str, report: &PinReport, now: EpochMillis) -> Self {
        let mut state = Self {
            name: name.to_string(),
            first_report_at: now,
            spindle_on: false,
            spindle_started_at: None,
            spindle_accumulated_seconds: 0,
            spindle_gate: DebounceGate::default(),
            manufacturing: RunLedger::default(),
            idle: RunLedger::default(),
            manufacturing_gate: DebounceGate::default(),
            last_pins: PinSnapshot::default(),
            powered_on_seconds: 0,
            last_report_at: now,
        };

        info!(device = %name, "Device registered");
        if !report.pins.manufacturing().is_high() {
            state.idle.open(now);
            info!(device = %name, "Idle start (device connected with pin3 low)");
        }
        state
    }

    /// Applies one report observed at `now`. Reports whose pins match the
    /// previous report only refresh bookkeeping fields.
    pub fn apply(&mut self, report: &PinReport, now: EpochMillis, config: &TrackerConfig) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let previous = self.last_pins;

        self.track_spindle(previous.spindle(), report.pins.spindle(), now, config, &mut transitions);
        self.track_manufacturing(
            previous.manufacturing(),
            report.pins.manufacturing(),
            now,
            config,
            &mut transitions,
        );

        if let Some(seconds) = report.powered_on_seconds() {
            self.powered_on_seconds = seconds;
        }
        self.last_pins = report.pins;
        self.last_report_at = now;

        transitions
    }

    fn track_spindle(
        &mut self,
        previous: PinLevel,
        current: PinLevel,
        now: EpochMillis,
        config: &TrackerConfig,
        transitions: &mut Vec<Transition>,
    ) {
        if current.rose_from(previous) && self.spindle_gate.allows(now, config.debounce_ms) {
            self.spindle_on = true;
            self.spindle_started_at = Some(now);
            self.spindle_gate.mark(now);
            info!(device = %self.name, "Spindle on");
            transitions.push(Transition::SpindleOn);
        }

        if current.fell_from(previous) {
            if let Some(started_at) = self.spindle_started_at.take() {
                self.spindle_on = false;
                let seconds = whole_seconds(started_at, now);
                let duration = if seconds >= MIN_RUN_SECONDS {
                    self.spindle_accumulated_seconds += seconds;
                    info!(device = %self.name, duration_secs = seconds, "Spindle off");
                    Some(seconds)
                } else {
                    debug!(device = %self.name, "Spindle run under a second dropped");
                    None
                };
                transitions.push(Transition::SpindleOff { duration });
            }
        }
    }

    fn track_manufacturing(
        &mut self,
        previous: PinLevel,
        current: PinLevel,
        now: EpochMillis,
        config: &TrackerConfig,
        transitions: &mut Vec<Transition>,
    ) {
        if current.rose_from(previous) && self.manufacturing_gate.allows(now, config.debounce_ms) {
            let start = match self.idle.close(now) {
                Some(Closed::Appended(run)) => {
                    info!(device = %self.name, duration_secs = run.duration, "Idle end");
                    transitions.push(Transition::IdleEnd { run: Some(run) });
                    now
                }
                Some(Closed::Discarded { started_at }) => {
                    debug!(device = %self.name, "Idle run under a second absorbed into manufacturing");
                    transitions.push(Transition::IdleEnd { run: None });
                    started_at
                }
                None => now,
            };
            self.manufacturing.open(start);
            self.manufacturing_gate.mark(now);
            info!(device = %self.name, "Manufacturing start");
            transitions.push(Transition::ManufacturingStart { at: start });
        }

        if current.fell_from(previous) && self.manufacturing.is_active() {
            let start = match self.manufacturing.close(now) {
                Some(Closed::Appended(run)) => {
                    info!(device = %self.name, duration_secs = run.duration, "Manufacturing end");
                    transitions.push(Transition::ManufacturingEnd { run: Some(run) });
                    now
                }
                Some(Closed::Discarded { started_at }) => {
                    debug!(device = %self.name, "Manufacturing run under a second absorbed into idle");
                    transitions.push(Transition::ManufacturingEnd { run: None });
                    started_at
                }
                None => now,
            };
            self.manufacturing_gate.mark(now);
            self.idle.open(start);
            info!(device = %self.name, "Idle start");
            transitions.push(Transition::IdleStart { at: start });
        }
    }

    /// Manufacturing and idle seconds inside `[from, to)`, counting open runs
    /// up to `now`.
    pub fn seconds_within(&self, from: EpochMillis, to: EpochMillis, now: EpochMillis) -> (u64, u64) {
        (
            self.manufacturing.seconds_within(from, to, now),
            self.idle.seconds_within(from, to, now),
        )
    }

    /// Verifies that exactly one run is open and that closed runs are well
    /// formed, ordered, and contiguous from the first report up to the open run.
    pub fn check_timeline(&self) -> Result<(), TimelineIssue> {
        match (self.manufacturing.is_active(), self.idle.is_active()) {
            (true, true) => return Err(TimelineIssue::OpenRunCount("open")),
            (false, false) => return Err(TimelineIssue::OpenRunCount("closed")),
            _ => {}
        }

        let mut runs: Vec<TimeInterval> = self
            .manufacturing
            .runs
            .iter()
            .chain(self.idle.runs.iter())
            .copied()
            .collect();
        runs.sort_by_key(|run| run.start);

        let mut cursor = self.first_report_at;
        for run in &runs {
            if !run.is_well_formed() {
                return Err(TimelineIssue::MalformedRun {
                    start: run.start,
                    end: run.end,
                });
            }
            if run.start < cursor {
                return Err(TimelineIssue::Overlap { at: run.start });
            }
            if run.start > cursor {
                return Err(TimelineIssue::Gap {
                    from: cursor,
                    to: run.start,
                });
            }
            cursor = run.end;
        }

        let open_start = self
            .manufacturing
            .started_at
            .or(self.idle.started_at)
            .unwrap_or(cursor);
        if open_start < cursor {
            return Err(TimelineIssue::Overlap { at: open_start });
        }
        if open_start > cursor {
            return Err(TimelineIssue::Gap {
                from: cursor,
                to: open_start,
            });
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_report_at(&self) -> EpochMillis {
        self.first_report_at
    }

    pub fn spindle_on(&self) -> bool {
        self.spindle_on
    }

    pub fn spindle_started_at(&self) -> Option<EpochMillis> {
        self.spindle_started_at
    }

    pub fn spindle_accumulated_seconds(&self) -> u64 {
        self.spindle_accumulated_seconds
    }

    pub fn manufacturing_active(&self) -> bool {
        self.manufacturing.is_active()
    }

    pub fn manufacturing_started_at(&self) -> Option<EpochMillis> {
        self.manufacturing.started_at
    }

    pub fn manufacturing_runs(&self) -> &[TimeInterval] {
        &self.manufacturing.runs
    }

    pub fn idle_active(&self) -> bool {
        self.idle.is_active()
    }

    pub fn idle_started_at(&self) -> Option<EpochMillis> {
        self.idle.started_at
    }

    pub fn idle_runs(&self) -> &[TimeInterval] {
        &self.idle.runs
    }

    pub fn last_pins(&self) -> PinSnapshot {
        self.last_pins
    }

    pub fn powered_on_seconds(&self) -> u64 {
        self.powered_on_seconds
    }

    pub fn last_report_at(&self) -> EpochMillis {
        self.last_report_at
    }
}
