//! Device registry: device name → [`DeviceState`].
//!
//! The registry is an ordinary owned value. The daemon wraps it in a `Mutex`
//! so every ingest and query runs against a consistent view.

use std::collections::BTreeMap;

use crate::device::{DeviceState, TrackerConfig, Transition};
use crate::error::{Result, ValidationError};
use crate::interval::EpochMillis;
use crate::types::PinReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// True when this report registered a new device.
    pub created: bool,
    pub transitions: Vec<Transition>,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceState>,
    config: TrackerConfig,
}

impl DeviceRegistry {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            devices: BTreeMap::new(),
            config,
        }
    }

    /// Applies one report observed at `now`, registering the device on first
    /// sight. Rejected reports leave the registry untouched.
    pub fn ingest(&mut self, report: &PinReport, now: EpochMillis) -> Result<IngestOutcome> {
        if report.device.trim().is_empty() {
            return Err(ValidationError::MissingDeviceName);
        }

        let mut created = false;
        let device = self
            .devices
            .entry(report.device.clone())
            .or_insert_with(|| {
                created = true;
                DeviceState::first_seen(&report.device, report, now)
            });
        let transitions = device.apply(report, now, &self.config);

        Ok(IngestOutcome {
            created,
            transitions,
        })
    }

    pub fn get(&self, name: &str) -> Option<&DeviceState> {
        self.devices.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceState)> {
        self.devices
            .iter()
            .map(|(name, device)| (name.as_str(), device))
    }

    pub fn device_names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Drops every device. Returns how many were cleared.
    pub fn reset(&mut self) -> usize {
        let cleared = self.devices.len();
        self.devices.clear();
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PinLevel, PinSnapshot};

    const T0: EpochMillis = 1_767_258_000_000;

    fn report(name: &str, pin3: PinLevel) -> PinReport {
        PinReport::new(name, PinSnapshot::new(PinLevel::Low, pin3, PinLevel::Low))
    }

    #[test]
    fn first_report_creates_device_once() {
        let mut registry = DeviceRegistry::default();

        let first = registry.ingest(&report("lathe", PinLevel::Low), T0).unwrap();
        let second = registry
            .ingest(&report("lathe", PinLevel::Low), T0 + 1_000)
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("lathe").unwrap().first_report_at(), T0);
    }

    #[test]
    fn rejects_blank_device_name_without_side_effects() {
        let mut registry = DeviceRegistry::default();
        assert_eq!(
            registry.ingest(&report("", PinLevel::High), T0),
            Err(ValidationError::MissingDeviceName)
        );
        assert_eq!(
            registry.ingest(&report("   ", PinLevel::High), T0),
            Err(ValidationError::MissingDeviceName)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn devices_are_tracked_independently() {
        let mut registry = DeviceRegistry::default();
        registry.ingest(&report("a", PinLevel::Low), T0).unwrap();
        registry.ingest(&report("b", PinLevel::High), T0).unwrap();

        assert!(registry.get("a").unwrap().idle_active());
        assert!(registry.get("b").unwrap().manufacturing_active());
        assert_eq!(registry.device_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unknown_device_is_absent() {
        let registry = DeviceRegistry::default();
        assert!(registry.get("ghost").is_none());
    }

    #[test]
    fn reset_drops_all_devices() {
        let mut registry = DeviceRegistry::default();
        registry.ingest(&report("a", PinLevel::Low), T0).unwrap();
        registry.ingest(&report("b", PinLevel::Low), T0).unwrap();

        assert_eq!(registry.reset(), 2);
        assert!(registry.is_empty());

        let outcome = registry.ingest(&report("a", PinLevel::Low), T0 + 5_000).unwrap();
        assert!(outcome.created);
        assert_eq!(registry.get("a").unwrap().first_report_at(), T0 + 5_000);
    }

    #[test]
    fn configured_debounce_is_applied() {
        let mut registry = DeviceRegistry::new(TrackerConfig { debounce_ms: 2_000 });
        registry.ingest(&report("a", PinLevel::Low), T0).unwrap();
        registry.ingest(&report("a", PinLevel::High), T0 + 3_000).unwrap();
        registry.ingest(&report("a", PinLevel::Low), T0 + 4_500).unwrap();
        registry.ingest(&report("a", PinLevel::High), T0 + 5_500).unwrap();

        let device = registry.get("a").unwrap();
        assert!(device.idle_active());
        assert_eq!(device.manufacturing_runs().len(), 1);
    }
}
