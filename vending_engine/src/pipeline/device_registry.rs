use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;

use crate::vm_types::{DeviceRecord, DeviceView, MachineCode, StateReport};

/// Live state of every device that has reported in.
///
/// Updates are last-write-wins in the order they are applied, so callers must apply messages for a given device in
/// arrival order. Records are only removed through [`DeviceRegistry::evict`].
#[derive(Debug)]
pub struct DeviceRegistry {
    liveness_window: Duration,
    devices: RwLock<HashMap<MachineCode, DeviceRecord>>,
}

impl DeviceRegistry {
    pub fn new(liveness_window: Duration) -> Self {
        Self { liveness_window, devices: RwLock::new(HashMap::new()) }
    }

    /// Records a heartbeat. Status, temperature and alert are left untouched.
    pub fn ingest_heartbeat(&self, code: &MachineCode, at: DateTime<Utc>) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.get_mut(code) {
            Some(record) => record.last_heartbeat = at,
            None => {
                info!("📟️ New device {code} registered by heartbeat");
                devices.insert(code.clone(), DeviceRecord::new(code.clone(), at));
            },
        }
        trace!("📟️ Heartbeat from {code} at {at}");
    }

    /// Records a full state report. A state report also counts as a heartbeat.
    pub fn ingest_state(&self, report: StateReport, at: DateTime<Utc>) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let code = report.machine_code;
        let record = devices.entry(code.clone()).or_insert_with(|| {
            info!("📟️ New device {code} registered by state report");
            DeviceRecord::new(code.clone(), at)
        });
        record.status = Some(report.status);
        record.temperature = report.temperature;
        record.alert = report.alert;
        record.last_heartbeat = at;
        debug!("📟️ {code} is {} at {:?}°C", report.status, record.temperature);
    }

    /// A consistent view of every device, ordered by machine code, with liveness evaluated at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<DeviceView> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        let mut views = devices.values().map(|r| self.view(r, now)).collect::<Vec<_>>();
        drop(devices);
        views.sort_by(|a, b| a.record.machine_code.cmp(&b.record.machine_code));
        views
    }

    pub fn get(&self, code: &MachineCode, now: DateTime<Utc>) -> Option<DeviceView> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(code).map(|r| self.view(r, now))
    }

    /// Removes a device, e.g. after it has been deleted from the machine inventory. Returns the removed record.
    pub fn evict(&self, code: &MachineCode) -> Option<DeviceRecord> {
        let removed = self.devices.write().unwrap_or_else(PoisonError::into_inner).remove(code);
        if removed.is_some() {
            info!("📟️ Device {code} evicted from the registry");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn view(&self, record: &DeviceRecord, now: DateTime<Utc>) -> DeviceView {
        // A heartbeat stamped after `now` means clocks disagree; treat the device as live
        let is_live = (now - record.last_heartbeat).to_std().map(|age| age < self.liveness_window).unwrap_or(true);
        DeviceView { record: record.clone(), is_live }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(crate::pipeline::config::DEFAULT_LIVENESS_WINDOW)
    }
}
