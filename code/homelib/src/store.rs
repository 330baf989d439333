use crate::types::{
    ControlError, Device, DeviceAction, EnvironmentReading, IngestPayload, Reported,
    SystemSnapshot,
};
use jiff::Timestamp;
use std::sync::{Mutex, MutexGuard};

// The StateStore owns the one SystemSnapshot shared by every handler. All
// reads and writes go through a single mutex and each operation holds it for
// its whole duration, so readers never see a half-applied update. Callers must
// not hold on to the store while doing network I/O; every method takes and
// releases the lock internally.
pub struct StateStore {
    snapshot: Mutex<SystemSnapshot>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_snapshot(SystemSnapshot::default())
    }

    pub fn with_snapshot(snapshot: SystemSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    // A panic while holding the lock can only happen between whole-field
    // assignments, so the data behind a poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, SystemSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        self.lock().clone()
    }

    // Merge a sensor node push. Each field present in the payload replaces the
    // current value wholesale; absent fields are left alone. lastUpdate is
    // always bumped.
    pub fn merge_ingest(&self, payload: IngestPayload) -> Timestamp {
        let mut snap = self.lock();

        if let Some(indoor) = payload.indoor {
            snap.indoor = indoor;
        }
        if let Some(light_level) = payload.light_level {
            snap.light_level = light_level;
        }
        if let Some(motion) = payload.motion {
            snap.motion = motion;
        }
        if let Some(wifi) = payload.wifi {
            snap.wifi = wifi;
        }
        match payload.devices {
            Some(Reported::Valid(mut devices)) => {
                for device in Device::ALL {
                    if let Some(state) = devices.take(device) {
                        *snap.devices.get_mut(device) = state;
                    }
                }
                for name in devices.unknown.keys() {
                    log::warn!("Ignoring state for unknown device '{name}' in ingest payload");
                }
            }
            // Taking this wholesale would lose the fan/ac/light slots.
            Some(Reported::Raw(raw)) => {
                log::warn!("Ignoring devices in ingest payload, expected an object: {raw}");
            }
            None => {}
        }

        let now = Timestamp::now();
        snap.last_update = Some(now);
        now
    }

    // Only called with the result of a successful weather fetch.
    pub fn merge_outdoor(&self, reading: EnvironmentReading) {
        self.lock().outdoor = reading;
    }

    // Validates the device and action names and applies the action. The device
    // is checked first, so a request with both an unknown device and an invalid
    // action reports the unknown device. Returns the snapshot as it was right
    // after the change.
    pub fn apply_device_action(
        &self,
        device_id: &str,
        action: &str,
    ) -> Result<SystemSnapshot, ControlError> {
        let device: Device = device_id.parse()?;
        let action: DeviceAction = action.parse()?;
        Ok(self.apply(device, action))
    }

    pub fn apply(&self, device: Device, action: DeviceAction) -> SystemSnapshot {
        let mut snap = self.lock();
        snap.devices.get_mut(device).apply(action);
        snap.clone()
    }
}
