use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const FAN: &str = "fan";
pub const AC: &str = "ac";
pub const LIGHT: &str = "light";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentReading {
    // Temperature in degrees Celsius
    pub temperature: f64,
    // Relative humidity in percent (0-100)
    pub humidity: f64,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct DeviceState {
    pub status: bool,
    // true while a user-issued on/off command overrides the automatic controller
    pub manual: bool,
}

impl DeviceState {
    pub fn apply(&mut self, action: DeviceAction) {
        match action {
            DeviceAction::On => {
                self.status = true;
                self.manual = true;
            }
            DeviceAction::Off => {
                self.status = false;
                self.manual = true;
            }
            // status stays at its last known value until the automatic
            // controller reports a new one through ingest.
            DeviceAction::Auto => self.manual = false,
        }
    }
}

// A value pushed by the sensor node. The relay doesn't validate what the node
// sends: anything that doesn't have the expected shape (a string where a
// number belongs, null, an object with extra keys) is kept and served back
// verbatim.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum Reported<T> {
    Valid(T),
    Raw(serde_json::Value),
}

impl<T: Default> Default for Reported<T> {
    fn default() -> Self {
        Reported::Valid(T::default())
    }
}

impl<T: Eq> Eq for Reported<T> {}

impl<T> Reported<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            Reported::Valid(v) => Some(v),
            Reported::Raw(_) => None,
        }
    }
}

impl<T: serde::de::DeserializeOwned> Reported<T> {
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(v) => Reported::Valid(v),
            Err(_) => Reported::Raw(value),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Reported<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reported::Valid(v) => fmt::Display::fmt(v, f),
            Reported::Raw(raw) => write!(f, "{raw}"),
        }
    }
}

impl Reported<DeviceState> {
    // A device entry the node sent in some other shape still gets switched:
    // an object has its status/manual keys set, anything else is replaced.
    pub fn apply(&mut self, action: DeviceAction) {
        let mut map = match self {
            Reported::Valid(state) => {
                state.apply(action);
                return;
            }
            Reported::Raw(serde_json::Value::Object(map)) => std::mem::take(map),
            Reported::Raw(_) => serde_json::Map::new(),
        };
        match action {
            DeviceAction::On | DeviceAction::Off => {
                map.insert("status".into(), (action == DeviceAction::On).into());
                map.insert("manual".into(), true.into());
            }
            DeviceAction::Auto => {
                map.insert("manual".into(), false.into());
            }
        }
        *self = Reported::from_value(serde_json::Value::Object(map));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Device {
    Fan,
    Ac,
    Light,
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Fan, Device::Ac, Device::Light];

    pub fn name(&self) -> &'static str {
        match self {
            Device::Fan => FAN,
            Device::Ac => AC,
            Device::Light => LIGHT,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Device {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            FAN => Ok(Device::Fan),
            AC => Ok(Device::Ac),
            LIGHT => Ok(Device::Light),
            _ => Err(ControlError::UnknownDevice),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceAction {
    On,
    Off,
    // Hand the device back to the automatic controller.
    Auto,
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceAction::On => "on",
            DeviceAction::Off => "off",
            DeviceAction::Auto => "auto",
        };
        f.write_str(s)
    }
}

impl FromStr for DeviceAction {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(DeviceAction::On),
            "off" => Ok(DeviceAction::Off),
            "auto" => Ok(DeviceAction::Auto),
            _ => Err(ControlError::InvalidAction),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum ControlError {
    #[error("Unknown device")]
    UnknownDevice,
    #[error("Invalid action")]
    InvalidAction,
}

// One slot per device. The key set is fixed, so it is a struct rather than a
// map.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct Devices {
    pub fan: Reported<DeviceState>,
    pub ac: Reported<DeviceState>,
    pub light: Reported<DeviceState>,
}

impl Devices {
    pub fn get(&self, device: Device) -> &Reported<DeviceState> {
        match device {
            Device::Fan => &self.fan,
            Device::Ac => &self.ac,
            Device::Light => &self.light,
        }
    }

    pub fn get_mut(&mut self, device: Device) -> &mut Reported<DeviceState> {
        match device {
            Device::Fan => &mut self.fan,
            Device::Ac => &mut self.ac,
            Device::Light => &mut self.light,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub indoor: Reported<EnvironmentReading>,
    pub outdoor: EnvironmentReading,
    pub light_level: Reported<f64>,
    pub motion: Reported<bool>,
    pub wifi: Reported<bool>,
    // None until the first ingest. Serialized as "" in that case.
    #[serde(with = "last_update_format")]
    pub last_update: Option<Timestamp>,
    pub devices: Devices,
}

impl Default for SystemSnapshot {
    fn default() -> Self {
        Self {
            indoor: Reported::default(),
            outdoor: EnvironmentReading::default(),
            light_level: Reported::Valid(0.0),
            motion: Reported::Valid(false),
            wifi: Reported::Valid(true),
            last_update: None,
            devices: Devices::default(),
        }
    }
}

mod last_update_format {
    use jiff::Timestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.collect_str(ts),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

// Body of a sensor node push. Every field is optional; a field that is present,
// even as null, replaces the corresponding snapshot field wholesale.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IngestPayload {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub indoor: Option<Reported<EnvironmentReading>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub light_level: Option<Reported<f64>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub motion: Option<Reported<bool>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub wifi: Option<Reported<bool>>,
    // Raw when the node sent something other than an object. The store drops
    // that rather than lose the fan/ac/light slots.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub devices: Option<Reported<DevicesUpdate>>,
}

// The devices section of an ingest payload. Each device entry that is present
// replaces that device's state; unrecognized keys end up in `unknown` and are
// dropped by the store.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DevicesUpdate {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub fan: Option<Reported<DeviceState>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub ac: Option<Reported<DeviceState>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub light: Option<Reported<DeviceState>>,
    #[serde(flatten, skip_serializing_if = "HashMap::is_empty")]
    pub unknown: HashMap<String, serde_json::Value>,
}

impl DevicesUpdate {
    pub fn take(&mut self, device: Device) -> Option<Reported<DeviceState>> {
        match device {
            Device::Fan => self.fan.take(),
            Device::Ac => self.ac.take(),
            Device::Light => self.light.take(),
        }
    }
}

// Plain Option<T> would turn an explicit null into None. A key that is present
// always yields Some; absent keys fall back to the field default.
fn present<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(d).map(Some)
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("payload must be a JSON object")]
    NotAnObject,
}

impl IngestPayload {
    // Parses a raw request body. The body has to be a JSON object; the values
    // inside it are taken as they come.
    pub fn from_slice(body: &[u8]) -> Result<Self, IngestError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(IngestError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod device {
    use super::*;

    #[test]
    fn parse_names() {
        assert_eq!("fan".parse(), Ok(Device::Fan));
        assert_eq!("ac".parse(), Ok(Device::Ac));
        assert_eq!("light".parse(), Ok(Device::Light));
        assert_eq!("heater".parse::<Device>(), Err(ControlError::UnknownDevice));
        assert_eq!("Fan".parse::<Device>(), Err(ControlError::UnknownDevice));
    }

    #[test]
    fn parse_actions() {
        assert_eq!("on".parse(), Ok(DeviceAction::On));
        assert_eq!("off".parse(), Ok(DeviceAction::Off));
        assert_eq!("auto".parse(), Ok(DeviceAction::Auto));
        assert_eq!(
            "toggle".parse::<DeviceAction>(),
            Err(ControlError::InvalidAction)
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(ControlError::UnknownDevice.to_string(), "Unknown device");
        assert_eq!(ControlError::InvalidAction.to_string(), "Invalid action");
    }
}

#[cfg(test)]
mod snapshot_json {
    use super::*;

    #[test]
    fn default_snapshot_shape() {
        let v = serde_json::to_value(SystemSnapshot::default()).unwrap();
        assert_eq!(v["lastUpdate"], "");
        assert_eq!(v["lightLevel"], 0.0);
        assert_eq!(v["wifi"], true);
        let devices = v["devices"].as_object().unwrap();
        let mut keys: Vec<&String> = devices.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["ac", "fan", "light"]);
        assert_eq!(
            v["devices"]["fan"],
            serde_json::json!({"status": false, "manual": false})
        );
    }

    #[test]
    fn last_update_survives_json() {
        let mut snap = SystemSnapshot::default();
        snap.last_update = Some("2024-06-01T12:30:00Z".parse().unwrap());
        let text = serde_json::to_string(&snap).unwrap();
        assert!(text.contains("\"lastUpdate\":\"2024-06-01T12:30:00Z\""));
        let back: SystemSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snap);
    }
}
