use crate::types::{Device, DeviceState, EnvironmentReading, Reported, SystemSnapshot};

// Temperature conversion.
fn c_to_f(c: f64) -> f64 {
    c * 1.8 + 32.0
}

fn format_reading(r: &EnvironmentReading) -> String {
    format!(
        "{:.1}C/{:.1}F, {:.0}% humidity",
        r.temperature,
        c_to_f(r.temperature),
        r.humidity
    )
}

// Values the sensor node sent in an unexpected shape are shown as raw json.
fn format_reported_reading(r: &Reported<EnvironmentReading>) -> String {
    match r {
        Reported::Valid(reading) => format_reading(reading),
        Reported::Raw(raw) => format!("{raw} (raw)"),
    }
}

fn format_device(r: &Reported<DeviceState>) -> String {
    match r {
        Reported::Valid(state) => format!(
            "{} ({})",
            if state.status { "on" } else { "off" },
            if state.manual { "manual" } else { "auto" },
        ),
        Reported::Raw(raw) => format!("{raw} (raw)"),
    }
}

pub fn print_snapshot(snap: &SystemSnapshot) {
    println!("{}", format_snapshot(snap));
}

pub fn format_snapshot(snap: &SystemSnapshot) -> String {
    let mut lines = vec![
        format!("Indoor:   {}", format_reported_reading(&snap.indoor)),
        format!("Outdoor:  {}", format_reading(&snap.outdoor)),
        format!("Light:    {}", snap.light_level),
        format!("Motion:   {}", snap.motion),
        format!("Wifi:     {}", snap.wifi),
    ];
    match &snap.last_update {
        Some(ts) => lines.push(format!("Updated:  {ts}")),
        None => lines.push("Updated:  <no sensor data yet>".to_string()),
    }
    for device in Device::ALL {
        lines.push(format!(
            "{:<9} {}",
            format!("{device}:"),
            format_device(snap.devices.get(device))
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod format_snapshot {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_snapshot() {
        let mut snap = SystemSnapshot::default();
        snap.indoor = Reported::Valid(EnvironmentReading {
            temperature: 25.0,
            humidity: 60.0,
        });
        snap.devices.ac = Reported::Valid(DeviceState {
            status: true,
            manual: true,
        });
        let text = super::format_snapshot(&snap);
        assert!(text.contains("Indoor:   25.0C/77.0F, 60% humidity"));
        assert!(text.contains("Updated:  <no sensor data yet>"));
        assert!(text.contains("fan:      off (auto)"));
        assert!(text.contains("ac:       on (manual)"));
    }

    #[test]
    fn raw_values() {
        let mut snap = SystemSnapshot::default();
        snap.light_level = Reported::Raw(json!("bright"));
        snap.devices.light = Reported::Raw(json!(null));
        let text = super::format_snapshot(&snap);
        assert!(text.contains("Light:    \"bright\""));
        assert!(text.contains("light:    null (raw)"));
    }
}
