// Device message type definitions
// Packets sent from the dashboard client to the guide-camera device

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Commands understood by the device, tagged by `packet_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "packet_type", rename_all = "snake_case")]
pub enum DeviceCommand {
    /// Update one or more device settings
    Settings { settings: Map<String, Value> },

    /// Guider control (start, stop, calibrate, ...)
    GuideCmd { cmd: Value },

    /// Intervalometer control
    IntervalometerCmd { cmd: Value },

    /// Miscellaneous named command
    MiscCmd { cmd: String },
}

impl DeviceCommand {
    /// Settings packet carrying a single key
    pub fn setting(name: &str, value: Value) -> Self {
        let mut settings = Map::new();
        settings.insert(name.to_string(), value);
        DeviceCommand::Settings { settings }
    }
}

/// Request for the device to push back a named file (`pkt_type` is always "fetch")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub pkt_type: String,
    pub shortname: String,
    pub filename: String,
    /// Client time, seconds since 2000-01-01 UTC
    pub time: f64,
}

impl FetchRequest {
    pub fn new(shortname: &str, filename: &str, time: f64) -> Self {
        FetchRequest {
            pkt_type: "fetch".to_string(),
            shortname: shortname.to_string(),
            filename: filename.to_string(),
            time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialize_settings() {
        let msg = DeviceCommand::setting("gain", json!(16));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"packet_type\":\"settings\""));
        assert!(json.contains("\"settings\":{\"gain\":16}"));
    }

    #[test]
    fn test_serialize_commands() {
        let msg = DeviceCommand::GuideCmd { cmd: json!(1) };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"packet_type": "guide_cmd", "cmd": 1})
        );

        let msg = DeviceCommand::IntervalometerCmd { cmd: json!(0) };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"packet_type": "intervalometer_cmd", "cmd": 0})
        );

        let msg = DeviceCommand::MiscCmd { cmd: "reboot".to_string() };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"packet_type": "misc_cmd", "cmd": "reboot"})
        );
    }

    #[test]
    fn test_deserialize_settings() {
        let json = r#"{"packet_type": "settings", "settings": {"use_leds": false, "rand_id": 7}}"#;
        let msg: DeviceCommand = serde_json::from_str(json).unwrap();
        match msg {
            DeviceCommand::Settings { settings } => {
                assert_eq!(settings.get("use_leds"), Some(&json!(false)));
                assert_eq!(settings.get("rand_id"), Some(&json!(7)));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_serialize_fetch() {
        let msg = FetchRequest::new("hotpixels", "hotpixels.txt", 12.5);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"pkt_type": "fetch", "shortname": "hotpixels", "filename": "hotpixels.txt", "time": 12.5})
        );
    }
}
