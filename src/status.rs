// Status module - typed view of the telemetry frames pushed by the device
//
// The device sends one JSON object per frame. Fields that are not applicable are
// either omitted or sent as `false`; both are treated as absent here.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::constants::SENSOR_WIDTH;
use crate::mathutils::{calc_rotation_center, move_point_towards, Point, RotationCenter, Vector};
use crate::stars::{parse_stars_str, Star};

/// Deserialize an optional field where the device uses `false` for "not available"
fn false_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => Ok(None),
        other => serde_json::from_value(other).map(Some).map_err(de::Error::custom),
    }
}

/// Guider state machine, as reported in `guider_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideState {
    Idle,
    Guiding,
    Dither,
    Panic,
    CalibratingRa,
    CalibratingDec,
}

impl GuideState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(GuideState::Idle),
            1 => Some(GuideState::Guiding),
            2 => Some(GuideState::Dither),
            3 => Some(GuideState::Panic),
            4 => Some(GuideState::CalibratingRa),
            5 => Some(GuideState::CalibratingDec),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GuideState::Idle => "idle",
            GuideState::Guiding => "guiding",
            GuideState::Dither => "dither",
            GuideState::Panic => "panic",
            GuideState::CalibratingRa => "calibrating RA",
            GuideState::CalibratingDec => "calibrating Dec",
        }
    }
}

/// Intervalometer state machine, as reported in `intervalometer_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalState {
    Idle,
    Active,
    ActiveGap,
    BulbTest,
    Halt,
    Ending,
}

impl IntervalState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(IntervalState::Idle),
            1 => Some(IntervalState::Active),
            2 => Some(IntervalState::ActiveGap),
            3 => Some(IntervalState::BulbTest),
            4 => Some(IntervalState::Halt),
            5 => Some(IntervalState::Ending),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntervalState::Idle => "idle",
            IntervalState::Active => "active",
            IntervalState::ActiveGap => "active (gap)",
            IntervalState::BulbTest => "bulb test",
            IntervalState::Halt => "halt",
            IntervalState::Ending => "ending",
        }
    }
}

/// Exposure quality verdict from the star finder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureCode {
    NoImage,
    TooDark,
    Correct,
    TooBright,
    TooNoisy,
    Movement,
    BigBlob,
    TooManyStars,
    MemoryError,
    CameraError,
    CameraInitializing,
    Unknown(i64),
}

impl ExposureCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            -2 => ExposureCode::NoImage,
            -1 => ExposureCode::TooDark,
            0 => ExposureCode::Correct,
            1 => ExposureCode::TooBright,
            2 => ExposureCode::TooNoisy,
            3 => ExposureCode::Movement,
            4 => ExposureCode::BigBlob,
            5 => ExposureCode::TooManyStars,
            6 => ExposureCode::MemoryError,
            7 => ExposureCode::CameraError,
            8 => ExposureCode::CameraInitializing,
            other => ExposureCode::Unknown(other),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ExposureCode::NoImage => "no image",
            ExposureCode::TooDark => "too dark",
            ExposureCode::Correct => "correct",
            ExposureCode::TooBright => "too bright",
            ExposureCode::TooNoisy => "too noisy",
            ExposureCode::Movement => "movement",
            ExposureCode::BigBlob => "big blob",
            ExposureCode::TooManyStars => "too many stars",
            ExposureCode::MemoryError => "INTERNAL MEMORY ERROR",
            ExposureCode::CameraError => "CAMERA HARDWARE ERROR",
            ExposureCode::CameraInitializing => "camera still initializing",
            ExposureCode::Unknown(_) => "unknown",
        }
    }

    pub fn is_ok(self) -> bool {
        self == ExposureCode::Correct
    }
}

/// Progress of one calibration axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationProgress {
    Init,
    Wait,
    Failed,
    Done,
    #[serde(other)]
    Unknown,
}

impl CalibrationProgress {
    /// Suffix shown next to the axis legend
    pub fn label(self) -> &'static str {
        match self {
            CalibrationProgress::Init => " (not started)",
            CalibrationProgress::Wait => " (in progress...)",
            CalibrationProgress::Failed => " (failed)",
            CalibrationProgress::Done | CalibrationProgress::Unknown => "",
        }
    }
}

/// Calibration record of one axis (`calib_ra` / `calib_dec`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Calibration {
    pub success: CalibrationProgress,
    #[serde(default)]
    pub start_x: f64,
    #[serde(default)]
    pub start_y: f64,
    #[serde(default)]
    pub pulse_width: f64,
    #[serde(default)]
    pub pix_per_ms: f64,
    #[serde(default)]
    pub points_cnt: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default, deserialize_with = "false_as_none")]
    pub points: Option<Vec<Point>>,
}

/// Line geometry drawn for a finished calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOverlay {
    pub start: Point,
    /// End of the first calibration pulse
    pub first_pulse_end: Point,
    /// End of the full calibration run
    pub run_end: Point,
    /// Far point used to extend the axis across the whole sensor
    pub extension_end: Point,
}

impl CalibrationOverlay {
    /// Overlay lines for a calibration, `None` unless it is done
    pub fn from_calibration(calib: &Calibration) -> Option<Self> {
        if calib.success != CalibrationProgress::Done {
            return None;
        }
        let start = (calib.start_x, calib.start_y);
        let len1 = calib.pulse_width * calib.pix_per_ms;
        let len2 = calib.pulse_width * calib.points_cnt * calib.pix_per_ms;
        Some(CalibrationOverlay {
            start,
            first_pulse_end: move_point_towards(start, Vector::new(len1, calib.angle)),
            run_end: move_point_towards(start, Vector::new(len2, calib.angle)),
            extension_end: move_point_towards(start, Vector::new(SENSOR_WIDTH * 2.0, calib.angle)),
        })
    }
}

/// The `stars` field comes either as the compact string or as a list of objects
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StarField {
    Compact(String),
    List(Vec<Star>),
}

/// One telemetry frame
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusFrame {
    /// Device time, seconds since 2000-01-01 UTC
    #[serde(default, deserialize_with = "false_as_none")]
    pub time: Option<f64>,
    /// Echo of the identifier sent with the last settings packet
    #[serde(default, deserialize_with = "false_as_none")]
    pub rand_id: Option<i64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub guider_state: Option<i64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub intervalometer_state: Option<i64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub expo_code: Option<i64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub img_mean: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub img_stdev: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub img_max: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub img_min: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub stars: Option<StarField>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub max_stars: Option<u32>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub frm_cnt: Option<u64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub selected_star: Option<Point>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub calib_ra: Option<Calibration>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub calib_dec: Option<Calibration>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub solution: Option<Value>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub star_x: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub star_y: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub pole_x: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub pole_y: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub rotation: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub pix_per_deg: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub polar_clock: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub refraction: Option<f64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub logs: Option<Map<String, Value>>,
}

/// A guide pulse record from the device log buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseSample {
    /// Device timestamp (ms)
    pub timestamp: f64,
    pub err_ra: f64,
    pub err_dec: f64,
    pub pulse_sum: f64,
    /// Non-zero while the camera shutter is open
    pub shutter: f64,
}

/// A text message from the device log buffer
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub tick: f64,
    pub time: f64,
    pub text: String,
}

/// Rotation center estimated between the current solution and a ghost sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GhostResults {
    pub star: Point,
    pub pole: Point,
    pub ghost_star: Point,
    pub ghost_pole: Point,
    pub rotation: RotationCenter,
}

fn log_number(logs: &Map<String, Value>, key: &str, idx: usize) -> Option<f64> {
    logs.get(&format!("{}_{}", key, idx)).and_then(Value::as_f64)
}

impl StatusFrame {
    /// Parse a frame from an already decoded JSON object
    pub fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }

    /// Stars of this frame, whichever form they were sent in
    pub fn stars(&self) -> Vec<Star> {
        match &self.stars {
            Some(StarField::Compact(s)) => parse_stars_str(s),
            Some(StarField::List(list)) => list.clone(),
            None => Vec::new(),
        }
    }

    pub fn guide_state(&self) -> Option<GuideState> {
        self.guider_state.and_then(GuideState::from_code)
    }

    pub fn interval_state(&self) -> Option<IntervalState> {
        self.intervalometer_state.and_then(IntervalState::from_code)
    }

    pub fn exposure(&self) -> Option<ExposureCode> {
        self.expo_code.map(ExposureCode::from_code)
    }

    pub fn has_solution(&self) -> bool {
        self.solution.is_some()
    }

    /// Solved star position, if the polar solution is available
    pub fn star_point(&self) -> Option<Point> {
        Some((self.star_x?, self.star_y?))
    }

    /// Solved pole position, if the polar solution is available
    pub fn pole_point(&self) -> Option<Point> {
        Some((self.pole_x?, self.pole_y?))
    }

    /// Rotation between this frame's solution and an earlier one
    ///
    /// Both frames need solved star and pole positions.
    pub fn ghost_results(&self, ghost: &StatusFrame) -> Option<GhostResults> {
        let star = self.star_point()?;
        let pole = self.pole_point()?;
        let ghost_star = ghost.star_point()?;
        let ghost_pole = ghost.pole_point()?;
        Some(GhostResults {
            star,
            pole,
            ghost_star,
            ghost_pole,
            rotation: calc_rotation_center([star, pole], [ghost_star, ghost_pole]),
        })
    }

    /// Guide pulses in the log buffer, oldest first
    ///
    /// Unused slots carry a zero timestamp and are skipped.
    pub fn pulse_samples(&self) -> Vec<PulseSample> {
        let Some(logs) = &self.logs else {
            return Vec::new();
        };
        let mut samples: Vec<PulseSample> = (0..)
            .map_while(|i| log_number(logs, "pulse_time", i).map(|t| (i, t)))
            .filter(|&(_, t)| t != 0.0)
            .map(|(i, timestamp)| PulseSample {
                timestamp,
                err_ra: log_number(logs, "pulse_ra", i).unwrap_or(0.0),
                err_dec: log_number(logs, "pulse_dec", i).unwrap_or(0.0),
                pulse_sum: log_number(logs, "pulse_sum", i).unwrap_or(0.0),
                shutter: log_number(logs, "pulse_shutter", i).unwrap_or(0.0),
            })
            .collect();
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        samples
    }

    /// Text messages in the log buffer, oldest first
    pub fn log_messages(&self) -> Vec<LogMessage> {
        let Some(logs) = &self.logs else {
            return Vec::new();
        };
        let mut messages: Vec<LogMessage> = (0..)
            .map_while(|i| logs.get(&format!("msg_str_{}", i)).map(|v| (i, v)))
            .filter_map(|(i, v)| {
                let text = v.as_str()?;
                if text.is_empty() {
                    return None;
                }
                Some(LogMessage {
                    tick: log_number(logs, "msg_tick", i).unwrap_or(0.0),
                    time: log_number(logs, "msg_time", i).unwrap_or(0.0),
                    text: text.to_string(),
                })
            })
            .collect();
        messages.sort_by(|a, b| a.tick.total_cmp(&b.tick));
        messages
    }
}

/// Severity of a device message, decided by its prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Error,
    Warning,
    Success,
    Info,
    Plain,
}

impl MessageLevel {
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| lower.starts_with(p));
        if starts(&["err:", "error:", "fail:", "failed:"]) {
            MessageLevel::Error
        } else if starts(&["warn:", "warning:"]) {
            MessageLevel::Warning
        } else if starts(&["success:", "done:"]) {
            MessageLevel::Success
        } else if starts(&["info:", "msg:", "message:"]) {
            MessageLevel::Info
        } else {
            MessageLevel::Plain
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const EPSILON: f64 = 1e-6;

    fn frame(value: Value) -> StatusFrame {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_false_means_absent() {
        let f = frame(json!({
            "time": 12345.5,
            "guider_state": 1,
            "selected_star": false,
            "calib_ra": false,
            "solution": false,
            "stars": false
        }));
        assert_eq!(f.time, Some(12345.5));
        assert_eq!(f.guide_state(), Some(GuideState::Guiding));
        assert!(f.selected_star.is_none());
        assert!(f.calib_ra.is_none());
        assert!(!f.has_solution());
        assert!(f.stars().is_empty());
    }

    #[test]
    fn test_stars_both_forms() {
        let compact = frame(json!({"stars": "1,2,3,4,5;6,7,8,9,10"}));
        let list = frame(json!({"stars": [
            {"cx": 1.0, "cy": 2.0, "r": 3.0, "max_brite": 4.0, "rating": 5.0},
            {"cx": 6.0, "cy": 7.0, "r": 8.0, "max_brite": 9.0, "rating": 10.0}
        ]}));
        assert_eq!(compact.stars(), list.stars());
        assert_eq!(compact.stars().len(), 2);
    }

    #[test]
    fn test_state_codes() {
        assert_eq!(IntervalState::from_code(2), Some(IntervalState::ActiveGap));
        assert_eq!(GuideState::from_code(9), None);
        assert_eq!(ExposureCode::from_code(-2).description(), "no image");
        assert_eq!(ExposureCode::from_code(7).description(), "CAMERA HARDWARE ERROR");
        assert_eq!(ExposureCode::from_code(42), ExposureCode::Unknown(42));
        assert_eq!(ExposureCode::from_code(42).description(), "unknown");
        assert!(ExposureCode::from_code(0).is_ok());
    }

    #[test]
    fn test_calibration_overlay() {
        let f = frame(json!({
            "calib_ra": {
                "success": "done",
                "start_x": 100.0, "start_y": 200.0,
                "pulse_width": 500.0, "pix_per_ms": 0.1,
                "points_cnt": 4, "angle": 0.0,
                "points": [[110.0, 200.0], [120.0, 200.0]]
            },
            "calib_dec": {"success": "wait", "start_x": 1.0, "start_y": 2.0}
        }));
        let ra = f.calib_ra.as_ref().unwrap();
        assert_eq!(ra.points.as_ref().unwrap().len(), 2);
        let overlay = CalibrationOverlay::from_calibration(ra).unwrap();
        assert!((overlay.first_pulse_end.0 - 150.0).abs() < EPSILON);
        assert!((overlay.run_end.0 - 300.0).abs() < EPSILON);
        assert!((overlay.extension_end.0 - (100.0 + SENSOR_WIDTH * 2.0)).abs() < EPSILON);
        assert!((overlay.run_end.1 - 200.0).abs() < EPSILON);

        let dec = f.calib_dec.as_ref().unwrap();
        assert_eq!(dec.success, CalibrationProgress::Wait);
        assert_eq!(dec.success.label(), " (in progress...)");
        assert!(CalibrationOverlay::from_calibration(dec).is_none());
    }

    #[test]
    fn test_unknown_calibration_progress() {
        let c: Calibration = serde_json::from_value(json!({"success": "bogus"})).unwrap();
        assert_eq!(c.success, CalibrationProgress::Unknown);
    }

    #[test]
    fn test_ghost_results() {
        let now = frame(json!({"star_x": 0.0, "star_y": 100.0, "pole_x": 0.0, "pole_y": 0.0}));
        let ghost = frame(json!({"star_x": 100.0, "star_y": 0.0, "pole_x": 0.0, "pole_y": 0.0}));
        let res = now.ghost_results(&ghost).unwrap();
        assert_eq!(res.ghost_star, (100.0, 0.0));
        assert_eq!(res.rotation.midpoint1, (50.0, 50.0));

        let unsolved = frame(json!({"solution": false}));
        assert!(now.ghost_results(&unsolved).is_none());
    }

    #[test]
    fn test_pulse_samples_and_messages() {
        let f = frame(json!({"logs": {
            "pulse_time_0": 2000, "pulse_ra_0": 1.5, "pulse_dec_0": -0.5, "pulse_sum_0": 300,
            "pulse_time_1": 1000, "pulse_ra_1": 0.5, "pulse_dec_1": 0.25, "pulse_sum_1": 100,
            "pulse_time_2": 0, "pulse_ra_2": 0, "pulse_dec_2": 0, "pulse_sum_2": 0,
            "msg_tick_0": 20, "msg_time_0": 5, "msg_str_0": "warn: low battery",
            "msg_tick_1": 10, "msg_time_1": 4, "msg_str_1": "",
            "msg_tick_2": 5, "msg_time_2": 3, "msg_str_2": "started"
        }}));
        let samples = f.pulse_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, 1000.0);
        assert_eq!(samples[1].err_ra, 1.5);
        assert_eq!(samples[1].shutter, 0.0);

        let messages = f.log_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "started");
        assert_eq!(messages[1].text, "warn: low battery");
    }

    #[test]
    fn test_message_level() {
        assert_eq!(MessageLevel::classify("ERROR: lost star"), MessageLevel::Error);
        assert_eq!(MessageLevel::classify("failed: calibration"), MessageLevel::Error);
        assert_eq!(MessageLevel::classify("Warning: drift"), MessageLevel::Warning);
        assert_eq!(MessageLevel::classify("done: saved"), MessageLevel::Success);
        assert_eq!(MessageLevel::classify("msg: hello"), MessageLevel::Info);
        assert_eq!(MessageLevel::classify("errors happen"), MessageLevel::Plain);
    }
}
