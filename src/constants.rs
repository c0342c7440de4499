// Shared constants for the guide-camera dashboard client
// Values follow the device firmware and the dashboard's empirical tuning.

/// Idle time after the last outbound activity before a keep-alive "ping" is sent (s)
pub const PING_DELAY_SECS: u64 = 5;

/// Keep-alive payload understood by the device
pub const PING_PAYLOAD: &str = "ping";

/// Tolerance when checking that both tracked points turned by the same angle (degrees)
pub const ROTATION_ANGLE_TOL_DEG: f64 = 1.0;

/// Chords shorter than this (pixels) are too noisy to validate a rotation center
pub const ROTATION_MIN_SEGMENT_LEN: f64 = 10.0;

/// Length of the second point placed along a perpendicular bisector (pixels)
pub const BISECTOR_RHO: f64 = 100.0;

/// Full sensor width (pixels)
pub const SENSOR_WIDTH: f64 = 2592.0;

/// Full sensor height (pixels)
pub const SENSOR_HEIGHT: f64 = 1944.0;

/// Smallest drawn star radius (pixels)
pub const STAR_RADIUS_MIN_PX: f64 = 2.0;

/// Lower bound for the largest drawn star radius (pixels)
pub const STAR_RADIUS_MAX_FLOOR_PX: f64 = 4.0;

/// Largest drawn star radius as a fraction of the image height
pub const STAR_RADIUS_MAX_FRACTION: f64 = 0.01;

/// Guide-error graph sample limit; reaching it drops the older half
pub const ERRGRAPH_TOTAL_LIMIT: usize = 4096 * 2;

/// Gap after which a zero sample is inserted into the guide-error graph (ms)
pub const ERRGRAPH_TIMEOUT_MS: u64 = 2000;

/// Horizontal spacing of one guide-error sample on screen (pixels)
pub const ERRGRAPH_STEP_WIDTH: f64 = 15.0;

/// Standard atmospheric pressure used by the refraction estimate (kPa)
pub const DEFAULT_PRESSURE_KPA: f64 = 101.0;

/// Default air temperature used by the refraction estimate (°C)
pub const DEFAULT_TEMPERATURE_C: f64 = 10.0;
