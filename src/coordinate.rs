// Coordinate parsing and formatting
//
// Accepts degree/minute/second text (`40°26'46" N`, `N40 26 46.5`, `12°30.5'`),
// signed decimal degrees (`-123.45`), a plain number, or explicit fields, and
// validates the result as latitude or longitude.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// Signed decimal degrees, e.g. `-123.45`
const DD_PATTERN: &str = r"^([+-]?[0-9]{1,3})(\.[0-9]+)?$";

/// Degrees minutes seconds with optional compass letter on either side,
/// ASCII or Unicode prime marks, e.g. `12°34'56" N` or `N12°34′56.123″`
const DMS_PATTERN: &str = concat!(
    r"^([NSEW])?\s*([+-]?[0-9]{1,3})°?\s*",
    r#"(?:([0-9]{1,2}(?:\.[0-9]+)?)[′'`]?\s*(?:([0-9]{1,2}(?:\.[0-9]+)?)["″]?\s*)?)?"#,
    r"\s*([NSEW])?$",
);

fn dd_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DD_PATTERN).expect("decimal degree pattern"))
}

fn dms_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DMS_PATTERN).expect("dms pattern"))
}

fn round_to(x: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (x * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateError {
    /// Text matched neither the decimal nor the degrees-minutes-seconds form
    Unrecognized(String),
    InvalidLatitude,
    InvalidLongitude,
}

impl fmt::Display for CoordinateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateError::Unrecognized(s) => write!(f, "unrecognized coordinate: {:?}", s),
            CoordinateError::InvalidLatitude => write!(f, "not a valid latitude"),
            CoordinateError::InvalidLongitude => write!(f, "not a valid longitude"),
        }
    }
}

impl std::error::Error for CoordinateError {}

/// Compass direction attached to a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Direction::North),
            'S' => Some(Direction::South),
            'E' => Some(Direction::East),
            'W' => Some(Direction::West),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Direction::North => 'N',
            Direction::South => 'S',
            Direction::East => 'E',
            Direction::West => 'W',
        }
    }

    /// North and East count as positive
    pub fn is_positive(self) -> bool {
        matches!(self, Direction::North | Direction::East)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Direction {
    type Err = CoordinateError;

    /// Picks the first compass letter found, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .find_map(Direction::from_char)
            .ok_or_else(|| CoordinateError::Unrecognized(s.to_string()))
    }
}

/// An angle split into degrees, minutes and seconds
///
/// Parsed values are not range checked; call [`Coordinate::validate_as_latitude`] or
/// [`Coordinate::validate_as_longitude`] before trusting the fields.
#[derive(Debug, Clone, Copy)]
pub struct Coordinate {
    degrees: i32,
    minutes: i32,
    seconds: f64,
    direction: Option<Direction>,
    // sign of the value when no direction is attached
    positive: bool,
}

impl Coordinate {
    /// Builds a coordinate from explicit fields; the sign is carried by the first
    /// non-zero field
    pub fn from_dms(degrees: i32, minutes: i32, seconds: f64) -> Self {
        let positive = if degrees != 0 {
            degrees > 0
        } else if minutes != 0 {
            minutes > 0
        } else if seconds != 0.0 {
            seconds > 0.0
        } else {
            true
        };
        Coordinate {
            degrees,
            minutes,
            seconds,
            direction: None,
            positive,
        }
    }

    /// Splits decimal degrees into fields, seconds rounded to 4 places
    ///
    /// A value whose seconds round up to 60 carries into minutes, then degrees.
    pub fn from_decimal(value: f64) -> Self {
        let positive = value >= 0.0;
        let mut degrees = value.trunc() as i32;
        let decimal = (value - value.trunc()).abs();
        let mut minutes = (decimal * 60.0).floor() as i32;
        let mut seconds = round_to(((decimal * 60.0) - minutes as f64) * 60.0, 4);

        if seconds >= 60.0 {
            seconds = 0.0;
            minutes += 1;
            if minutes >= 60 {
                minutes = 0;
                degrees += if positive { 1 } else { -1 };
            }
        }

        Coordinate {
            degrees,
            minutes,
            seconds,
            direction: None,
            positive,
        }
    }

    /// Parses decimal degrees first, then degrees-minutes-seconds text
    pub fn parse(text: &str) -> Result<Self, CoordinateError> {
        let trimmed = text.trim();

        if let Some(caps) = dd_regex().captures(trimmed) {
            let deg_text = &caps[1];
            let degrees = parse_degrees(deg_text, text)?;
            let decimal = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0);
            let minutes = (decimal * 60.0).floor() as i32;
            let seconds = ((decimal * 60.0) - minutes as f64) * 60.0;
            return Ok(Coordinate {
                degrees,
                minutes,
                seconds,
                direction: None,
                positive: !deg_text.starts_with('-'),
            });
        }

        if let Some(caps) = dms_regex().captures(trimmed) {
            let deg_text = &caps[2];
            let degrees = parse_degrees(deg_text, text)?;
            let mut minutes = caps
                .get(3)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0);
            let mut seconds = caps
                .get(4)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0);

            // decimal minutes carry their fraction into seconds
            let fractional_minutes = minutes % 1.0;
            if fractional_minutes != 0.0 {
                minutes -= fractional_minutes;
                seconds = round_to(fractional_minutes * 60.0, 6);
            }

            let direction = caps
                .get(1)
                .or_else(|| caps.get(5))
                .and_then(|m| m.as_str().chars().next())
                .and_then(Direction::from_char);
            let positive = match direction {
                Some(d) => d.is_positive(),
                None => !deg_text.starts_with('-'),
            };

            return Ok(Coordinate {
                degrees,
                minutes: minutes as i32,
                seconds,
                direction,
                positive,
            });
        }

        Err(CoordinateError::Unrecognized(text.to_string()))
    }

    /// Attaches a compass direction, which then decides the sign
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self.positive = direction.is_positive();
        self
    }

    pub fn degrees(&self) -> i32 {
        self.degrees
    }

    pub fn minutes(&self) -> i32 {
        self.minutes
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    fn is_negative(&self) -> bool {
        match self.direction {
            Some(d) => !d.is_positive(),
            None => !self.positive,
        }
    }

    /// Signed decimal degrees, rounded to 6 places
    pub fn to_decimal(&self) -> f64 {
        let magnitude = round_to(
            self.degrees.unsigned_abs() as f64
                + self.minutes.unsigned_abs() as f64 / 60.0
                + self.seconds.abs() / 3600.0,
            6,
        );
        if self.is_negative() && magnitude > 0.0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Signed decimal degrees formatted with 6 decimal places
    pub fn to_decimal_degrees(&self) -> String {
        format!("{:.6}", self.to_decimal())
    }

    /// Degrees and decimal minutes, e.g. `40°26.7667'N`
    ///
    /// Components are joined with `separator`, or nothing when `None`.
    pub fn to_degrees_minutes(&self, separator: Option<&str>) -> String {
        let minutes = self.minutes as f64 + self.seconds / 60.0;
        let components = [
            format!("{}°", self.degrees.unsigned_abs()),
            format!("{:.4}'", minutes),
            self.direction.map(|d| d.to_string()).unwrap_or_default(),
        ];
        components.join(separator.unwrap_or(""))
    }

    /// Degrees, minutes and seconds, e.g. `40°26'46.0000"N`
    pub fn to_degrees_minutes_seconds(&self, separator: Option<&str>) -> String {
        let components = [
            format!("{}°", self.degrees.unsigned_abs()),
            format!("{}'", self.minutes),
            format!("{:.4}\"", self.seconds),
            self.direction.map(|d| d.to_string()).unwrap_or_default(),
        ];
        components.join(separator.unwrap_or(""))
    }

    /// Checks the value is a latitude (|degrees| <= 90, N/S)
    ///
    /// On success the direction is filled in when missing and degrees become
    /// absolute, so the direction alone carries the sign.
    pub fn validate_as_latitude(self) -> Result<Self, CoordinateError> {
        self.validate(90, Direction::North, Direction::South)
            .ok_or(CoordinateError::InvalidLatitude)
    }

    /// Checks the value is a longitude (|degrees| <= 180, E/W)
    pub fn validate_as_longitude(self) -> Result<Self, CoordinateError> {
        self.validate(180, Direction::East, Direction::West)
            .ok_or(CoordinateError::InvalidLongitude)
    }

    fn validate(mut self, limit: u32, pos: Direction, neg: Direction) -> Option<Self> {
        let abs_deg = self.degrees.unsigned_abs();
        let in_range = abs_deg <= limit
            && (abs_deg != limit || (self.minutes == 0 && self.seconds == 0.0))
            && (0..60).contains(&self.minutes)
            && (0.0..60.0).contains(&self.seconds);
        let direction_ok = self.direction.map_or(true, |d| d == pos || d == neg);
        if !in_range || !direction_ok {
            return None;
        }

        if self.direction.is_none() {
            self.direction = Some(if self.positive { pos } else { neg });
            self.degrees = abs_deg as i32;
        }
        Some(self)
    }
}

fn parse_degrees(deg_text: &str, original: &str) -> Result<i32, CoordinateError> {
    deg_text
        .trim_start_matches('+')
        .parse::<i32>()
        .map_err(|_| CoordinateError::Unrecognized(original.to_string()))
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.degrees == other.degrees
            && self.minutes == other.minutes
            && self.seconds == other.seconds
            && self.direction == other.direction
    }
}

impl FromStr for Coordinate {
    type Err = CoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Coordinate::parse(s)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_degrees_minutes_seconds(None))
    }
}
