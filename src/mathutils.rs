// Geometry and math helpers for the overlay renderer
//
// Provides:
// - angle normalization and angular differences (degrees)
// - point/vector math on image coordinates (pixels, y pointing down)
// - perpendicular bisectors, infinite-line intersection, rotation-center estimation
// - atmospheric refraction, HSV colours, star radius mapping
// - device epoch (seconds since 2000-01-01 UTC) conversions

use chrono::{DateTime, Local, TimeZone, Timelike, Utc};

use crate::constants::{
    BISECTOR_RHO, ROTATION_MIN_SEGMENT_LEN, ROTATION_ANGLE_TOL_DEG, STAR_RADIUS_MAX_FLOOR_PX,
    STAR_RADIUS_MAX_FRACTION, STAR_RADIUS_MIN_PX,
};

/// A point in image coordinates (x, y)
pub type Point = (f64, f64);

/// Polar form of the displacement between two points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector {
    /// Length in pixels
    pub magnitude: f64,
    /// Direction in degrees, as returned by `atan2`
    pub angle: f64,
}

impl Vector {
    pub fn new(magnitude: f64, angle: f64) -> Self {
        Vector { magnitude, angle }
    }
}

/// Perpendicular bisector of a segment, as two points on the line plus its angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bisector {
    /// Midpoint of the bisected segment
    pub start: Point,
    /// A second point `BISECTOR_RHO` pixels along the bisector
    pub end: Point,
    /// Slope angle of the segment plus 90 degrees (not normalized)
    pub angle: f64,
}

/// Result of intersecting two lines treated as infinite
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineIntersection {
    /// Intersection point, `None` when the lines are parallel or coincident
    pub point: Option<Point>,
    /// The point lies strictly inside the first segment
    pub on_line1: bool,
    /// The point lies strictly inside the second segment
    pub on_line2: bool,
}

/// Thresholds used to decide whether an estimated rotation center can be trusted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationTolerance {
    /// Allowed disagreement between the chord sweeps and the pair's turn (degrees)
    pub angle_deg: f64,
    /// Chords shorter than this are not validated
    pub min_segment_len: f64,
}

impl Default for RotationTolerance {
    fn default() -> Self {
        RotationTolerance {
            angle_deg: ROTATION_ANGLE_TOL_DEG,
            min_segment_len: ROTATION_MIN_SEGMENT_LEN,
        }
    }
}

/// Rotation center estimated from two point pairs sampled before and after a rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationCenter {
    /// Intersection of the two chord bisectors
    pub center: Option<Point>,
    /// Midpoint of the first chord (first point of each pair)
    pub midpoint1: Point,
    /// Midpoint of the second chord (second point of each pair)
    pub midpoint2: Point,
    /// Angle of the first bisector
    pub bisect_angle1: f64,
    /// Angle of the second bisector
    pub bisect_angle2: f64,
    /// Angle between the bisectors, `None` when the measurement is unreliable
    pub angle_diff: Option<f64>,
}

/// Normalizes an angle in degrees into (-180, 180]
pub fn normalize_angle_degrees(x: f64) -> f64 {
    let r = x.rem_euclid(360.0);
    if r > 180.0 {
        r - 360.0
    } else {
        r
    }
}

/// Returns the vector pointing from `p1` to `p2`
///
/// # Example
/// ```
/// use guidescope_client::mathutils::get_vector;
/// let v = get_vector((0.0, 0.0), (3.0, 4.0));
/// assert!((v.magnitude - 5.0).abs() < 1e-9);
/// ```
pub fn get_vector(p1: Point, p2: Point) -> Vector {
    let dx = p2.0 - p1.0;
    let dy = p2.1 - p1.1;
    Vector {
        magnitude: (dx * dx + dy * dy).sqrt(),
        angle: dy.atan2(dx).to_degrees(),
    }
}

pub fn midpoint(p1: Point, p2: Point) -> Point {
    ((p1.0 + p2.0) / 2.0, (p1.1 + p2.1) / 2.0)
}

pub fn slope_angle(p1: Point, p2: Point) -> f64 {
    get_vector(p1, p2).angle
}

/// Unsigned angular difference between two directions, in [0, 180]
pub fn angle_diff(a1: f64, a2: f64) -> f64 {
    let d = (normalize_angle_degrees(a1) - normalize_angle_degrees(a2)).abs();
    180.0 - (d - 180.0).abs()
}

/// True when `x` is within `tol` degrees of a quarter turn in either direction
pub fn is_near_90_apart(x: f64, tol: f64) -> bool {
    [90.0, 270.0, -90.0, -270.0]
        .iter()
        .any(|&q| angle_diff(x, q).abs() <= tol)
}

/// Perpendicular bisector of the segment `p1`-`p2`
pub fn perpendicular_bisector(p1: Point, p2: Point) -> Bisector {
    let start = midpoint(p1, p2);
    let angle = slope_angle(p1, p2) + 90.0;
    let angr = angle.to_radians();
    let end = (
        start.0 + BISECTOR_RHO * angr.cos(),
        start.1 + BISECTOR_RHO * angr.sin(),
    );
    Bisector { start, end, angle }
}

/// Intersects the infinite lines through two segments
///
/// # Arguments
/// * `line1` - Two points on the first line
/// * `line2` - Two points on the second line
///
/// # Returns
/// The intersection, with `point == None` when the lines never meet (or overlap entirely)
pub fn line_intersection(line1: (Point, Point), line2: (Point, Point)) -> LineIntersection {
    let ((x1, y1), (x2, y2)) = line1;
    let ((x3, y3), (x4, y4)) = line2;
    let mut result = LineIntersection {
        point: None,
        on_line1: false,
        on_line2: false,
    };

    let denominator = ((y4 - y3) * (x2 - x1)) - ((x4 - x3) * (y2 - y1));
    if denominator == 0.0 {
        return result;
    }

    let a = y1 - y3;
    let b = x1 - x3;
    let numerator1 = ((x4 - x3) * a) - ((y4 - y3) * b);
    let numerator2 = ((x2 - x1) * a) - ((y2 - y1) * b);
    let a = numerator1 / denominator;
    let b = numerator2 / denominator;

    let x = x1 + a * (x2 - x1);
    let y = y1 + a * (y2 - y1);
    if !x.is_finite() || !y.is_finite() {
        return result;
    }

    result.point = Some((x, y));
    result.on_line1 = a > 0.0 && a < 1.0;
    result.on_line2 = b > 0.0 && b < 1.0;
    result
}

/// Estimates the center of a rotation with the default tolerances
///
/// `pp1` holds two points (for example a star and the pole) from the first sample,
/// `pp2` the same two points from the later sample.
pub fn calc_rotation_center(pp1: [Point; 2], pp2: [Point; 2]) -> RotationCenter {
    calc_rotation_center_with(pp1, pp2, &RotationTolerance::default())
}

/// Estimates the center of a rotation from two point pairs
///
/// Each tracked point moves along a chord of a circle around the center, so the
/// center is where the two chord bisectors meet. A rigid rotation turns both points
/// and the pair's own orientation vector (first point to second point) by the same
/// angle, so every chord at least `tol.min_segment_len` long must sweep, as seen from
/// the center, the same angle the orientation vector turned, within `tol.angle_deg`.
/// A failed check (including no intersection at all) yields `angle_diff == None`.
/// Short chords are not checked, and neither is a pair whose points sit closer
/// together than `tol.min_segment_len`.
pub fn calc_rotation_center_with(
    pp1: [Point; 2],
    pp2: [Point; 2],
    tol: &RotationTolerance,
) -> RotationCenter {
    let midpoint1 = midpoint(pp1[0], pp2[0]);
    let midpoint2 = midpoint(pp1[1], pp2[1]);
    let bisect1 = perpendicular_bisector(pp1[0], pp2[0]);
    let bisect2 = perpendicular_bisector(pp1[1], pp2[1]);

    let raw_diff = angle_diff(
        slope_angle(bisect1.start, bisect1.end),
        slope_angle(bisect2.start, bisect2.end),
    );
    let center = line_intersection((bisect1.start, bisect1.end), (bisect2.start, bisect2.end)).point;

    let orient1 = get_vector(pp1[0], pp1[1]);
    let orient2 = get_vector(pp2[0], pp2[1]);
    let turn = (orient1.magnitude >= tol.min_segment_len && orient2.magnitude >= tol.min_segment_len)
        .then(|| orient2.angle - orient1.angle);

    let chords = [(pp1[0], pp2[0]), (pp1[1], pp2[1])];
    let reliable = chords.iter().all(|&(a, b)| {
        if get_vector(a, b).magnitude < tol.min_segment_len {
            return true;
        }
        let Some(c) = center else {
            return false;
        };
        match turn {
            // a long chord keeps both ends at least half its length from the center
            Some(turn) => {
                let swept = get_vector(c, b).angle - get_vector(c, a).angle;
                angle_diff(swept, turn) <= tol.angle_deg
            }
            None => true,
        }
    });

    RotationCenter {
        center,
        midpoint1,
        midpoint2,
        bisect_angle1: bisect1.angle,
        bisect_angle2: bisect2.angle,
        angle_diff: if reliable { Some(raw_diff) } else { None },
    }
}

pub fn move_point(p: Point, dx: f64, dy: f64) -> Point {
    (p.0 + dx, p.1 + dy)
}

/// Moves `p` by `v.magnitude` pixels in the direction `v.angle`
pub fn move_point_towards(p: Point, v: Vector) -> Point {
    let phi = v.angle.to_radians();
    move_point(p, v.magnitude * phi.cos(), v.magnitude * phi.sin())
}

/// Linear re-mapping of `x` from one range onto another (no clamping)
pub fn map_val(x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Atmospheric refraction near the pole, in arcminutes
///
/// Uses Bennett's formula with the pole altitude equal to the observer latitude,
/// scaled for pressure (kPa) and temperature (°C). Negative results clamp to zero.
pub fn refraction_arcmin(latitude: f64, pressure: f64, temperature: f64) -> f64 {
    let x = (latitude + (10.3 / (latitude + 5.11))).to_radians();
    let x = 1.02 / x.tan();
    let tempcomp = (pressure / 101.0) * (283.0 / (273.0 + temperature));
    let arcmin = x * tempcomp;
    if arcmin < 0.0 || !arcmin.is_finite() {
        0.0
    } else {
        arcmin
    }
}

/// Same as [`refraction_arcmin`] expressed in degrees
pub fn refraction_degrees(latitude: f64, pressure: f64, temperature: f64) -> f64 {
    refraction_arcmin(latitude, pressure, temperature) / 60.0
}

/// Converts HSV (each component in [0, 1]) to 8-bit RGB
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match (i as i64).rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let to_byte = |c: f64| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}

/// Maps a detected star radius onto a drawn radius in pixels
///
/// `min_r`/`max_r` are the smallest and largest radii seen in the current frame. The
/// output is clamped to [2, max(4, 1% of `img_height`)]; a frame where every star has
/// the same radius draws them all at the upper bound.
pub fn map_star_radius(r: f64, min_r: f64, max_r: f64, img_height: f64) -> f64 {
    let out_max = STAR_RADIUS_MAX_FLOOR_PX.max(img_height * STAR_RADIUS_MAX_FRACTION);
    if max_r <= min_r {
        return out_max;
    }
    map_val(r, min_r, max_r, STAR_RADIUS_MIN_PX, out_max).clamp(STAR_RADIUS_MIN_PX, out_max)
}

/// Device epoch: 2000-01-01T00:00:00Z
fn epoch2000() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Converts device time (seconds since 2000-01-01 UTC) to a timestamp
pub fn epoch2000_to_datetime(secs: f64) -> DateTime<Utc> {
    let millis = (secs * 1000.0).round() as i64;
    epoch2000() + chrono::Duration::milliseconds(millis)
}

/// Current time as device time
pub fn now_epoch2000() -> f64 {
    let elapsed = Utc::now() - epoch2000();
    elapsed.num_milliseconds() as f64 / 1000.0
}

/// Formats local wall time as `H:MM:SS` (hour not padded)
pub fn fmt_time(t: &DateTime<Utc>) -> String {
    let local = t.with_timezone(&Local);
    format!("{}:{:02}:{:02}", local.hour(), local.minute(), local.second())
}

/// Formats a local date as `DD-Mon-YYYY`
pub fn fmt_date(t: &DateTime<Utc>) -> String {
    t.with_timezone(&Local).format("%d-%b-%Y").to_string()
}
