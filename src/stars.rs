// Stars module - star records reported by the guide camera
//
// The device reports detected stars either as a list of objects or as the compact
// "cx,cy,r,max_brite,rating;..." string. This module parses both forms, maps star
// sizes to drawn radii, colours stars by rating and fits a circle through a set of
// points (used to find the pole from star trails).

use serde::{Deserialize, Serialize};

use crate::mathutils::{hsv_to_rgb, map_star_radius, Point};

/// A detected star
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Star {
    pub cx: f64,
    pub cy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_brite: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl Star {
    pub fn new(cx: f64, cy: f64) -> Self {
        Star {
            cx,
            cy,
            r: None,
            max_brite: None,
            rating: None,
        }
    }

    pub fn position(&self) -> Point {
        (self.cx, self.cy)
    }
}

/// Parse the compact star string
///
/// Chunks are separated by `;`, fields by `,`. Chunks without a comma are ignored,
/// as are chunks whose position does not parse. The optional size, brightness and
/// rating fields are integers on the device and are truncated here.
pub fn parse_stars_str(text: &str) -> Vec<Star> {
    text.split(';')
        .filter(|chunk| chunk.contains(','))
        .filter_map(|chunk| {
            let fields: Vec<&str> = chunk.split(',').map(str::trim).collect();
            let cx = fields.first()?.parse::<f64>().ok()?;
            let cy = fields.get(1)?.parse::<f64>().ok()?;
            let int_field = |idx: usize| {
                fields
                    .get(idx)
                    .and_then(|f| f.parse::<f64>().ok())
                    .map(f64::trunc)
            };
            Some(Star {
                cx,
                cy,
                r: int_field(2),
                max_brite: int_field(3),
                rating: int_field(4),
            })
        })
        .collect()
}

/// Observed range of star radii in one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusRange {
    pub min: f64,
    pub max: f64,
}

impl RadiusRange {
    /// Range over the stars that carry a radius, `None` if none do
    pub fn from_stars(stars: &[Star]) -> Option<Self> {
        stars
            .iter()
            .filter_map(|s| s.r)
            .fold(None, |acc: Option<RadiusRange>, r| match acc {
                None => Some(RadiusRange { min: r, max: r }),
                Some(range) => Some(RadiusRange {
                    min: range.min.min(r),
                    max: range.max.max(r),
                }),
            })
    }

    /// Drawn radius for a star of radius `r` on an image `img_height` pixels tall
    pub fn map(&self, r: f64, img_height: f64) -> f64 {
        map_star_radius(r, self.min, self.max, img_height)
    }
}

fn star_value(star: &Star) -> f64 {
    star.max_brite.unwrap_or(0.0) / 255.0
}

/// Colour of a star: hue runs from red (rating 0) to green (rating 100)
pub fn star_color(star: &Star, rating: f64) -> (u8, u8, u8) {
    let v = star_value(star).max(0.5);
    let h = rating * 120.0 / 100.0 / 360.0;
    hsv_to_rgb(h, 1.0, v)
}

/// Grey level of a star from its peak brightness
pub fn star_brightness(star: &Star) -> (u8, u8, u8) {
    let h = star.rating.unwrap_or(0.0) * 120.0 / 100.0 / 360.0;
    hsv_to_rgb(h, 0.0, star_value(star))
}

/// Result of a circle fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleFit {
    pub center: Point,
    /// Mean distance from the center to the points
    pub radius: f64,
    /// Population standard deviation of those distances
    pub stdev: f64,
}

const CIRCLE_FIT_GRID: usize = 10;
const CIRCLE_FIT_MAX_DEPTH: u32 = 6;

fn radial_spread(points: &[Point], center: Point) -> (f64, f64) {
    let dists: Vec<f64> = points
        .iter()
        .map(|p| ((p.0 - center.0).powi(2) + (p.1 - center.1).powi(2)).sqrt())
        .collect();
    let n = dists.len() as f64;
    let avg = dists.iter().sum::<f64>() / n;
    let var = dists.iter().map(|d| (d - avg).powi(2)).sum::<f64>() / n;
    (avg, var.sqrt())
}

fn circle_fit_roi(points: &[Point], center: Point, radius: f64, depth: u32) -> CircleFit {
    let step = radius / CIRCLE_FIT_GRID as f64;
    let (avg, stdev) = radial_spread(points, center);
    let mut best = CircleFit {
        center,
        radius: avg,
        stdev,
    };

    for i in 0..CIRCLE_FIT_GRID {
        let dx = i as f64 * step;
        for j in 0..CIRCLE_FIT_GRID {
            let dy = j as f64 * step;
            for (sx, sy) in [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)] {
                let candidate = (center.0 + sx * dx, center.1 + sy * dy);
                let (avg, stdev) = radial_spread(points, candidate);
                if stdev < best.stdev {
                    best = CircleFit {
                        center: candidate,
                        radius: avg,
                        stdev,
                    };
                }
            }
        }
    }

    if step < 1.0 || depth > CIRCLE_FIT_MAX_DEPTH {
        return best;
    }
    circle_fit_roi(points, best.center, step * 0.75, depth + 1)
}

/// Find the circle best passing through `points` within a frame of `frame_size`
///
/// Grid search starting at the frame center with a radius of half the frame width,
/// refined around the best candidate until the grid step drops below one pixel.
/// Returns `None` for an empty point set.
pub fn circle_fit(points: &[Point], frame_size: (f64, f64)) -> Option<CircleFit> {
    if points.is_empty() {
        return None;
    }
    Some(circle_fit_roi(
        points,
        (frame_size.0 / 2.0, frame_size.1 / 2.0),
        frame_size.0 / 2.0,
        0,
    ))
}
