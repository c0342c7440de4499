// Error graph module - guide-error history
//
// Keeps the guide pulse samples received from the device for plotting and export.
// When samples stop arriving, a zero sample is inserted after a timeout so the plot
// shows a gap instead of stretching the last value.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::{ERRGRAPH_STEP_WIDTH, ERRGRAPH_TIMEOUT_MS, ERRGRAPH_TOTAL_LIMIT};
use crate::status::PulseSample;

const CSV_HEADER: &str = "timestamp, err_ra, err_dec, pulse_sum, shutter, \r\n";

/// Longest pulse the plot expects per second of bulb time (ms)
const MAX_PULSE_PER_BULB_SEC: f64 = 2000.0;

/// Plot-ready series for the visible window, newest sample first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphView {
    /// Seconds relative to the newest sample, one decimal
    pub seconds_ago: Vec<f64>,
    pub err_ra: Vec<f64>,
    pub err_dec: Vec<f64>,
    /// Pulse sum rescaled onto the error axis
    pub pulse_sum: Vec<f64>,
    /// Shutter band, `+limit` while open and `0` while closed
    pub shutter: Vec<f64>,
    /// Largest absolute error in the window
    pub limit: f64,
}

#[derive(Debug)]
pub struct ErrorGraph {
    data: Vec<PulseSample>,
    last_time: f64,
    filler_deadline: Option<Instant>,
    timeout: Duration,
}

impl Default for ErrorGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorGraph {
    pub fn new() -> Self {
        ErrorGraph {
            data: Vec::new(),
            last_time: 0.0,
            filler_deadline: None,
            timeout: Duration::from_millis(ERRGRAPH_TIMEOUT_MS),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn samples(&self) -> &[PulseSample] {
        &self.data
    }

    /// Timestamp of the newest sample, `0` when empty
    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    /// When the gap filler is due, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.filler_deadline
    }

    /// Append a sample
    ///
    /// A sample carrying the same timestamp as the previous one is ignored and
    /// `false` is returned. Every accepted sample re-arms the gap filler.
    pub fn push(&mut self, sample: PulseSample) -> bool {
        if sample.timestamp == self.last_time {
            return false;
        }
        self.data.push(sample);
        self.prune();
        self.last_time = sample.timestamp;
        self.filler_deadline = Some(Instant::now() + self.timeout);
        true
    }

    fn prune(&mut self) {
        if self.data.len() < ERRGRAPH_TOTAL_LIMIT {
            return;
        }
        let half = self.data.len() / 2;
        self.data.drain(..half);
        debug!("error graph pruned to {} samples", self.data.len());
    }

    /// Insert the zero sample marking a gap in the data
    pub fn fill_gap(&mut self) {
        let timestamp = self.last_time + self.timeout.as_millis() as f64;
        self.push(PulseSample {
            timestamp,
            err_ra: 0.0,
            err_dec: 0.0,
            pulse_sum: 0.0,
            shutter: 0.0,
        });
    }

    /// Run the gap filler if its deadline has passed; returns whether it ran
    pub fn poll_filler(&mut self, now: Instant) -> bool {
        match self.filler_deadline {
            Some(deadline) if now >= deadline => {
                self.fill_gap();
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.filler_deadline = None;
        self.data.clear();
        self.last_time = 0.0;
    }

    /// The newest samples that fit into a plot `width` pixels wide, oldest first
    pub fn visible(&self, width: f64) -> &[PulseSample] {
        let count = (width / ERRGRAPH_STEP_WIDTH).floor().max(0.0) as usize;
        let start = self.data.len().saturating_sub(count);
        &self.data[start..]
    }

    /// Plot series for a `width` pixel window
    ///
    /// The window is always `floor(width / 15)` points long; missing history is padded
    /// with zero samples. `bulb_time` is the intervalometer bulb time in seconds.
    pub fn view(&self, width: f64, bulb_time: f64) -> GraphView {
        let count = (width / ERRGRAPH_STEP_WIDTH).floor().max(0.0) as usize;
        let blank = PulseSample {
            timestamp: 0.0,
            err_ra: 0.0,
            err_dec: 0.0,
            pulse_sum: 0.0,
            shutter: 0.0,
        };
        let window: Vec<PulseSample> = (0..count)
            .map(|i| {
                self.data
                    .len()
                    .checked_sub(i + 1)
                    .map(|j| self.data[j])
                    .unwrap_or(blank)
            })
            .collect();

        let limit = window
            .iter()
            .fold(0.0_f64, |acc, s| acc.max(s.err_ra.abs()).max(s.err_dec.abs()));
        let max_pulse = MAX_PULSE_PER_BULB_SEC * bulb_time;
        let first_ts = window.first().map(|s| s.timestamp).unwrap_or(0.0);

        let mut view = GraphView {
            limit,
            ..GraphView::default()
        };
        for s in &window {
            view.seconds_ago
                .push(((s.timestamp - first_ts) / 100.0).round().abs() / 10.0);
            view.err_ra.push(s.err_ra);
            view.err_dec.push(s.err_dec);
            view.pulse_sum.push(if max_pulse > 0.0 {
                s.pulse_sum * limit / max_pulse
            } else {
                0.0
            });
            view.shutter.push(if s.shutter == 0.0 { 0.0 } else { limit });
        }
        view
    }

    /// All samples as CSV, one row per sample, CRLF line endings
    pub fn to_csv(&self) -> String {
        let mut out = String::from(CSV_HEADER);
        for s in &self.data {
            for v in [s.timestamp, s.err_ra, s.err_dec, s.pulse_sum, s.shutter] {
                out.push_str(&format!("{}, ", v));
            }
            out.push_str("\r\n");
        }
        out
    }

    /// Write the CSV into `dir` as `guideerror-<unix millis>.csv`
    pub fn save(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(format!("guideerror-{}.csv", Utc::now().timestamp_millis()));
        fs::write(&path, self.to_csv())?;
        info!("saved {} guide error samples to {}", self.data.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: f64, err_ra: f64, err_dec: f64) -> PulseSample {
        PulseSample {
            timestamp,
            err_ra,
            err_dec,
            pulse_sum: 0.0,
            shutter: 0.0,
        }
    }

    #[test]
    fn test_duplicate_timestamp_ignored() {
        let mut g = ErrorGraph::new();
        assert!(g.push(sample(100.0, 1.0, 1.0)));
        assert!(!g.push(sample(100.0, 2.0, 2.0)));
        assert_eq!(g.len(), 1);
        assert_eq!(g.last_time(), 100.0);
    }

    #[test]
    fn test_prune_keeps_newer_half() {
        let mut g = ErrorGraph::new();
        for i in 1..=ERRGRAPH_TOTAL_LIMIT {
            g.push(sample(i as f64, 0.0, 0.0));
        }
        assert_eq!(g.len(), ERRGRAPH_TOTAL_LIMIT / 2);
        assert_eq!(g.samples()[0].timestamp, (ERRGRAPH_TOTAL_LIMIT / 2 + 1) as f64);
        assert_eq!(g.last_time(), ERRGRAPH_TOTAL_LIMIT as f64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gap_filler_after_timeout() {
        let mut g = ErrorGraph::new();
        g.push(sample(5000.0, 3.0, -3.0));

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(!g.poll_filler(Instant::now()));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(g.poll_filler(Instant::now()));
        assert_eq!(g.len(), 2);
        assert_eq!(g.samples()[1], sample(7000.0, 0.0, 0.0));

        // the filler re-arms itself and keeps marking the gap
        tokio::time::advance(Duration::from_millis(2000)).await;
        assert!(g.poll_filler(Instant::now()));
        assert_eq!(g.last_time(), 9000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_disarms_filler() {
        let mut g = ErrorGraph::new();
        g.push(sample(1.0, 0.0, 0.0));
        g.clear();
        assert!(g.is_empty());
        assert!(g.deadline().is_none());
        tokio::time::advance(Duration::from_millis(5000)).await;
        assert!(!g.poll_filler(Instant::now()));
        assert_eq!(g.last_time(), 0.0);
    }

    #[test]
    fn test_csv_format() {
        let mut g = ErrorGraph::new();
        g.push(PulseSample {
            timestamp: 1000.0,
            err_ra: 1.5,
            err_dec: -2.0,
            pulse_sum: 300.0,
            shutter: 1.0,
        });
        assert_eq!(
            g.to_csv(),
            "timestamp, err_ra, err_dec, pulse_sum, shutter, \r\n1000, 1.5, -2, 300, 1, \r\n"
        );
    }

    #[test]
    fn test_visible_window() {
        let mut g = ErrorGraph::new();
        for i in 1..=10 {
            g.push(sample(i as f64, 0.0, 0.0));
        }
        let v = g.visible(60.0);
        assert_eq!(v.len(), 4);
        assert_eq!(v[0].timestamp, 7.0);
        assert_eq!(v[3].timestamp, 10.0);
        assert_eq!(g.visible(1000.0).len(), 10);
    }

    #[test]
    fn test_view_pads_and_scales() {
        let mut g = ErrorGraph::new();
        g.push(PulseSample {
            timestamp: 1000.0,
            err_ra: 4.0,
            err_dec: -8.0,
            pulse_sum: 1000.0,
            shutter: 1.0,
        });
        g.push(sample(2500.0, 2.0, 1.0));
        let view = g.view(75.0, 1.0);
        assert_eq!(view.err_ra.len(), 5);
        assert_eq!(view.limit, 8.0);
        assert_eq!(view.err_ra[0], 2.0);
        assert_eq!(view.seconds_ago[1], 1.5);
        assert_eq!(view.pulse_sum[1], 4.0);
        assert_eq!(view.shutter[1], 8.0);
        assert_eq!(view.err_ra[4], 0.0);
    }

    #[test]
    fn test_save_writes_file() {
        let dir = std::env::temp_dir();
        let mut g = ErrorGraph::new();
        g.push(sample(1.0, 2.0, 3.0));
        let path = g.save(&dir).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("guideerror-") && name.ends_with(".csv"));
        assert_eq!(fs::read_to_string(&path).unwrap(), g.to_csv());
        let _ = fs::remove_file(path);
    }
}
