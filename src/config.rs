use std::path::PathBuf;

use clap::Parser;

use crate::constants::{DEFAULT_PRESSURE_KPA, DEFAULT_TEMPERATURE_C};
use crate::controls::SettingValue;
use crate::coordinate::{Coordinate, CoordinateError};

/// Guide camera dashboard client configuration
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// URL of the device's dashboard page; its host serves the socket.
    #[arg(long, value_name = "URL", default_value = "http://192.168.4.1/")]
    pub page_url: String,

    /// Socket path on the device host.
    #[arg(long, value_name = "SEGMENT", default_value = "stream")]
    pub path: String,

    /// Device setting sent once connected, as KEY=VALUE (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Write the guide error history as CSV into this directory on exit.
    #[arg(long, value_name = "DIR")]
    pub save_graph: Option<PathBuf>,

    /// Observer latitude (decimal or D°M'S" with N/S), sent to the device and used for refraction.
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: Option<String>,

    /// Observer longitude (decimal or D°M'S" with E/W), sent to the device.
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: Option<String>,

    /// Air pressure in kPa for the refraction estimate
    #[arg(long, default_value_t = DEFAULT_PRESSURE_KPA)]
    pub pressure: f64,

    /// Air temperature in °C for the refraction estimate
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE_C, allow_hyphen_values = true)]
    pub temperature: f64,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

/// Split `KEY=VALUE` into a setting name and value
pub fn parse_setting(text: &str) -> Result<(String, SettingValue), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", text))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing setting name in '{}'", text));
    }
    let value = SettingValue::parse(value)
        .ok_or_else(|| format!("setting '{}' needs a number or true/false", key))?;
    Ok((key.to_string(), value))
}

impl Config {
    /// Settings given with `--set`
    pub fn settings(&self) -> Result<Vec<(String, SettingValue)>, String> {
        self.set.iter().map(|s| parse_setting(s)).collect()
    }

    /// Validated `--latitude`, if given
    pub fn latitude(&self) -> Option<Result<Coordinate, CoordinateError>> {
        self.latitude
            .as_deref()
            .map(|s| Coordinate::parse(s).and_then(Coordinate::validate_as_latitude))
    }

    /// Validated `--longitude`, if given
    pub fn longitude(&self) -> Option<Result<Coordinate, CoordinateError>> {
        self.longitude
            .as_deref()
            .map(|s| Coordinate::parse(s).and_then(Coordinate::validate_as_longitude))
    }
}
