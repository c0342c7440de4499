// Guide camera dashboard client - Main Entry Point
// Copyright (C) 2026 - guidescope-client contributors
// Licensed under MIT

use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use guidescope_client::config::{parse_setting, Config};
use guidescope_client::controls::{SettingValue, SettingsQueue};
use guidescope_client::coordinate::Coordinate;
use guidescope_client::errgraph::ErrorGraph;
use guidescope_client::mathutils::{epoch2000_to_datetime, fmt_date, fmt_time, now_epoch2000, refraction_arcmin};
use guidescope_client::net::{DeviceCommand, Session, SessionHandle, SessionHandlers};
use guidescope_client::status::{ExposureCode, GuideState, IntervalState, MessageLevel, StatusFrame};
use serde_json::Value;
use tokio::signal;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A line typed on the console
#[derive(Debug, Clone, PartialEq)]
enum ConsoleCommand {
    Set(String, SettingValue),
    Guide(Value),
    Intervalometer(Value),
    Misc(String),
    Fetch(String, String),
    Retransmit,
    ClearGraph,
    Quit,
    Raw(String),
    Invalid(String),
}

fn parse_command_value(text: &str) -> Value {
    match SettingValue::parse(text) {
        Some(v) => v.to_json(),
        None => Value::String(text.to_string()),
    }
}

fn parse_console_line(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let cmd = match word {
        "set" => match parse_setting(rest) {
            Ok((k, v)) => ConsoleCommand::Set(k, v),
            Err(e) => ConsoleCommand::Invalid(e),
        },
        "guide" if !rest.is_empty() => ConsoleCommand::Guide(parse_command_value(rest)),
        "interval" if !rest.is_empty() => ConsoleCommand::Intervalometer(parse_command_value(rest)),
        "misc" if !rest.is_empty() => ConsoleCommand::Misc(rest.to_string()),
        "fetch" => match rest.split_once(char::is_whitespace) {
            Some((short, file)) => ConsoleCommand::Fetch(short.to_string(), file.trim().to_string()),
            None => ConsoleCommand::Invalid("usage: fetch SHORTNAME FILENAME".to_string()),
        },
        "retransmit" => ConsoleCommand::Retransmit,
        "clear" => ConsoleCommand::ClearGraph,
        "quit" | "exit" => ConsoleCommand::Quit,
        "guide" | "interval" | "misc" => ConsoleCommand::Invalid(format!("usage: {} VALUE", word)),
        _ => ConsoleCommand::Raw(line.to_string()),
    };
    Some(cmd)
}

/// Tracks what was already reported so only changes are logged
#[derive(Default)]
struct StatusLog {
    guide_state: Option<GuideState>,
    interval_state: Option<IntervalState>,
    exposure: Option<ExposureCode>,
    last_msg_tick: f64,
    rand_id: u32,
    frames: u64,
}

impl StatusLog {
    fn new(rand_id: u32) -> Self {
        StatusLog {
            rand_id,
            ..Default::default()
        }
    }

    fn observe(&mut self, frame: &StatusFrame) {
        self.frames += 1;

        if self.frames == 1 {
            if let Some(t) = frame.time {
                let dt = epoch2000_to_datetime(t);
                info!("device time {} {}", fmt_date(&dt), fmt_time(&dt));
            }
        }

        if let Some(id) = frame.rand_id {
            if id != self.rand_id as i64 {
                debug!("device last configured by another client ({})", id);
            }
        }

        if let Some(state) = frame.guide_state() {
            if self.guide_state != Some(state) {
                info!("guider: {}", state.as_str());
                self.guide_state = Some(state);
            }
        }

        if let Some(state) = frame.interval_state() {
            if self.interval_state != Some(state) {
                info!("intervalometer: {}", state.as_str());
                self.interval_state = Some(state);
            }
        }

        if let Some(code) = frame.exposure() {
            if self.exposure != Some(code) {
                if code.is_ok() {
                    info!("exposure: {}", code.description());
                } else {
                    warn!("exposure: {}", code.description());
                }
                self.exposure = Some(code);
            }
        }

        for msg in frame.log_messages() {
            if msg.tick <= self.last_msg_tick {
                continue;
            }
            self.last_msg_tick = msg.tick;
            match MessageLevel::classify(&msg.text) {
                MessageLevel::Error => error!("device: {}", msg.text),
                MessageLevel::Warning => warn!("device: {}", msg.text),
                _ => info!("device: {}", msg.text),
            }
        }

        let stars = frame.stars();
        debug!(
            "frame {}: {} stars, mean {:.1}, polar clock {:?}",
            frame.frm_cnt.unwrap_or(0),
            stars.len(),
            frame.img_mean.unwrap_or(0.0),
            frame.polar_clock
        );
    }
}

/// Settings sent right after the connection opens
fn startup_settings(
    queue: &mut SettingsQueue,
    settings: &[(String, SettingValue)],
    latitude: Option<&Coordinate>,
    longitude: Option<&Coordinate>,
) -> Option<DeviceCommand> {
    queue.set("time", Value::from(now_epoch2000()));
    if let Some(lat) = latitude {
        queue.set("latitude", Value::from(lat.to_decimal()));
    }
    if let Some(lon) = longitude {
        queue.set("longitude", Value::from(lon.to_decimal()));
    }
    for (name, value) in settings {
        queue.set(name, value.to_json());
    }
    queue.take()
}

fn spawn_console(handle: SessionHandle, graph: Arc<Mutex<ErrorGraph>>, rand_id: u32) {
    // plain thread: a pending stdin read must not hold up runtime shutdown
    std::thread::spawn(move || {
        let mut queue = SettingsQueue::with_rand_id(rand_id);
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("console read failed: {}", e);
                    break;
                }
            };
            let Some(cmd) = parse_console_line(&line) else {
                continue;
            };
            let sent = match cmd {
                ConsoleCommand::Set(name, value) => {
                    queue.set(&name, value.to_json());
                    match queue.take() {
                        Some(packet) => handle.send_json(&packet),
                        None => Ok(()),
                    }
                }
                ConsoleCommand::Guide(cmd) => handle.send_json(&DeviceCommand::GuideCmd { cmd }),
                ConsoleCommand::Intervalometer(cmd) => {
                    handle.send_json(&DeviceCommand::IntervalometerCmd { cmd })
                }
                ConsoleCommand::Misc(cmd) => handle.send_json(&DeviceCommand::MiscCmd { cmd }),
                ConsoleCommand::Fetch(short, file) => handle.fetch(&short, &file),
                ConsoleCommand::Retransmit => handle.retransmit(),
                ConsoleCommand::ClearGraph => {
                    if let Ok(mut g) = graph.lock() {
                        g.clear();
                    }
                    info!("error graph cleared");
                    Ok(())
                }
                ConsoleCommand::Quit => {
                    let _ = handle.close();
                    break;
                }
                ConsoleCommand::Raw(text) => handle.send(text),
                ConsoleCommand::Invalid(e) => {
                    warn!("{}", e);
                    Ok(())
                }
            };
            if let Err(e) = sent {
                warn!("console command dropped: {}", e);
                break;
            }
        }
        debug!("console closed");
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    info!("Starting guide camera client");

    let settings = config.settings()?;
    let latitude = config.latitude().transpose()?;
    let longitude = config.longitude().transpose()?;
    if let Some(lat) = &latitude {
        info!(
            "latitude {} ({}), refraction at the pole {:.2} arcmin",
            lat,
            lat.to_decimal_degrees(),
            refraction_arcmin(lat.to_decimal(), config.pressure, config.temperature)
        );
    }
    if let Some(lon) = &longitude {
        info!("longitude {} ({})", lon, lon.to_decimal_degrees());
    }

    let graph = Arc::new(Mutex::new(ErrorGraph::new()));
    let rand_id = SettingsQueue::new().rand_id();
    let (handle, commands) = SessionHandle::channel();

    let open_handle = handle.clone();
    let mut open_queue = SettingsQueue::with_rand_id(rand_id);
    let json_graph = graph.clone();
    let mut status_log = StatusLog::new(rand_id);
    let error_handle = handle.clone();

    let handlers = SessionHandlers::new()
        .on_open(move || {
            let packet = startup_settings(
                &mut open_queue,
                &settings,
                latitude.as_ref(),
                longitude.as_ref(),
            );
            if let Some(packet) = packet {
                if let Err(e) = open_handle.send_json(&packet) {
                    warn!("startup settings dropped: {}", e);
                }
            }
        })
        .on_json(move |map| {
            let frame = match StatusFrame::from_map(map) {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("unrecognized frame: {}", e);
                    return;
                }
            };
            status_log.observe(&frame);
            if let Ok(mut g) = json_graph.lock() {
                for sample in frame.pulse_samples() {
                    if sample.timestamp > g.last_time() {
                        g.push(sample);
                    }
                }
            }
        })
        .on_string(|text| info!("device says: {}", text))
        .on_error(move |err| {
            warn!("session error: {}", err);
            // held back until the socket shows it is alive again
            let _ = error_handle.retransmit();
        })
        .on_close(|| warn!("connection to device lost"));

    let mut session = Session::new(handlers);
    session.init(&config.page_url, &config.path)?;

    spawn_console(handle.clone(), graph.clone(), rand_id);

    // Insert gap markers into the error graph while no pulses arrive
    let filler_graph = graph.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(100));
        loop {
            tick.tick().await;
            if let Ok(mut g) = filler_graph.lock() {
                g.poll_filler(Instant::now());
            }
        }
    });

    // Wait for shutdown signal (Ctrl+C)
    let shutdown = handle.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal (Ctrl+C)");
                let _ = shutdown.close();
            }
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
    });

    let result = session.run(commands).await;
    info!(
        "Session ended ({} errors since last message)",
        session.error_count()
    );

    if let Some(dir) = &config.save_graph {
        let saved = match graph.lock() {
            Ok(g) if !g.is_empty() => Some(g.save(dir)),
            _ => None,
        };
        if let Some(Err(e)) = saved {
            error!("ERROR while saving graph data: {}", e);
        }
    }

    result?;
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let (level, spans) = if verbose {
        (tracing::Level::DEBUG, FmtSpan::ENTER | FmtSpan::CLOSE)
    } else {
        (tracing::Level::INFO, FmtSpan::NONE)
    };
    tracing_subscriber::fmt()
        .with_target(verbose)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(spans)
        .with_max_level(level)
        .init();
    debug!("logging at {} level", level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_console_line() {
        assert_eq!(parse_console_line("   "), None);
        assert_eq!(
            parse_console_line("set gain=16"),
            Some(ConsoleCommand::Set("gain".to_string(), SettingValue::Number(16.0)))
        );
        assert_eq!(parse_console_line("guide 1"), Some(ConsoleCommand::Guide(json!(1))));
        assert_eq!(
            parse_console_line("interval start"),
            Some(ConsoleCommand::Intervalometer(json!("start")))
        );
        assert_eq!(
            parse_console_line("fetch hotpixels hotpixels.txt"),
            Some(ConsoleCommand::Fetch("hotpixels".to_string(), "hotpixels.txt".to_string()))
        );
        assert_eq!(parse_console_line("quit"), Some(ConsoleCommand::Quit));
        assert_eq!(parse_console_line("ping"), Some(ConsoleCommand::Raw("ping".to_string())));
        assert!(matches!(parse_console_line("guide"), Some(ConsoleCommand::Invalid(_))));
        assert!(matches!(parse_console_line("fetch onlyone"), Some(ConsoleCommand::Invalid(_))));
    }

    #[test]
    fn test_startup_settings() {
        let mut queue = SettingsQueue::with_rand_id(9);
        let lat = Coordinate::parse("45.5").unwrap().validate_as_latitude().unwrap();
        let settings = vec![("gain".to_string(), SettingValue::Number(8.0))];
        let packet = startup_settings(&mut queue, &settings, Some(&lat), None).unwrap();
        match packet {
            DeviceCommand::Settings { settings } => {
                assert_eq!(settings.get("gain"), Some(&json!(8)));
                assert_eq!(settings.get("latitude"), Some(&json!(45.5)));
                assert_eq!(settings.get("rand_id"), Some(&json!(9)));
                assert!(settings.get("time").and_then(Value::as_f64).unwrap() > 0.0);
                assert!(settings.get("longitude").is_none());
            }
            other => panic!("expected settings, got {:?}", other),
        }
    }
}
