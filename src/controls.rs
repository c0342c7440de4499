// Controls module - model of the dashboard's setting controls
//
// Sliders, lookup sliders, checkboxes and buttons bound either to a device setting
// (queued and sent as one settings packet) or to a local callback. Settings reported
// back by the device are pushed into the bound controls.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::net::messages::DeviceCommand;

/// Errors raised by the control panel
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    UnknownControl(String),
    EmptyLookup,
    /// `min` is above `max`, or a bound is NaN
    InvalidRange { min: f64, max: f64 },
    /// A slider was moved to NaN
    NotANumber(String),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::UnknownControl(id) => write!(f, "no control named '{}'", id),
            ControlError::EmptyLookup => write!(f, "lookup slider needs at least one entry"),
            ControlError::InvalidRange { min, max } => {
                write!(f, "slider range [{}, {}] is empty", min, max)
            }
            ControlError::NotANumber(id) => write!(f, "slider '{}' cannot take NaN", id),
        }
    }
}

impl std::error::Error for ControlError {}

/// Value of a device setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingValue {
    Number(f64),
    Bool(bool),
}

impl SettingValue {
    pub fn to_json(self) -> Value {
        match self {
            SettingValue::Bool(b) => Value::Bool(b),
            SettingValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                Value::from(n as i64)
            }
            SettingValue::Number(n) => Value::from(n),
        }
    }

    pub fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Bool(b) => Some(SettingValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(SettingValue::Number),
            _ => None,
        }
    }

    /// Parse user input: `true`/`false` or a number
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "true" => Some(SettingValue::Bool(true)),
            "false" => Some(SettingValue::Bool(false)),
            other => other.parse::<f64>().ok().map(SettingValue::Number),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            SettingValue::Number(n) => n,
            SettingValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Number(n) => write!(f, "{}", n),
            SettingValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// What a control does when it changes
pub enum SettingAction {
    /// Nothing besides updating the label
    None,
    /// Queue the value for the named device setting
    Send(String),
    /// Hand the value to a local callback
    Callback(Box<dyn FnMut(SettingValue) + Send>),
}

impl SettingAction {
    pub fn send(name: &str) -> Self {
        SettingAction::Send(name.to_string())
    }

    pub fn callback(f: impl FnMut(SettingValue) + Send + 'static) -> Self {
        SettingAction::Callback(Box::new(f))
    }

    fn setting_name(&self) -> Option<&str> {
        match self {
            SettingAction::Send(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Debug for SettingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingAction::None => write!(f, "None"),
            SettingAction::Send(name) => write!(f, "Send({:?})", name),
            SettingAction::Callback(_) => write!(f, "Callback"),
        }
    }
}

#[derive(Debug)]
pub struct Slider {
    pub id: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    value: f64,
    zero_label: String,
    unit: String,
    action: SettingAction,
    sync_with: Option<String>,
}

impl Slider {
    /// New slider; `default` is clamped into `[min, max]`
    pub fn new(id: &str, min: f64, max: f64, default: f64, step: f64) -> Result<Self, ControlError> {
        if !(min <= max) {
            return Err(ControlError::InvalidRange { min, max });
        }
        Ok(Slider {
            id: id.to_string(),
            min,
            max,
            step,
            value: if default.is_nan() { min } else { default.clamp(min, max) },
            zero_label: "0".to_string(),
            unit: String::new(),
            action: SettingAction::None,
            sync_with: None,
        })
    }

    /// Text shown instead of `0`
    pub fn zero_label(mut self, text: &str) -> Self {
        self.zero_label = text.to_string();
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn action(mut self, action: SettingAction) -> Self {
        self.action = action;
        self
    }

    /// Mirror every change into another slider
    pub fn sync_with(mut self, id: &str) -> Self {
        self.sync_with = Some(id.to_string());
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label(&self) -> String {
        if self.value == 0.0 {
            self.zero_label.clone()
        } else {
            format!("{}{}", self.value, self.unit)
        }
    }

    fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }
}

#[derive(Debug)]
pub struct LookupSlider {
    pub id: String,
    index: usize,
    table: Vec<f64>,
    action: SettingAction,
}

impl LookupSlider {
    /// Slider over the entries of `table`, positioned at `default_index`
    pub fn new(id: &str, default_index: usize, table: Vec<f64>) -> Result<Self, ControlError> {
        if table.is_empty() {
            return Err(ControlError::EmptyLookup);
        }
        Ok(LookupSlider {
            id: id.to_string(),
            index: default_index.min(table.len() - 1),
            table,
            action: SettingAction::None,
        })
    }

    pub fn action(mut self, action: SettingAction) -> Self {
        self.action = action;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> f64 {
        self.table[self.index]
    }

    pub fn label(&self) -> String {
        self.value().to_string()
    }

    /// Index of the table entry closest to `x`; the first one wins on ties
    pub fn nearest_index(&self, x: f64) -> usize {
        self.table
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(best, dist), (i, v)| {
                let d = (x - v).abs();
                if d < dist {
                    (i, d)
                } else {
                    (best, dist)
                }
            })
            .0
    }
}

#[derive(Debug)]
pub struct Checkbox {
    pub id: String,
    checked: bool,
    action: SettingAction,
}

impl Checkbox {
    pub fn new(id: &str, checked: bool) -> Self {
        Checkbox {
            id: id.to_string(),
            checked,
            action: SettingAction::None,
        }
    }

    pub fn action(mut self, action: SettingAction) -> Self {
        self.action = action;
        self
    }

    pub fn checked(&self) -> bool {
        self.checked
    }
}

pub struct Button {
    pub id: String,
    on_click: Option<Box<dyn FnMut() + Send>>,
}

impl Button {
    pub fn new(id: &str) -> Self {
        Button {
            id: id.to_string(),
            on_click: None,
        }
    }

    pub fn on_click(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_click = Some(Box::new(f));
        self
    }
}

pub enum Control {
    Slider(Slider),
    Lookup(LookupSlider),
    Checkbox(Checkbox),
    Button(Button),
}

/// Pending setting changes, sent together as one settings packet
#[derive(Debug, Clone)]
pub struct SettingsQueue {
    pending: Map<String, Value>,
    rand_id: u32,
}

impl Default for SettingsQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsQueue {
    pub fn new() -> Self {
        // zero means "no id" to the device
        let rand_id = rand::thread_rng().gen_range(1..=i32::MAX as u32);
        Self::with_rand_id(rand_id)
    }

    pub fn with_rand_id(rand_id: u32) -> Self {
        SettingsQueue {
            pending: Map::new(),
            rand_id,
        }
    }

    /// Identifier the device echoes back in its status frames
    pub fn rand_id(&self) -> u32 {
        self.rand_id
    }

    /// Queue a value; a later value for the same name replaces the earlier one
    pub fn set(&mut self, name: &str, value: Value) {
        debug!("queue setting {} = {}", name, value);
        self.pending.insert(name.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Drain the queue into a settings packet, `None` if nothing is pending
    pub fn take(&mut self) -> Option<DeviceCommand> {
        if self.pending.is_empty() {
            return None;
        }
        let mut settings = std::mem::take(&mut self.pending);
        settings.insert("rand_id".to_string(), Value::from(self.rand_id));
        Some(DeviceCommand::Settings { settings })
    }
}

/// Run a control's action; without a queue, device settings are not sent
fn run_action(action: &mut SettingAction, queue: Option<&mut SettingsQueue>, value: SettingValue) {
    match action {
        SettingAction::None => {}
        SettingAction::Send(name) => match queue {
            Some(queue) => {
                info!("auto sending \"{}\" = {}", name, value);
                queue.set(name, value.to_json());
            }
            None => debug!("\"{}\" = {} came from the device, not sent", name, value),
        },
        SettingAction::Callback(f) => f(value),
    }
}

/// Registry of controls and the settings queue they feed
#[derive(Default)]
pub struct ControlPanel {
    controls: HashMap<String, Control>,
    /// setting name -> control id
    bindings: HashMap<String, String>,
    queue: SettingsQueue,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(queue: SettingsQueue) -> Self {
        ControlPanel {
            controls: HashMap::new(),
            bindings: HashMap::new(),
            queue,
        }
    }

    pub fn queue(&self) -> &SettingsQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut SettingsQueue {
        &mut self.queue
    }

    fn register(&mut self, id: String, setting: Option<&str>, control: Control) {
        if let Some(name) = setting {
            self.bindings.insert(name.to_string(), id.clone());
        }
        self.controls.insert(id, control);
    }

    pub fn add_slider(&mut self, slider: Slider) {
        let setting = slider.action.setting_name().map(str::to_string);
        self.register(slider.id.clone(), setting.as_deref(), Control::Slider(slider));
    }

    pub fn add_lookup(&mut self, slider: LookupSlider) {
        let setting = slider.action.setting_name().map(str::to_string);
        self.register(slider.id.clone(), setting.as_deref(), Control::Lookup(slider));
    }

    pub fn add_checkbox(&mut self, checkbox: Checkbox) {
        let setting = checkbox.action.setting_name().map(str::to_string);
        self.register(checkbox.id.clone(), setting.as_deref(), Control::Checkbox(checkbox));
    }

    pub fn add_button(&mut self, button: Button) {
        self.register(button.id.clone(), None, Control::Button(button));
    }

    pub fn get(&self, id: &str) -> Option<&Control> {
        self.controls.get(id)
    }

    /// Control bound to a device setting
    pub fn bound_control(&self, setting: &str) -> Option<&str> {
        self.bindings.get(setting).map(String::as_str)
    }

    /// Current label text of a slider or lookup slider
    pub fn label(&self, id: &str) -> Option<String> {
        match self.controls.get(id)? {
            Control::Slider(s) => Some(s.label()),
            Control::Lookup(l) => Some(l.label()),
            Control::Checkbox(c) => Some(c.checked.to_string()),
            Control::Button(_) => None,
        }
    }

    /// Current value of a control, if it has one
    pub fn value(&self, id: &str) -> Option<SettingValue> {
        match self.controls.get(id)? {
            Control::Slider(s) => Some(SettingValue::Number(s.value)),
            Control::Lookup(l) => Some(SettingValue::Number(l.value())),
            Control::Checkbox(c) => Some(SettingValue::Bool(c.checked)),
            Control::Button(_) => None,
        }
    }

    /// Move a slider (by value) or lookup slider (by index) and run its action
    ///
    /// Returns the new label.
    pub fn slide(&mut self, id: &str, v: f64) -> Result<String, ControlError> {
        self.slide_inner(id, v, true)
    }

    fn slide_inner(&mut self, id: &str, v: f64, send: bool) -> Result<String, ControlError> {
        if v.is_nan() {
            return Err(ControlError::NotANumber(id.to_string()));
        }
        let queue = send.then_some(&mut self.queue);
        let (label, sync) = match self.controls.get_mut(id) {
            Some(Control::Slider(s)) => {
                s.value = s.clamp(v);
                let label = s.label();
                debug!("slider \"{}\" evt = {}", id, label);
                run_action(&mut s.action, queue, SettingValue::Number(s.value));
                (label, s.sync_with.clone())
            }
            Some(Control::Lookup(l)) => {
                l.index = (v.max(0.0) as usize).min(l.table.len() - 1);
                let label = l.label();
                let value = l.value();
                debug!("slider \"{}\" evt = {}", id, label);
                run_action(&mut l.action, queue, SettingValue::Number(value));
                (label, None)
            }
            _ => return Err(ControlError::UnknownControl(id.to_string())),
        };
        // the requested value travels along the chain, not the clamped one
        if let Some(target) = sync {
            self.sync_inner(&target, v, send)?;
        }
        Ok(label)
    }

    /// Set a slider to `v` and run its handler, unless it already sits there
    pub fn sync(&mut self, id: &str, v: f64) -> Result<(), ControlError> {
        self.sync_inner(id, v, true)
    }

    fn sync_inner(&mut self, id: &str, v: f64, send: bool) -> Result<(), ControlError> {
        match self.controls.get(id) {
            Some(Control::Slider(s)) => {
                // a slider already at clamp(v) ends the chain, so cycles terminate
                if s.clamp(v) != s.value {
                    self.slide_inner(id, v, send)?;
                }
                Ok(())
            }
            _ => Err(ControlError::UnknownControl(id.to_string())),
        }
    }

    pub fn toggle(&mut self, id: &str, checked: bool) -> Result<(), ControlError> {
        match self.controls.get_mut(id) {
            Some(Control::Checkbox(c)) => {
                c.checked = checked;
                debug!("checkbox \"{}\" on_change: {}", id, checked);
                run_action(&mut c.action, Some(&mut self.queue), SettingValue::Bool(checked));
                Ok(())
            }
            _ => Err(ControlError::UnknownControl(id.to_string())),
        }
    }

    pub fn click(&mut self, id: &str) -> Result<(), ControlError> {
        match self.controls.get_mut(id) {
            Some(Control::Button(b)) => {
                debug!("button \"{}\" click", id);
                if let Some(f) = b.on_click.as_mut() {
                    f();
                }
                Ok(())
            }
            _ => Err(ControlError::UnknownControl(id.to_string())),
        }
    }

    /// Show settings reported by the device in the bound controls
    ///
    /// Slider values are clamped, lookup sliders move to the nearest entry. Local
    /// callbacks (including those of synced sliders) run, but nothing is queued back
    /// to the device. Returns how many controls were updated.
    pub fn autopopulate(&mut self, settings: &Map<String, Value>) -> usize {
        let mut updated = 0;
        for (name, raw) in settings {
            let Some(id) = self.bindings.get(name).cloned() else {
                continue;
            };
            let Some(value) = SettingValue::from_json(raw) else {
                continue;
            };
            let applied = match self.controls.get_mut(&id) {
                Some(Control::Slider(s)) => {
                    let x = s.clamp(value.as_f64());
                    self.sync_inner(&id, x, false)
                }
                Some(Control::Lookup(l)) => {
                    let index = l.nearest_index(value.as_f64());
                    self.slide_inner(&id, index as f64, false).map(|_| ())
                }
                Some(Control::Checkbox(c)) => {
                    c.checked = match value {
                        SettingValue::Bool(b) => b,
                        SettingValue::Number(n) => n != 0.0,
                    };
                    Ok(())
                }
                _ => continue,
            };
            match applied {
                Ok(()) => updated += 1,
                Err(e) => debug!("autopopulate \"{}\": {}", name, e),
            }
        }
        updated
    }

    /// Drain queued settings into one packet
    pub fn flush(&mut self) -> Option<DeviceCommand> {
        self.queue.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn settings_of(cmd: DeviceCommand) -> Map<String, Value> {
        match cmd {
            DeviceCommand::Settings { settings } => settings,
            other => panic!("expected settings, got {:?}", other),
        }
    }

    #[test]
    fn test_slider_default_clamped_and_label() {
        let s = Slider::new("gain", 0.0, 100.0, 150.0, 1.0).unwrap().zero_label("auto").unit("%");
        assert_eq!(s.value(), 100.0);
        assert_eq!(s.label(), "100%");
        let s = Slider::new("gain", 0.0, 100.0, 0.0, 1.0).unwrap().zero_label("auto");
        assert_eq!(s.label(), "auto");
    }

    #[test]
    fn test_slide_queues_setting() {
        let mut panel = ControlPanel::with_queue(SettingsQueue::with_rand_id(42));
        panel.add_slider(
            Slider::new("sld_gain", 0.0, 100.0, 10.0, 1.0).unwrap()
                .unit("dB")
                .action(SettingAction::send("gain")),
        );
        assert_eq!(panel.slide("sld_gain", 20.0).unwrap(), "20dB");
        assert_eq!(panel.slide("sld_gain", 30.0).unwrap(), "30dB");
        assert_eq!(panel.bound_control("gain"), Some("sld_gain"));

        let settings = settings_of(panel.flush().unwrap());
        assert_eq!(settings.get("gain"), Some(&json!(30)));
        assert_eq!(settings.get("rand_id"), Some(&json!(42)));
        assert_eq!(settings.len(), 2);
        assert!(panel.flush().is_none());
    }

    #[test]
    fn test_slide_callback_and_sync() {
        let seen: Arc<Mutex<Vec<SettingValue>>> = Arc::default();
        let s = seen.clone();
        let mut panel = ControlPanel::new();
        panel.add_slider(
            Slider::new("a", 0.0, 10.0, 1.0, 1.0).unwrap()
                .action(SettingAction::callback(move |v| s.lock().unwrap().push(v)))
                .sync_with("b"),
        );
        panel.add_slider(
            Slider::new("b", 0.0, 10.0, 1.0, 1.0).unwrap()
                .action(SettingAction::send("b_setting"))
                .sync_with("a"),
        );
        panel.slide("a", 7.0).unwrap();
        assert_eq!(panel.value("b"), Some(SettingValue::Number(7.0)));
        assert_eq!(*seen.lock().unwrap(), vec![SettingValue::Number(7.0)]);
        assert_eq!(panel.queue().len(), 1);

        // out of range input is clamped
        panel.slide("a", 99.0).unwrap();
        assert_eq!(panel.value("a"), Some(SettingValue::Number(10.0)));
    }

    #[test]
    fn test_mutual_sync_with_disjoint_ranges_terminates() {
        let mut panel = ControlPanel::new();
        panel.add_slider(Slider::new("a", 0.0, 10.0, 0.0, 1.0).unwrap().sync_with("b"));
        panel.add_slider(Slider::new("b", 20.0, 30.0, 25.0, 1.0).unwrap().sync_with("a"));

        panel.slide("a", 7.0).unwrap();
        assert_eq!(panel.value("a"), Some(SettingValue::Number(7.0)));
        assert_eq!(panel.value("b"), Some(SettingValue::Number(20.0)));

        // both ends clamp
        panel.slide("a", 99.0).unwrap();
        assert_eq!(panel.value("a"), Some(SettingValue::Number(10.0)));
        assert_eq!(panel.value("b"), Some(SettingValue::Number(30.0)));
    }

    #[test]
    fn test_slider_rejects_bad_range_and_nan() {
        assert_eq!(
            Slider::new("x", 10.0, 0.0, 5.0, 1.0).unwrap_err(),
            ControlError::InvalidRange { min: 10.0, max: 0.0 }
        );
        assert!(Slider::new("x", f64::NAN, 1.0, 0.0, 1.0).is_err());
        let s = Slider::new("x", 1.0, 5.0, f64::NAN, 1.0).unwrap();
        assert_eq!(s.value(), 1.0);

        let mut panel = ControlPanel::new();
        panel.add_slider(Slider::new("x", 0.0, 5.0, 1.0, 1.0).unwrap());
        assert_eq!(
            panel.slide("x", f64::NAN),
            Err(ControlError::NotANumber("x".to_string()))
        );
        assert_eq!(panel.value("x"), Some(SettingValue::Number(1.0)));
    }

    #[test]
    fn test_autopopulate_runs_callbacks_only() {
        let seen: Arc<Mutex<Vec<SettingValue>>> = Arc::default();
        let s = seen.clone();
        let mut panel = ControlPanel::with_queue(SettingsQueue::with_rand_id(5));
        panel.add_slider(
            Slider::new("sld_exp", 0.0, 10.0, 1.0, 1.0)
                .unwrap()
                .action(SettingAction::send("exposure"))
                .sync_with("sld_exp_local"),
        );
        panel.add_slider(
            Slider::new("sld_exp_local", 0.0, 10.0, 1.0, 1.0)
                .unwrap()
                .action(SettingAction::callback(move |v| s.lock().unwrap().push(v))),
        );

        let incoming = json!({"exposure": 4});
        assert_eq!(panel.autopopulate(incoming.as_object().unwrap()), 1);
        assert_eq!(panel.value("sld_exp_local"), Some(SettingValue::Number(4.0)));
        assert_eq!(*seen.lock().unwrap(), vec![SettingValue::Number(4.0)]);
        assert!(panel.queue().is_empty());

        // same value again: nothing moves, nothing runs
        panel.autopopulate(incoming.as_object().unwrap());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_lookup_slider() {
        assert_eq!(
            LookupSlider::new("x", 0, vec![]).unwrap_err(),
            ControlError::EmptyLookup
        );
        let mut panel = ControlPanel::with_queue(SettingsQueue::with_rand_id(1));
        panel.add_lookup(
            LookupSlider::new("sld_shutter", 9, vec![50.0, 100.0, 250.0, 500.0])
                .unwrap()
                .action(SettingAction::send("shutter")),
        );
        assert_eq!(panel.label("sld_shutter").unwrap(), "500");
        assert_eq!(panel.slide("sld_shutter", 1.0).unwrap(), "100");
        let settings = settings_of(panel.flush().unwrap());
        assert_eq!(settings.get("shutter"), Some(&json!(100)));
    }

    #[test]
    fn test_nearest_index() {
        let l = LookupSlider::new("x", 0, vec![50.0, 100.0, 250.0]).unwrap();
        assert_eq!(l.nearest_index(0.0), 0);
        assert_eq!(l.nearest_index(170.0), 1);
        assert_eq!(l.nearest_index(180.0), 2);
        assert_eq!(l.nearest_index(75.0), 0);
    }

    #[test]
    fn test_checkbox_and_button() {
        let clicks: Arc<Mutex<u32>> = Arc::default();
        let c = clicks.clone();
        let mut panel = ControlPanel::with_queue(SettingsQueue::with_rand_id(5));
        panel.add_checkbox(Checkbox::new("chk_leds", true).action(SettingAction::send("use_leds")));
        panel.add_button(Button::new("btn_start").on_click(move || *c.lock().unwrap() += 1));

        panel.toggle("chk_leds", false).unwrap();
        panel.click("btn_start").unwrap();
        panel.click("btn_start").unwrap();
        assert_eq!(*clicks.lock().unwrap(), 2);
        assert_eq!(panel.value("chk_leds"), Some(SettingValue::Bool(false)));
        let settings = settings_of(panel.flush().unwrap());
        assert_eq!(settings.get("use_leds"), Some(&json!(false)));

        assert_eq!(
            panel.click("chk_leds"),
            Err(ControlError::UnknownControl("chk_leds".to_string()))
        );
        assert!(panel.toggle("missing", true).is_err());
    }

    #[test]
    fn test_autopopulate() {
        let mut panel = ControlPanel::with_queue(SettingsQueue::with_rand_id(5));
        panel.add_slider(
            Slider::new("sld_gain", 0.0, 64.0, 16.0, 1.0).unwrap()
                .action(SettingAction::send("gain"))
                .sync_with("sld_gain_mirror"),
        );
        panel.add_slider(Slider::new("sld_gain_mirror", 0.0, 64.0, 16.0, 1.0).unwrap());
        panel.add_lookup(
            LookupSlider::new("sld_shutter", 0, vec![50.0, 100.0, 250.0])
                .unwrap()
                .action(SettingAction::send("shutter")),
        );
        panel.add_checkbox(Checkbox::new("chk_refr", false).action(SettingAction::send("use_refraction")));

        let incoming = json!({
            "gain": 100,
            "shutter": 240,
            "use_refraction": true,
            "thresh": 3,
            "center_x": "not a number"
        });
        let updated = panel.autopopulate(incoming.as_object().unwrap());
        assert_eq!(updated, 3);
        assert_eq!(panel.value("sld_gain"), Some(SettingValue::Number(64.0)));
        assert_eq!(panel.value("sld_gain_mirror"), Some(SettingValue::Number(64.0)));
        assert_eq!(panel.label("sld_shutter").unwrap(), "250");
        assert_eq!(panel.value("chk_refr"), Some(SettingValue::Bool(true)));
        assert!(panel.queue().is_empty());
    }

    #[test]
    fn test_setting_value_parse_and_json() {
        assert_eq!(SettingValue::parse("true"), Some(SettingValue::Bool(true)));
        assert_eq!(SettingValue::parse(" 2.5 "), Some(SettingValue::Number(2.5)));
        assert_eq!(SettingValue::parse("abc"), None);
        assert_eq!(SettingValue::Number(3.0).to_json(), json!(3));
        assert_eq!(SettingValue::Number(2.5).to_json(), json!(2.5));
        assert_eq!(SettingValue::Bool(false).to_string(), "false");
    }

    #[test]
    fn test_random_id_is_nonzero() {
        for _ in 0..100 {
            assert_ne!(SettingsQueue::new().rand_id(), 0);
        }
    }
}
