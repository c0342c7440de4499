// Inbound frame dispatch
// Handler registry for session events and classification of text frames

use serde_json::{Map, Value};
use tokio_tungstenite::tungstenite::Message;

use super::session::SessionError;

pub type OpenHandler = Box<dyn FnMut() + Send>;
pub type RawHandler = Box<dyn FnMut(&Message) + Send>;
pub type JsonHandler = Box<dyn FnMut(Map<String, Value>) + Send>;
pub type StringHandler = Box<dyn FnMut(&str) + Send>;
pub type ErrorHandler = Box<dyn FnMut(&SessionError) + Send>;
pub type CloseHandler = Box<dyn FnMut() + Send>;

/// Callbacks invoked by the session; all optional
///
/// Inbound frames go to `on_message` when it is set and nowhere else. Otherwise text
/// that parses as a JSON object goes to `on_json`, remaining text to `on_string`, and
/// anything still unhandled to `on_data`.
#[derive(Default)]
pub struct SessionHandlers {
    pub(crate) on_open: Option<OpenHandler>,
    pub(crate) on_message: Option<RawHandler>,
    pub(crate) on_json: Option<JsonHandler>,
    pub(crate) on_string: Option<StringHandler>,
    pub(crate) on_data: Option<RawHandler>,
    pub(crate) on_error: Option<ErrorHandler>,
    pub(crate) on_close: Option<CloseHandler>,
}

impl SessionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_open(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl FnMut(&Message) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    pub fn on_json(mut self, f: impl FnMut(Map<String, Value>) + Send + 'static) -> Self {
        self.on_json = Some(Box::new(f));
        self
    }

    pub fn on_string(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_string = Some(Box::new(f));
        self
    }

    pub fn on_data(mut self, f: impl FnMut(&Message) + Send + 'static) -> Self {
        self.on_data = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&SessionError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called when the connection drops without `close()` having been requested
    pub fn on_close(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }
}

/// A classified text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<'a> {
    /// A JSON object
    Json(Map<String, Value>),
    /// Anything else, trimmed
    Text(&'a str),
}

/// Trim a text frame and decode it when it looks like a JSON object
///
/// Text wrapped in braces that fails to parse is returned as plain text.
pub fn classify(text: &str) -> Inbound<'_> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(map) = serde_json::from_str::<Map<String, Value>>(trimmed) {
            return Inbound::Json(map);
        }
    }
    Inbound::Text(trimmed)
}
