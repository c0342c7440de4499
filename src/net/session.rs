// Session client
// Owns the single WebSocket connection to the device: lifecycle, inbound dispatch,
// debounced keep-alive and one-shot retransmit of the last payload.

use std::fmt;
use std::sync::OnceLock;

use futures_util::StreamExt;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::dispatch::{classify, Inbound, SessionHandlers};
use super::messages::FetchRequest;
use super::ping::PingTimer;
use super::transport::{write_loop, ChannelTransport, Transport};
use crate::constants::PING_PAYLOAD;
use crate::mathutils::now_epoch2000;

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Error,
}

/// Errors raised by the session layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The page URL has no recognisable host
    InvalidPageUrl(String),
    /// `init` has not produced a socket URL yet
    NotInitialized,
    Connect(String),
    Transport(String),
    /// The connection or the session task is gone
    Closed,
    Serialize(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::InvalidPageUrl(url) => write!(f, "cannot find a host in page URL '{}'", url),
            SessionError::NotInitialized => write!(f, "session not initialized"),
            SessionError::Connect(e) => write!(f, "connect failed: {}", e),
            SessionError::Transport(e) => write!(f, "socket error: {}", e),
            SessionError::Closed => write!(f, "connection closed"),
            SessionError::Serialize(e) => write!(f, "cannot serialize payload: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// Outbound payload: raw text or a JSON value serialized on send
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    fn into_text(self) -> String {
        match self {
            Payload::Text(s) => s,
            Payload::Json(v) => v.to_string(),
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Payload::Json(v)
    }
}

/// Requests accepted by a running session
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(Payload),
    Retransmit,
    PingDelay,
    Fetch { shortname: String, filename: String },
    /// Deliberate shutdown; the close handler does not fire
    Close,
}

/// Cloneable handle for queueing commands to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// New handle plus the receiver to pass to [`Session::run`]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionHandle { tx }, rx)
    }

    pub fn command(&self, cmd: Command) -> Result<(), SessionError> {
        self.tx.send(cmd).map_err(|_| SessionError::Closed)
    }

    pub fn send(&self, payload: impl Into<Payload>) -> Result<(), SessionError> {
        self.command(Command::Send(payload.into()))
    }

    /// Serialize `value` and queue it
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<(), SessionError> {
        let v = serde_json::to_value(value).map_err(|e| SessionError::Serialize(e.to_string()))?;
        self.send(v)
    }

    pub fn retransmit(&self) -> Result<(), SessionError> {
        self.command(Command::Retransmit)
    }

    pub fn ping_delay(&self) -> Result<(), SessionError> {
        self.command(Command::PingDelay)
    }

    pub fn fetch(&self, shortname: &str, filename: &str) -> Result<(), SessionError> {
        self.command(Command::Fetch {
            shortname: shortname.to_string(),
            filename: filename.to_string(),
        })
    }

    pub fn close(&self) -> Result<(), SessionError> {
        self.command(Command::Close)
    }
}

fn page_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)([a-z]+)://([^/]+)(.*)").expect("valid page url regex"))
}

/// Socket URL for `path` on the host serving `page_url`
pub fn socket_url(page_url: &str, path: &str) -> Result<String, SessionError> {
    let caps = page_url_regex()
        .captures(page_url)
        .ok_or_else(|| SessionError::InvalidPageUrl(page_url.to_string()))?;
    Ok(format!("ws://{}/{}", &caps[2], path))
}

pub struct Session {
    url: Option<String>,
    state: SessionState,
    last_transmission: Option<String>,
    /// A retransmit was asked for while the socket could not take it
    retransmit_pending: bool,
    error_count: u32,
    handlers: SessionHandlers,
    transport: Option<Box<dyn Transport>>,
    ping: PingTimer,
    close_handler_armed: bool,
}

impl Session {
    pub fn new(handlers: SessionHandlers) -> Self {
        Session {
            url: None,
            state: SessionState::Disconnected,
            last_transmission: None,
            retransmit_pending: false,
            error_count: 0,
            handlers,
            transport: None,
            ping: PingTimer::default(),
            close_handler_armed: true,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn last_transmission(&self) -> Option<&str> {
        self.last_transmission.as_deref()
    }

    pub fn ping_timer(&self) -> &PingTimer {
        &self.ping
    }

    /// Resolve the socket URL from the page URL and mark the session as connecting
    ///
    /// On an unparsable page URL nothing changes and the failure is logged.
    pub fn init(&mut self, page_url: &str, path: &str) -> Result<(), SessionError> {
        let url = match socket_url(page_url, path) {
            Ok(url) => url,
            Err(e) => {
                error!("websocket init failed: {}", e);
                return Err(e);
            }
        };
        info!("websocket init to {}", url);
        self.url = Some(url);
        self.state = SessionState::Connecting;
        self.close_handler_armed = true;
        Ok(())
    }

    /// Use `transport` for outbound frames
    pub fn attach(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    fn transmit(&mut self, text: &str) -> bool {
        if self.state != SessionState::Open {
            debug!("not connected, dropped: {}", text);
            return false;
        }
        let Some(transport) = self.transport.as_mut() else {
            debug!("no transport, dropped: {}", text);
            return false;
        };
        match transport.send_text(text) {
            Ok(()) => true,
            Err(e) => {
                debug!("send failed ({}), dropped: {}", e, text);
                false
            }
        }
    }

    /// Send a payload; it is kept as the last transmission whether or not it went out
    pub fn send(&mut self, payload: impl Into<Payload>) {
        let text = payload.into().into_text();
        self.transmit(&text);
        self.last_transmission = Some(text);
    }

    /// Serialize and send `value`
    pub fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), SessionError> {
        let v = serde_json::to_value(value).map_err(|e| SessionError::Serialize(e.to_string()))?;
        self.send(v);
        Ok(())
    }

    /// Resend the last transmission once; returns whether it went out
    ///
    /// While the socket is not open the payload stays stored and goes out as soon as
    /// the connection is usable again (the next open, or the next inbound frame).
    pub fn retransmit(&mut self) -> bool {
        let Some(text) = self.last_transmission.take() else {
            return false;
        };
        if self.state != SessionState::Open {
            debug!("retransmit deferred until the socket recovers: {}", text);
            self.last_transmission = Some(text);
            self.retransmit_pending = true;
            return false;
        }
        info!("retransmitting: {}", text);
        self.retransmit_pending = false;
        self.transmit(&text)
    }

    fn flush_pending_retransmit(&mut self) {
        if self.retransmit_pending {
            self.retransmit();
        }
    }

    pub fn on_open(&mut self) {
        info!("websocket open");
        self.state = SessionState::Open;
        self.error_count = 0;
        self.ping.delay();
        self.flush_pending_retransmit();
        if let Some(f) = self.handlers.on_open.as_mut() {
            f();
        }
    }

    /// Handle one inbound frame
    ///
    /// A frame after an error shows the socket still works: the session is open again
    /// and a deferred retransmit goes out before the slot is cleared.
    pub fn on_message(&mut self, msg: Message) {
        if self.state == SessionState::Error && self.transport.is_some() {
            info!("websocket recovered");
            self.state = SessionState::Open;
            self.flush_pending_retransmit();
        }
        self.last_transmission = None;
        self.retransmit_pending = false;
        self.error_count = 0;

        if let Some(f) = self.handlers.on_message.as_mut() {
            f(&msg);
            return;
        }

        if let Message::Text(text) = &msg {
            match classify(text.as_str()) {
                Inbound::Json(map) => {
                    if let Some(f) = self.handlers.on_json.as_mut() {
                        f(map);
                        return;
                    }
                    let trimmed = text.as_str().trim();
                    if let Some(f) = self.handlers.on_string.as_mut() {
                        f(trimmed);
                        return;
                    }
                }
                Inbound::Text(trimmed) => {
                    if let Some(f) = self.handlers.on_string.as_mut() {
                        f(trimmed);
                        return;
                    }
                }
            }
        }

        match self.handlers.on_data.as_mut() {
            Some(f) => f(&msg),
            None => info!("websocket message {}", msg),
        }
    }

    pub fn on_error(&mut self, err: SessionError) {
        warn!("websocket error {}", err);
        self.error_count += 1;
        self.state = SessionState::Error;
        if let Some(f) = self.handlers.on_error.as_mut() {
            f(&err);
        }
    }

    /// The connection went away
    ///
    /// The close handler only runs when the close was not requested through `close()`.
    pub fn on_close(&mut self) {
        self.state = SessionState::Disconnected;
        self.transport = None;
        self.ping.cancel();
        if !self.close_handler_armed {
            return;
        }
        info!("websocket closed unexpectedly");
        if let Some(f) = self.handlers.on_close.as_mut() {
            f();
        }
    }

    /// Push the next keep-alive out by a full period
    pub fn ping_delay(&mut self) {
        self.ping.delay();
    }

    /// Send the keep-alive and restart its countdown
    pub fn ping_send(&mut self) {
        self.transmit(PING_PAYLOAD);
        self.ping.delay();
    }

    /// Ask the device to push back a file
    pub fn fetch(&mut self, shortname: &str, filename: &str) {
        self.ping_delay();
        let req = FetchRequest::new(shortname, filename, now_epoch2000());
        if let Err(e) = self.send_json(&req) {
            warn!("fetch {}: {}", shortname, e);
        }
    }

    /// Deliberate shutdown
    pub fn close(&mut self) {
        self.close_handler_armed = false;
        self.retransmit_pending = false;
        if let Some(mut t) = self.transport.take() {
            t.close();
        }
        self.ping.cancel();
        self.state = SessionState::Disconnected;
        info!("websocket closed");
    }

    /// Apply one queued command; returns false once the session should stop
    pub fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Send(payload) => self.send(payload),
            Command::Retransmit => {
                self.retransmit();
            }
            Command::PingDelay => self.ping_delay(),
            Command::Fetch {
                shortname,
                filename,
            } => self.fetch(&shortname, &filename),
            Command::Close => {
                self.close();
                return false;
            }
        }
        true
    }

    /// Connect and drive the session until it closes
    ///
    /// Dropping every [`SessionHandle`] counts as a deliberate close.
    pub async fn run(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) -> Result<(), SessionError> {
        let url = self.url.clone().ok_or(SessionError::NotInitialized)?;
        self.close_handler_armed = true;

        let (ws, _) = match connect_async(url.as_str()).await {
            Ok(conn) => conn,
            Err(e) => {
                let err = SessionError::Connect(e.to_string());
                self.on_error(err.clone());
                return Err(err);
            }
        };
        let (sink, mut stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_loop(sink, rx));
        self.attach(Box::new(ChannelTransport::new(tx)));
        self.on_open();

        loop {
            let ping_at = self.ping.deadline();
            tokio::select! {
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Close(_))) | None => {
                            self.on_close();
                            break;
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                        Some(Ok(msg)) => self.on_message(msg),
                        Some(Err(e)) => self.on_error(SessionError::Transport(e.to_string())),
                    }
                }
                cmd = commands.recv() => {
                    let keep_going = match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            self.close();
                            false
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }
                _ = sleep_until(ping_at.unwrap_or_else(Instant::now)), if ping_at.is_some() => {
                    if self.ping.is_due(Instant::now()) {
                        self.ping_send();
                    }
                }
            }
        }

        if let Err(e) = writer.await {
            debug!("socket writer task: {}", e);
        }
        Ok(())
    }
}
