// Network layer module
// WebSocket session to the guide-camera device

pub mod dispatch;
pub mod messages;
pub mod ping;
pub mod session;
pub mod transport;

pub use dispatch::{classify, Inbound, SessionHandlers};
pub use messages::{DeviceCommand, FetchRequest};
pub use ping::PingTimer;
pub use session::{socket_url, Command, Payload, Session, SessionError, SessionHandle, SessionState};
pub use transport::{ChannelTransport, Transport};
