// Outbound transport
// The session writes through a Transport; over a live socket this is a channel into
// the writer task that owns the sink half of the WebSocket.

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use super::session::SessionError;

pub trait Transport: Send {
    /// Queue one text frame
    fn send_text(&mut self, text: &str) -> Result<(), SessionError>;

    /// Start a graceful close; later sends fail
    fn close(&mut self);
}

/// Transport feeding the socket writer task
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Message>,
    closed: bool,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        ChannelTransport { tx, closed: false }
    }
}

impl Transport for ChannelTransport {
    fn send_text(&mut self, text: &str) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.tx
            .send(Message::text(text))
            .map_err(|_| SessionError::Closed)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(Message::Close(None));
        }
    }
}

/// Pump queued frames into the socket until a close frame is written or the queue ends
pub async fn write_loop<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<Message>)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            warn!("socket write failed: {}", e);
            break;
        }
        if is_close {
            break;
        }
    }
    debug!("socket writer finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_channel_transport_queues_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut t = ChannelTransport::new(tx);
        t.send_text("ping").unwrap();
        assert_eq!(rx.try_recv().unwrap(), Message::text("ping"));
    }

    #[test]
    fn test_channel_transport_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut t = ChannelTransport::new(tx);
        t.close();
        t.close();
        assert!(matches!(rx.try_recv().unwrap(), Message::Close(None)));
        assert!(rx.try_recv().is_err());
        assert!(matches!(t.send_text("late"), Err(SessionError::Closed)));
    }

    #[test]
    fn test_channel_transport_receiver_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut t = ChannelTransport::new(tx);
        assert!(matches!(t.send_text("x"), Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_write_loop_stops_after_close() {
        let (tx, rx) = mpsc::unbounded_channel();
        let written: Arc<Mutex<Vec<Message>>> = Arc::default();
        let w = written.clone();
        let sink = futures_util::sink::unfold((), move |(), msg: Message| {
            let w = w.clone();
            async move {
                w.lock().unwrap().push(msg);
                Ok::<_, Infallible>(())
            }
        });
        tx.send(Message::text("a")).unwrap();
        tx.send(Message::Close(None)).unwrap();
        tx.send(Message::text("b")).unwrap();
        write_loop(Box::pin(sink), rx).await;
        assert_eq!(*written.lock().unwrap(), vec![Message::text("a"), Message::Close(None)]);
    }

    #[tokio::test]
    async fn test_write_loop_stops_on_write_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        let attempts: Arc<Mutex<u32>> = Arc::default();
        let a = attempts.clone();
        let sink = futures_util::sink::unfold((), move |(), _msg: Message| {
            let a = a.clone();
            async move {
                *a.lock().unwrap() += 1;
                Err::<(), _>("connection reset")
            }
        });
        tx.send(Message::text("a")).unwrap();
        tx.send(Message::text("b")).unwrap();
        write_loop(Box::pin(sink), rx).await;
        assert_eq!(*attempts.lock().unwrap(), 1);
    }
}
