//! Socket sessions: one live connection to one endpoint.
//!
//! A session knows nothing about message semantics. The transport side runs
//! in its own task and talks to the owner through two mpsc channels, so the
//! owner never touches the socket object directly.

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use url::Url;

use garagelink_shared::error::TransportError;

/// Frames sent *into* a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Events sent *from* a session to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A text frame.
    Text(String),
    /// A socket-level error. Informational; a `Closed` follows when the
    /// socket is unusable.
    Error(String),
    /// The socket is gone. `code` is `None` when no close frame was seen.
    Closed { code: Option<u16>, reason: String },
}

/// Owner side of a connected session.
#[derive(Debug)]
pub struct SessionHandle {
    url: Url,
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionHandle {
    pub fn new(
        url: Url,
        outbound: mpsc::UnboundedSender<Frame>,
        inbound: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Self {
        Self {
            url,
            outbound,
            inbound,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Frame::Text(text))
            .map_err(|_| TransportError::SessionClosed)
    }

    /// Close the socket with `code` and discard the session. Best-effort:
    /// a transport that is already gone is simply dropped.
    pub fn close(self, code: u16, reason: &str) {
        let _ = self.outbound.send(Frame::Close {
            code,
            reason: reason.to_string(),
        });
    }

    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.inbound.recv().await
    }
}

pub type ConnectFuture = BoxFuture<'static, Result<SessionHandle, TransportError>>;

/// Opens socket sessions. Implemented by the tokio-tungstenite transport
/// and by the in-memory mock used in tests.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: Url) -> ConnectFuture;
}
