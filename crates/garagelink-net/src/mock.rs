//! Scripted in-memory connector for tests.
//!
//! Every accepted connect yields a [`MockRemote`] playing the server side of
//! the session. Keep remotes alive for as long as the session should stay
//! open: dropping one looks like the socket vanishing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use url::Url;

use garagelink_shared::error::TransportError;

use crate::endpoint::display_url;
use crate::session::{ConnectFuture, Connector, Frame, SessionEvent, SessionHandle};

#[derive(Default)]
struct MockState {
    refused_ports: HashSet<u16>,
    attempts: Vec<Url>,
}

struct MockInner {
    state: Mutex<MockState>,
    remotes_tx: mpsc::UnboundedSender<MockRemote>,
    remotes_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockRemote>>,
}

#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<MockInner>,
}

impl MockConnector {
    pub fn new() -> Self {
        let (remotes_tx, remotes_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState::default()),
                remotes_tx,
                remotes_rx: tokio::sync::Mutex::new(remotes_rx),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connects to `port` fail until [`accept_port`](Self::accept_port).
    pub fn refuse_port(&self, port: u16) {
        self.state().refused_ports.insert(port);
    }

    pub fn accept_port(&self, port: u16) {
        self.state().refused_ports.remove(&port);
    }

    /// Every URL a connect was attempted on, in order.
    pub fn attempts(&self) -> Vec<Url> {
        self.state().attempts.clone()
    }

    pub fn attempted_ports(&self) -> Vec<u16> {
        self.state()
            .attempts
            .iter()
            .filter_map(|url| url.port())
            .collect()
    }

    /// Server side of the next accepted session.
    pub async fn next_remote(&self) -> Option<MockRemote> {
        self.inner.remotes_rx.lock().await.recv().await
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: Url) -> ConnectFuture {
        let refused = {
            let mut state = self.state();
            state.attempts.push(url.clone());
            url.port().is_some_and(|p| state.refused_ports.contains(&p))
        };

        if refused {
            let err = TransportError::Connect {
                url: display_url(&url),
                reason: "connection refused".to_string(),
            };
            return Box::pin(futures::future::ready(Err(err)));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let _ = self.inner.remotes_tx.send(MockRemote {
            url: url.clone(),
            to_client: inbound_tx,
            from_client: outbound_rx,
        });

        Box::pin(futures::future::ready(Ok(SessionHandle::new(
            url,
            outbound_tx,
            inbound_rx,
        ))))
    }
}

/// Server end of one mock session.
#[derive(Debug)]
pub struct MockRemote {
    url: Url,
    to_client: mpsc::UnboundedSender<SessionEvent>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl MockRemote {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// Push a JSON payload as a text frame. `false` once the client is gone.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send_text(&value.to_string())
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.to_client
            .send(SessionEvent::Text(text.to_string()))
            .is_ok()
    }

    /// Close from the server side. `None` means no close frame was seen.
    pub fn close(&self, code: Option<u16>) {
        let _ = self.to_client.send(SessionEvent::Closed {
            code,
            reason: String::new(),
        });
    }

    /// Report a socket error followed by an abnormal close.
    pub fn fail(&self, reason: &str) {
        let _ = self.to_client.send(SessionEvent::Error(reason.to_string()));
        self.close(None);
    }

    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    pub fn try_next_frame(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }
}
