//! WebSocket transport built on tokio-tungstenite.
//!
//! Each connected socket gets a pump task that forwards frames between the
//! websocket and the [`SessionHandle`] channels. Dropping the handle closes
//! the socket with a normal-closure code.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use garagelink_shared::constants::NORMAL_CLOSURE;
use garagelink_shared::error::TransportError;

use crate::endpoint::display_url;
use crate::session::{ConnectFuture, Connector, Frame, SessionEvent, SessionHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for the TCP + TLS + upgrade handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects real websockets.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: Url) -> ConnectFuture {
        let connect_timeout = self.connect_timeout;
        Box::pin(async move {
            let shown = display_url(&url);

            let (ws, _response) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::Connect {
                    url: shown.clone(),
                    reason: format!("timed out after {}ms", connect_timeout.as_millis()),
                })?
                .map_err(|e| TransportError::Connect {
                    url: shown.clone(),
                    reason: e.to_string(),
                })?;

            debug!(url = %shown, "Websocket handshake complete");

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            tokio::spawn(pump(ws, outbound_rx, inbound_tx, shown));

            Ok(SessionHandle::new(url, outbound_tx, inbound_rx))
        })
    }
}

async fn pump(
    ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    inbound: mpsc::UnboundedSender<SessionEvent>,
    url: String,
) {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(Frame::Text(text)) => {
                        if let Err(e) = write.send(WsMessage::text(text)).await {
                            warn!(url = %url, error = %e, "Websocket write failed");
                            let _ = inbound.send(SessionEvent::Error(e.to_string()));
                            let _ = inbound.send(SessionEvent::Closed {
                                code: None,
                                reason: e.to_string(),
                            });
                            break;
                        }
                    }
                    Some(Frame::Close { code, reason }) => {
                        send_close(&mut write, code, reason).await;
                        break;
                    }
                    None => {
                        // Owner dropped the handle (superseded or torn down).
                        send_close(&mut write, NORMAL_CLOSURE, String::new()).await;
                        break;
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if inbound.send(SessionEvent::Text(text.as_str().to_owned())).is_err() {
                            send_close(&mut write, NORMAL_CLOSURE, String::new()).await;
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (Some(u16::from(f.code)), f.reason.as_str().to_owned()),
                            None => (None, String::new()),
                        };
                        debug!(url = %url, ?code, reason = %reason, "Websocket closed by peer");
                        let _ = inbound.send(SessionEvent::Closed { code, reason });
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary, ping and pong frames carry nothing for us.
                    }
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "Websocket read failed");
                        let _ = inbound.send(SessionEvent::Error(e.to_string()));
                        let _ = inbound.send(SessionEvent::Closed {
                            code: None,
                            reason: e.to_string(),
                        });
                        break;
                    }
                    None => {
                        let _ = inbound.send(SessionEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        });
                        break;
                    }
                }
            }
        }
    }

    debug!(url = %url, "Websocket pump terminated");
}

async fn send_close<S>(write: &mut S, code: u16, reason: String)
where
    S: futures::Sink<WsMessage> + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    let _ = write.send(WsMessage::Close(Some(frame))).await;
    let _ = write.close().await;
}
