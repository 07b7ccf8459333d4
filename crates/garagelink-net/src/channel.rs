//! Reconnecting realtime channel with tokio mpsc command/event pattern.
//!
//! Each channel runs in a dedicated tokio task (the driver) that owns the
//! connection state machine: failover position, the pending connect attempt,
//! the live session and the single retry timer. The owner talks to it through
//! a [`ReconnectingChannel`] handle.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use garagelink_shared::constants::NORMAL_CLOSURE;
use garagelink_shared::error::{ChannelError, ParseError, TransportError};
use garagelink_shared::types::Credential;

use crate::endpoint::{display_url, socket_url, ChannelPurpose, EndpointList};
use crate::retry::{is_normal_closure, FailoverCursor, RetryPolicy, RetryStep};
use crate::session::{ConnectFuture, Connector, SessionEvent, SessionHandle};

// ---------------------------------------------------------------------------
// State / event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    /// An attempt on `endpoint_index` is in flight, or about to start after
    /// the short failover delay.
    Connecting { endpoint_index: usize },
    Open,
    Closing,
    /// Every candidate failed; a new cycle starts at `fire_at`.
    WaitingToRetry {
        next_endpoint_index: usize,
        fire_at: Instant,
    },
}

impl ChannelState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Anything but `Idle`: the channel is connected or trying to be.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Events sent *from* the driver to the owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    StatusChanged(ChannelState),
    /// One inbound JSON payload, in transport order.
    Message(Value),
    /// Informational only. The driver has already routed the failure.
    Error(String),
}

/// Commands sent *into* the driver.
#[derive(Debug)]
enum ChannelCommand {
    Open(Credential),
    Send(String),
    Close,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Short name used in log fields.
    pub label: String,
    pub endpoints: EndpointList,
    /// Socket path, e.g. `/ws/notifications/`.
    pub path: String,
    pub policy: RetryPolicy,
}

impl ChannelConfig {
    pub fn new(purpose: &ChannelPurpose, endpoints: EndpointList, policy: RetryPolicy) -> Self {
        Self {
            label: purpose.label(),
            endpoints,
            path: purpose.path(),
            policy,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owner side of a channel. Dropping it closes the channel.
pub struct ReconnectingChannel {
    label: String,
    cmd_tx: mpsc::UnboundedSender<ChannelCommand>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    state: watch::Receiver<ChannelState>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl ReconnectingChannel {
    /// Spawn the driver task. Must be called from within a tokio runtime.
    /// The channel starts `Idle`; nothing is attempted before [`open`].
    ///
    /// [`open`]: ReconnectingChannel::open
    pub fn spawn(config: ChannelConfig, connector: Arc<dyn Connector>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ChannelState::Idle);
        let label = config.label.clone();

        let driver = ChannelDriver {
            cursor: FailoverCursor::new(config.endpoints.len()),
            config,
            connector,
            state_tx,
            events_tx,
            credential: None,
            attempt: None,
            session: None,
            retry: None,
        };
        let task = tokio::spawn(driver.run(cmd_rx));

        debug!(channel = %label, "Channel driver spawned");

        Self {
            label,
            cmd_tx,
            events,
            state,
            task: Some(task),
            closed: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Begin the connect sequence at endpoint index 0.
    ///
    /// Without a credential nothing is attempted. Calling this while the
    /// channel is already connecting, open, or waiting to retry is a no-op.
    pub fn open(&self, credential: Option<&Credential>) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let Some(credential) = credential else {
            warn!(channel = %self.label, "Open refused: no credential");
            return Err(ChannelError::AuthMissing);
        };
        if self.state().is_active() {
            debug!(channel = %self.label, "Open ignored: channel already active");
            return Ok(());
        }
        self.cmd_tx
            .send(ChannelCommand::Open(credential.clone()))
            .map_err(|_| ChannelError::Closed)
    }

    /// Serialize `payload` and transmit it. Only valid while `Open`; the
    /// payload is dropped otherwise.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        if !self.state().is_open() {
            return Err(ChannelError::NotOpen);
        }
        let text = serde_json::to_string(payload)?;
        self.cmd_tx
            .send(ChannelCommand::Send(text))
            .map_err(|_| ChannelError::Closed)
    }

    /// Cancel any pending retry, close the live socket with code 1000 and
    /// stop delivering events. Once this returns, [`next_event`] yields
    /// `None`. Idempotent.
    ///
    /// [`next_event`]: ReconnectingChannel::next_event
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.cmd_tx.send(ChannelCommand::Close);
        self.events.close();
        while self.events.try_recv().is_ok() {}
        debug!(channel = %self.label, "Channel closed by owner");
    }

    /// Close and wait for the driver task to finish.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn state(&self) -> ChannelState {
        if self.closed {
            return ChannelState::Idle;
        }
        *self.state.borrow()
    }

    /// Next event from the driver. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.closed {
            return None;
        }
        self.events.recv().await
    }
}

impl Drop for ReconnectingChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ReconnectingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingChannel")
            .field("label", &self.label)
            .field("state", &self.state())
            .field("closed", &self.closed)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

struct PendingAttempt {
    endpoint_index: usize,
    future: ConnectFuture,
}

#[derive(Debug, Clone, Copy)]
struct PendingRetry {
    endpoint_index: usize,
    fire_at: Instant,
}

struct ChannelDriver {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    state_tx: watch::Sender<ChannelState>,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    credential: Option<Credential>,
    cursor: FailoverCursor,
    attempt: Option<PendingAttempt>,
    session: Option<SessionHandle>,
    /// At most one retry timer per channel.
    retry: Option<PendingRetry>,
}

impl ChannelDriver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ChannelCommand>) {
        loop {
            let retry_at = self.retry.map(|r| r.fire_at);

            tokio::select! {
                biased;

                cmd = commands.recv() => {
                    match cmd {
                        Some(ChannelCommand::Open(credential)) => self.handle_open(credential),
                        Some(ChannelCommand::Send(text)) => self.handle_send(text),
                        Some(ChannelCommand::Close) | None => {
                            self.shutdown();
                            break;
                        }
                    }
                }

                (endpoint_index, result) = next_attempt_result(&mut self.attempt) => {
                    self.on_attempt_finished(endpoint_index, result);
                }

                event = next_session_event(&mut self.session) => {
                    self.on_session_event(event);
                }

                _ = retry_due(retry_at) => {
                    self.on_retry_due();
                }
            }
        }

        debug!(channel = %self.config.label, "Channel driver terminated");
    }

    fn handle_open(&mut self, credential: Credential) {
        if self.attempt.is_some() || self.session.is_some() || self.retry.is_some() {
            debug!(channel = %self.config.label, "Open ignored: already active");
            return;
        }
        self.credential = Some(credential);
        self.cursor.begin_cycle();
        self.begin_attempt(0);
    }

    fn begin_attempt(&mut self, endpoint_index: usize) {
        self.retry = None;
        if let Some(old) = self.session.take() {
            old.close(NORMAL_CLOSURE, "superseded");
        }

        let Some(credential) = self.credential.clone() else {
            warn!(channel = %self.config.label, "No credential; staying idle");
            self.set_state(ChannelState::Idle);
            return;
        };
        let Some(endpoint) = self.config.endpoints.get(endpoint_index) else {
            warn!(channel = %self.config.label, endpoint_index, "Endpoint index out of range");
            self.set_state(ChannelState::Idle);
            return;
        };

        self.set_state(ChannelState::Connecting { endpoint_index });

        match socket_url(endpoint, &self.config.path, &credential) {
            Ok(url) => {
                info!(
                    channel = %self.config.label,
                    endpoint = %display_url(&url),
                    endpoint_index,
                    "Connecting"
                );
                self.attempt = Some(PendingAttempt {
                    endpoint_index,
                    future: self.connector.connect(url),
                });
            }
            Err(e) => {
                warn!(channel = %self.config.label, endpoint = %endpoint, error = %e, "Bad socket URL");
                self.emit(ChannelEvent::Error(e.to_string()));
                self.on_failure();
            }
        }
    }

    fn on_attempt_finished(
        &mut self,
        endpoint_index: usize,
        result: Result<SessionHandle, TransportError>,
    ) {
        self.attempt = None;

        match result {
            Ok(session) => {
                info!(
                    channel = %self.config.label,
                    endpoint = %display_url(session.url()),
                    endpoint_index,
                    "Channel open"
                );
                self.session = Some(session);
                self.cursor.on_open();
                self.retry = None;
                self.set_state(ChannelState::Open);
            }
            Err(e) => {
                warn!(channel = %self.config.label, endpoint_index, error = %e, "Connect attempt failed");
                self.emit(ChannelEvent::Error(e.to_string()));
                self.on_failure();
            }
        }
    }

    fn on_session_event(&mut self, event: Option<SessionEvent>) {
        match event {
            Some(SessionEvent::Text(text)) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => self.emit(ChannelEvent::Message(value)),
                Err(e) => {
                    let e = ParseError::from(e);
                    debug!(channel = %self.config.label, error = %e, "Discarding inbound frame");
                    self.emit(ChannelEvent::Error(e.to_string()));
                }
            },
            Some(SessionEvent::Error(reason)) => {
                debug!(channel = %self.config.label, reason = %reason, "Socket error");
                self.emit(ChannelEvent::Error(reason));
            }
            Some(SessionEvent::Closed { code, reason }) => self.on_disconnected(code, &reason),
            None => self.on_disconnected(None, "transport gone"),
        }
    }

    fn on_disconnected(&mut self, code: Option<u16>, reason: &str) {
        self.session = None;

        if is_normal_closure(code) {
            info!(channel = %self.config.label, reason = %reason, "Closed normally; not reconnecting");
            self.set_state(ChannelState::Idle);
            return;
        }

        warn!(channel = %self.config.label, ?code, reason = %reason, "Socket closed abnormally");
        self.on_failure();
    }

    fn on_failure(&mut self) {
        if self.retry.is_some() {
            debug!(channel = %self.config.label, "Retry already pending");
            return;
        }

        match self.cursor.on_failure(&self.config.policy) {
            RetryStep::Failover {
                endpoint_index,
                delay,
            } => {
                self.schedule_retry(endpoint_index, delay);
                self.set_state(ChannelState::Connecting { endpoint_index });
            }
            RetryStep::NewCycle { delay } => {
                let fire_at = self.schedule_retry(0, delay);
                self.set_state(ChannelState::WaitingToRetry {
                    next_endpoint_index: 0,
                    fire_at,
                });
            }
        }
    }

    fn schedule_retry(&mut self, endpoint_index: usize, delay: Duration) -> Instant {
        let fire_at = Instant::now() + delay;
        self.retry = Some(PendingRetry {
            endpoint_index,
            fire_at,
        });

        let endpoint = self
            .config
            .endpoints
            .get(endpoint_index)
            .map(ToString::to_string)
            .unwrap_or_default();
        info!(
            channel = %self.config.label,
            endpoint = %endpoint,
            delay_ms = delay.as_millis() as u64,
            "Retry scheduled"
        );
        fire_at
    }

    fn on_retry_due(&mut self) {
        if let Some(retry) = self.retry.take() {
            self.begin_attempt(retry.endpoint_index);
        }
    }

    fn handle_send(&mut self, text: String) {
        match &self.session {
            Some(session) if self.state_tx.borrow().is_open() => {
                if let Err(e) = session.send_text(text) {
                    warn!(channel = %self.config.label, error = %e, "Send failed");
                }
            }
            _ => debug!(channel = %self.config.label, "Send dropped: channel not open"),
        }
    }

    fn shutdown(&mut self) {
        self.retry = None;
        self.attempt = None;
        if let Some(session) = self.session.take() {
            self.set_state(ChannelState::Closing);
            session.close(NORMAL_CLOSURE, "client closing");
        }
        self.set_state(ChannelState::Idle);
        info!(channel = %self.config.label, "Channel shut down");
    }

    fn set_state(&self, state: ChannelState) {
        if *self.state_tx.borrow() == state {
            return;
        }
        self.state_tx.send_replace(state);
        debug!(channel = %self.config.label, ?state, "Channel state changed");
        self.emit(ChannelEvent::StatusChanged(state));
    }

    fn emit(&self, event: ChannelEvent) {
        // The owner may have closed its receiver already; that is fine.
        let _ = self.events_tx.send(event);
    }
}

async fn next_attempt_result(
    attempt: &mut Option<PendingAttempt>,
) -> (usize, Result<SessionHandle, TransportError>) {
    match attempt {
        Some(pending_attempt) => {
            let result = (&mut pending_attempt.future).await;
            (pending_attempt.endpoint_index, result)
        }
        None => pending().await,
    }
}

async fn next_session_event(session: &mut Option<SessionHandle>) -> Option<SessionEvent> {
    match session {
        Some(session) => session.recv().await,
        None => pending().await,
    }
}

async fn retry_due(fire_at: Option<Instant>) {
    match fire_at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use crate::session::Frame;
    use garagelink_shared::types::ConversationId;
    use serde_json::json;

    fn chat_config(ports: &[u16]) -> ChannelConfig {
        ChannelConfig::new(
            &ChannelPurpose::Chat(ConversationId::from("7")),
            EndpointList::from_ports("localhost", ports, false).unwrap(),
            RetryPolicy::chat(),
        )
    }

    fn credential() -> Credential {
        Credential::new("tok").unwrap()
    }

    async fn next_status(channel: &mut ReconnectingChannel) -> ChannelState {
        loop {
            match channel.next_event().await {
                Some(ChannelEvent::StatusChanged(state)) => return state,
                Some(_) => continue,
                None => panic!("channel event stream ended"),
            }
        }
    }

    #[tokio::test]
    async fn test_open_without_credential_attempts_nothing() {
        let connector = MockConnector::new();
        let channel = ReconnectingChannel::spawn(chat_config(&[8000]), Arc::new(connector.clone()));

        assert!(matches!(channel.open(None), Err(ChannelError::AuthMissing)));
        tokio::task::yield_now().await;
        assert!(connector.attempts().is_empty());
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_to_second_endpoint() {
        let connector = MockConnector::new();
        connector.refuse_port(8000);
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000, 8001]), Arc::new(connector.clone()));
        let started = Instant::now();

        channel.open(Some(&credential())).unwrap();

        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 0 }
        );
        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 1 }
        );
        assert_eq!(next_status(&mut channel).await, ChannelState::Open);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
        assert_eq!(connector.attempted_ports(), vec![8000, 8001]);

        let remote = connector.next_remote().await.unwrap();
        assert_eq!(remote.port(), Some(8001));
        assert_eq!(remote.url().path(), "/ws/chat/7/");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_waits_long_delay_then_restarts_at_first() {
        let connector = MockConnector::new();
        connector.refuse_port(8000);
        connector.refuse_port(8001);
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000, 8001]), Arc::new(connector.clone()));
        let started = Instant::now();

        channel.open(Some(&credential())).unwrap();

        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 0 }
        );
        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 1 }
        );
        match next_status(&mut channel).await {
            ChannelState::WaitingToRetry {
                next_endpoint_index,
                fire_at,
            } => {
                assert_eq!(next_endpoint_index, 0);
                assert!(fire_at >= started + Duration::from_secs(4));
            }
            other => panic!("expected WaitingToRetry, got {other:?}"),
        }
        assert_eq!(connector.attempts().len(), 2);

        // Nothing is attempted before the long delay elapses.
        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(connector.attempts().len(), 2);

        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 0 }
        );
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(&connector.attempted_ports()[..3], &[8000, 8001, 8000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_closure_does_not_reconnect() {
        let connector = MockConnector::new();
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000, 8001]), Arc::new(connector.clone()));
        channel.open(Some(&credential())).unwrap();

        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 0 }
        );
        assert_eq!(next_status(&mut channel).await, ChannelState::Open);

        let remote = connector.next_remote().await.unwrap();
        remote.close(Some(1000));

        assert_eq!(next_status(&mut channel).await, ChannelState::Idle);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts().len(), 1);
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_drop_fails_over_to_next_endpoint() {
        let connector = MockConnector::new();
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000, 8001]), Arc::new(connector.clone()));
        channel.open(Some(&credential())).unwrap();

        next_status(&mut channel).await;
        assert_eq!(next_status(&mut channel).await, ChannelState::Open);

        let first = connector.next_remote().await.unwrap();
        connector.refuse_port(8000);
        let dropped_at = Instant::now();
        first.close(Some(1006));

        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 1 }
        );
        assert_eq!(next_status(&mut channel).await, ChannelState::Open);
        assert!(dropped_at.elapsed() >= Duration::from_secs(1));
        assert!(dropped_at.elapsed() < Duration::from_secs(2));
        assert_eq!(connector.attempted_ports(), vec![8000, 8001]);

        let second = connector.next_remote().await.unwrap();
        assert_eq!(second.port(), Some(8001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_endpoint_drop_waits_cycle_delay() {
        let connector = MockConnector::new();
        let config = ChannelConfig::new(
            &ChannelPurpose::Notifications,
            EndpointList::from_ports("localhost", &[8000], false).unwrap(),
            RetryPolicy::notifications(),
        );
        let mut channel = ReconnectingChannel::spawn(config, Arc::new(connector.clone()));
        channel.open(Some(&credential())).unwrap();

        next_status(&mut channel).await;
        assert_eq!(next_status(&mut channel).await, ChannelState::Open);

        let remote = connector.next_remote().await.unwrap();
        connector.refuse_port(8000);
        let dropped_at = Instant::now();
        remote.fail("connection reset");

        match next_status(&mut channel).await {
            ChannelState::WaitingToRetry {
                next_endpoint_index,
                fire_at,
            } => {
                assert_eq!(next_endpoint_index, 0);
                assert!(fire_at >= dropped_at + Duration::from_secs(5));
            }
            other => panic!("expected WaitingToRetry, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(connector.attempts().len(), 1);

        // Refused again after the cycle delay; the next cycle succeeds.
        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 0 }
        );
        assert!(matches!(
            next_status(&mut channel).await,
            ChannelState::WaitingToRetry { .. }
        ));
        connector.accept_port(8000);
        assert_eq!(
            next_status(&mut channel).await,
            ChannelState::Connecting { endpoint_index: 0 }
        );
        assert_eq!(next_status(&mut channel).await, ChannelState::Open);
        assert!(dropped_at.elapsed() >= Duration::from_secs(10));
        assert_eq!(connector.attempted_ports(), vec![8000, 8000, 8000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_retry() {
        let connector = MockConnector::new();
        connector.refuse_port(8000);
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000]), Arc::new(connector.clone()));
        channel.open(Some(&credential())).unwrap();

        next_status(&mut channel).await;
        assert!(matches!(
            next_status(&mut channel).await,
            ChannelState::WaitingToRetry { .. }
        ));

        channel.close();
        assert!(channel.is_closed());
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(channel.next_event().await.is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts().len(), 1);
        assert!(matches!(
            channel.open(Some(&credential())),
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_close_sends_normal_closure_and_silences_events() {
        let connector = MockConnector::new();
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000]), Arc::new(connector.clone()));
        channel.open(Some(&credential())).unwrap();

        next_status(&mut channel).await;
        assert_eq!(next_status(&mut channel).await, ChannelState::Open);
        let mut remote = connector.next_remote().await.unwrap();

        channel.close();
        remote.send_json(&json!({"type": "chat.message", "message": {"id": 1}}));

        assert!(channel.next_event().await.is_none());
        match remote.next_frame().await {
            Some(Frame::Close { code, .. }) => assert_eq!(code, 1000),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_channel_open() {
        let connector = MockConnector::new();
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000]), Arc::new(connector.clone()));
        channel.open(Some(&credential())).unwrap();

        next_status(&mut channel).await;
        next_status(&mut channel).await;
        let remote = connector.next_remote().await.unwrap();

        remote.send_text("{not json");
        remote.send_json(&json!({"total_unread_count": 2}));

        assert!(matches!(channel.next_event().await, Some(ChannelEvent::Error(_))));
        assert_eq!(
            channel.next_event().await,
            Some(ChannelEvent::Message(json!({"total_unread_count": 2})))
        );
        assert_eq!(channel.state(), ChannelState::Open);
        assert_eq!(connector.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_send_requires_open_channel() {
        let connector = MockConnector::new();
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000]), Arc::new(connector.clone()));

        assert!(matches!(
            channel.send(&json!({"type": "chat.message", "content": "early"})),
            Err(ChannelError::NotOpen)
        ));

        channel.open(Some(&credential())).unwrap();
        next_status(&mut channel).await;
        next_status(&mut channel).await;
        let mut remote = connector.next_remote().await.unwrap();

        channel
            .send(&json!({"type": "chat.message", "content": "hi"}))
            .unwrap();

        match remote.next_frame().await {
            Some(Frame::Text(text)) => {
                let value: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(value, json!({"type": "chat.message", "content": "hi"}));
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_open_is_noop() {
        let connector = MockConnector::new();
        let mut channel =
            ReconnectingChannel::spawn(chat_config(&[8000]), Arc::new(connector.clone()));

        channel.open(Some(&credential())).unwrap();
        channel.open(Some(&credential())).unwrap();
        next_status(&mut channel).await;
        assert_eq!(next_status(&mut channel).await, ChannelState::Open);
        channel.open(Some(&credential())).unwrap();

        let _remote = connector.next_remote().await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(connector.attempts().len(), 1);
    }
}
