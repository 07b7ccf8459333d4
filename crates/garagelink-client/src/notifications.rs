//! Global unread-count aggregator.
//!
//! One instance per signed-in user, created by [`AppContext`] and handed out
//! explicitly. The summary is owned by a background task and published on a
//! `watch` channel; subscribers only read.
//!
//! [`AppContext`]: crate::AppContext

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use garagelink_net::{ChannelConfig, ChannelEvent, ChannelState, Connector, ReconnectingChannel};
use garagelink_shared::error::RequestError;
use garagelink_shared::types::{ConversationId, Credential};
use garagelink_shared::NotificationSummary;

use crate::api::{ApiFuture, ChatApi};
use crate::error::ClientError;

/// What subscribers observe.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationSnapshot {
    pub summary: NotificationSummary,
    pub status: ChannelState,
    /// True from `start` until the first summary fetch settles.
    pub loading: bool,
    pub last_error: Option<String>,
}

impl Default for NotificationSnapshot {
    fn default() -> Self {
        Self {
            summary: NotificationSummary::default(),
            status: ChannelState::Idle,
            loading: false,
            last_error: None,
        }
    }
}

impl NotificationSnapshot {
    pub fn total_unread(&self) -> u64 {
        self.summary.total_unread_count
    }

    pub fn has_unread(&self) -> bool {
        self.summary.total_unread_count > 0
    }

    pub fn unread_for(&self, conversation: &ConversationId) -> u64 {
        self.summary.unread_for(conversation)
    }
}

#[derive(Debug)]
enum AggregatorCommand {
    Refresh,
    Stop,
}

struct Running {
    cmd_tx: mpsc::UnboundedSender<AggregatorCommand>,
    task: JoinHandle<()>,
}

struct AggregatorInner {
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn Connector>,
    channel_config: ChannelConfig,
    snapshot: watch::Sender<NotificationSnapshot>,
    running: Mutex<Option<Running>>,
}

#[derive(Clone)]
pub struct NotificationAggregator {
    inner: Arc<AggregatorInner>,
}

impl NotificationAggregator {
    pub fn new(
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
        channel_config: ChannelConfig,
    ) -> Self {
        let (snapshot, _) = watch::channel(NotificationSnapshot::default());
        Self {
            inner: Arc::new(AggregatorInner {
                api,
                connector,
                channel_config,
                snapshot,
                running: Mutex::new(None),
            }),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch the summary and open the notification channel. Idempotent while
    /// running.
    pub fn start(&self, credential: Option<Credential>) -> Result<(), ClientError> {
        let mut running = self.running();
        if running.is_some() {
            debug!("Notification aggregator already running");
            return Ok(());
        }
        let Some(credential) = credential else {
            warn!("Not starting notifications: no credential");
            return Err(ClientError::AuthMissing);
        };

        self.inner.snapshot.send_modify(|snap| {
            snap.loading = true;
            snap.last_error = None;
        });

        let channel = ReconnectingChannel::spawn(
            self.inner.channel_config.clone(),
            self.inner.connector.clone(),
        );
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = AggregatorTask {
            api: self.inner.api.clone(),
            credential,
            channel,
            snapshot: self.inner.snapshot.clone(),
            fetch: None,
            pushes: 0,
        };
        let task = tokio::spawn(task.run(cmd_rx));

        *running = Some(Running { cmd_tx, task });
        info!("Notification aggregator started");
        Ok(())
    }

    /// Force a re-fetch of the summary. Ignored when not running.
    pub fn refresh(&self) {
        match self.running().as_ref() {
            Some(running) => {
                let _ = running.cmd_tx.send(AggregatorCommand::Refresh);
            }
            None => debug!("Refresh ignored: aggregator not running"),
        }
    }

    /// Close the channel, wait for the background task and reset the
    /// snapshot. Nothing mutates the snapshot after this returns.
    pub async fn stop(&self) {
        let running = self.running().take();
        if let Some(running) = running {
            let _ = running.cmd_tx.send(AggregatorCommand::Stop);
            if let Err(e) = running.task.await {
                warn!(error = %e, "Notification task ended abnormally");
            }
            info!("Notification aggregator stopped");
        }
        self.inner.snapshot.send_replace(NotificationSnapshot::default());
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> NotificationSubscription {
        let mut rx = self.inner.snapshot.subscribe();
        // New subscribers see the current snapshot on their first `changed`.
        rx.mark_changed();
        let id = Uuid::new_v4();
        debug!(subscriber = %id, "Notification subscriber added");
        NotificationSubscription { id, rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.snapshot.receiver_count()
    }
}

impl std::fmt::Debug for NotificationAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAggregator")
            .field("running", &self.is_running())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[derive(Debug)]
pub struct NotificationSubscription {
    id: Uuid,
    rx: watch::Receiver<NotificationSnapshot>,
}

impl NotificationSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current(&self) -> NotificationSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the aggregator is gone.
    pub async fn changed(&mut self) -> Option<NotificationSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {
        debug!(subscriber = %self.id, "Notification subscriber removed");
    }
}

struct PendingFetch {
    /// Push count when the request was issued.
    issued_after: u64,
    future: ApiFuture<NotificationSummary>,
}

struct AggregatorTask {
    api: Arc<dyn ChatApi>,
    credential: Credential,
    channel: ReconnectingChannel,
    snapshot: watch::Sender<NotificationSnapshot>,
    fetch: Option<PendingFetch>,
    /// Summaries applied from the socket so far.
    pushes: u64,
}

impl AggregatorTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<AggregatorCommand>) {
        self.begin_fetch();
        if let Err(e) = self.channel.open(Some(&self.credential)) {
            warn!(error = %e, "Failed to open notification channel");
        }

        loop {
            tokio::select! {
                biased;

                cmd = commands.recv() => {
                    match cmd {
                        Some(AggregatorCommand::Refresh) => self.begin_fetch(),
                        Some(AggregatorCommand::Stop) | None => break,
                    }
                }

                (issued_after, result) = next_fetch(&mut self.fetch) => {
                    self.fetch = None;
                    self.on_fetch(issued_after, result);
                }

                event = self.channel.next_event() => {
                    match event {
                        Some(event) => self.on_channel_event(event),
                        None => break,
                    }
                }
            }
        }

        self.channel.shutdown().await;
        debug!("Notification task terminated");
    }

    fn begin_fetch(&mut self) {
        debug!("Fetching unread summary");
        self.fetch = Some(PendingFetch {
            issued_after: self.pushes,
            future: self.api.fetch_unread_summary(&self.credential),
        });
    }

    fn on_fetch(&mut self, issued_after: u64, result: Result<NotificationSummary, RequestError>) {
        match result {
            Ok(summary) if issued_after == self.pushes => {
                debug!(total = summary.total_unread_count, "Unread summary fetched");
                self.snapshot.send_modify(|snap| {
                    snap.summary = summary;
                    snap.loading = false;
                    snap.last_error = None;
                });
            }
            Ok(_) => {
                debug!("Discarding summary fetched before a newer push");
                self.snapshot.send_modify(|snap| snap.loading = false);
            }
            Err(e) => {
                warn!(error = %e, "Unread summary fetch failed");
                self.snapshot.send_modify(|snap| {
                    snap.loading = false;
                    snap.last_error = Some(e.to_string());
                });
            }
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::StatusChanged(status) => {
                self.snapshot.send_modify(|snap| snap.status = status);
            }
            ChannelEvent::Message(payload) => match NotificationSummary::from_payload(payload) {
                Ok(Some(summary)) => {
                    self.pushes += 1;
                    debug!(total = summary.total_unread_count, "Unread summary pushed");
                    self.snapshot.send_modify(|snap| snap.summary = summary);
                }
                Ok(None) => debug!("Ignoring unrecognized notification payload"),
                Err(e) => warn!(error = %e, "Discarding malformed notification payload"),
            },
            ChannelEvent::Error(reason) => debug!(reason = %reason, "Notification channel error"),
        }
    }
}

async fn next_fetch(
    fetch: &mut Option<PendingFetch>,
) -> (u64, Result<NotificationSummary, RequestError>) {
    match fetch {
        Some(pending_fetch) => {
            let result = (&mut pending_fetch.future).await;
            (pending_fetch.issued_after, result)
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use garagelink_net::mock::MockConnector;
    use serde_json::json;

    use crate::api::testing::FakeApi;
    use crate::config::ClientConfig;

    fn aggregator(api: Arc<FakeApi>, connector: &MockConnector) -> NotificationAggregator {
        let config = ClientConfig::default();
        NotificationAggregator::new(
            api,
            Arc::new(connector.clone()),
            config.notification_channel().unwrap(),
        )
    }

    fn summary(total: u64) -> NotificationSummary {
        NotificationSummary {
            total_unread_count: total,
            items: Vec::new(),
        }
    }

    async fn wait_for(
        sub: &mut NotificationSubscription,
        pred: impl Fn(&NotificationSnapshot) -> bool,
    ) -> NotificationSnapshot {
        loop {
            let snap = sub.changed().await.expect("aggregator dropped");
            if pred(&snap) {
                return snap;
            }
        }
    }

    #[tokio::test]
    async fn test_start_requires_credential() {
        let api = Arc::new(FakeApi::default());
        let connector = MockConnector::new();
        let agg = aggregator(api.clone(), &connector);

        assert!(matches!(agg.start(None), Err(ClientError::AuthMissing)));
        assert!(!agg.is_running());
        assert_eq!(api.summary_calls(), 0);
        assert!(connector.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_new_subscriber_sees_current_snapshot() {
        let api = Arc::new(FakeApi::default());
        api.push_summary(Ok(summary(2)));
        let connector = MockConnector::new();
        let agg = aggregator(api, &connector);

        agg.start(Credential::new("tok")).unwrap();
        let mut first = agg.subscribe();
        wait_for(&mut first, |s| !s.loading && s.total_unread() == 2).await;

        let mut late = agg.subscribe();
        assert_eq!(late.current().total_unread(), 2);
        let snap = late.changed().await.unwrap();
        assert!(snap.has_unread());

        late.unsubscribe();
        agg.stop().await;
    }

    #[tokio::test]
    async fn test_pushed_summaries_replace_whole_state() {
        let api = Arc::new(FakeApi::default());
        let connector = MockConnector::new();
        let agg = aggregator(api, &connector);
        let mut sub = agg.subscribe();

        agg.start(Credential::new("tok")).unwrap();
        let remote = connector.next_remote().await.unwrap();
        assert_eq!(remote.url().path(), "/ws/notifications/");
        wait_for(&mut sub, |s| s.status == ChannelState::Open).await;

        remote.send_json(&json!({
            "event": "notifications.update",
            "data": {
                "total_unread_count": 3,
                "items": [{"service_request_id": "sr-1", "unread_count": 3}]
            }
        }));
        let snap = wait_for(&mut sub, |s| s.total_unread() == 3).await;
        assert_eq!(snap.unread_for(&ConversationId::from("sr-1")), 3);

        remote.send_json(&json!({"total_unread_count": 0, "items": []}));
        let snap = wait_for(&mut sub, |s| s.total_unread() == 0).await;
        assert!(snap.summary.items.is_empty());
        assert!(!snap.has_unread());

        agg.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fetch_after_push_is_discarded() {
        let api = Arc::new(FakeApi::default());
        api.push_summary(Ok(summary(9)));
        api.set_summary_delay(Duration::from_secs(2));
        let connector = MockConnector::new();
        let agg = aggregator(api, &connector);
        let mut sub = agg.subscribe();

        agg.start(Credential::new("tok")).unwrap();
        let remote = connector.next_remote().await.unwrap();
        wait_for(&mut sub, |s| s.status == ChannelState::Open).await;

        remote.send_json(&json!({"total_unread_count": 1, "items": []}));
        wait_for(&mut sub, |s| s.total_unread() == 1).await;

        // The slow fetch lands after the push and must not roll it back.
        let snap = wait_for(&mut sub, |s| !s.loading).await;
        assert_eq!(snap.total_unread(), 1);

        agg.stop().await;
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported() {
        let api = Arc::new(FakeApi::default());
        api.push_summary(Err(RequestError::Status {
            endpoint: "/api/messages/unread-summary/".into(),
            status: 500,
        }));
        let connector = MockConnector::new();
        let agg = aggregator(api.clone(), &connector);
        let mut sub = agg.subscribe();

        agg.start(Credential::new("tok")).unwrap();
        let snap = wait_for(&mut sub, |s| !s.loading).await;
        assert!(snap.last_error.is_some());
        assert_eq!(snap.total_unread(), 0);

        api.push_summary(Ok(summary(5)));
        agg.refresh();
        let snap = wait_for(&mut sub, |s| s.total_unread() == 5).await;
        assert!(snap.last_error.is_none());
        assert_eq!(api.summary_calls(), 2);

        agg.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_restartable() {
        let api = Arc::new(FakeApi::default());
        let connector = MockConnector::new();
        let agg = aggregator(api.clone(), &connector);

        agg.start(Credential::new("tok")).unwrap();
        agg.start(Credential::new("tok")).unwrap();
        let mut first_remote = connector.next_remote().await.unwrap();

        agg.stop().await;
        assert!(!agg.is_running());
        assert_eq!(agg.snapshot(), NotificationSnapshot::default());
        assert!(matches!(
            first_remote.next_frame().await,
            Some(garagelink_net::Frame::Close { code: 1000, .. })
        ));
        // No mutation after stop, even if the server still pushes.
        first_remote.send_json(&json!({"total_unread_count": 7}));
        tokio::task::yield_now().await;
        assert_eq!(agg.snapshot().total_unread(), 0);

        agg.start(Credential::new("tok")).unwrap();
        let _second_remote = connector.next_remote().await.unwrap();
        assert_eq!(connector.attempts().len(), 2);
        agg.stop().await;
    }
}
