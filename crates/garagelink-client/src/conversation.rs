//! Per-conversation message store.
//!
//! A [`ConversationStore`] owns the chat channel of one conversation view,
//! the ordered message log, the composer input and the send-settling state.
//! Everything arriving from the channel, the history fetch and the settle
//! timer is applied one item at a time in [`ConversationStore::next_update`].

use std::collections::{HashSet, VecDeque};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use garagelink_net::{ChannelConfig, ChannelEvent, ChannelState, Connector, ReconnectingChannel};
use garagelink_shared::constants::{CHAT_EMPTY_TEXT, CHAT_UNAVAILABLE_TEXT};
use garagelink_shared::error::RequestError;
use garagelink_shared::types::{ConversationId, Credential, MessageId, SenderType};
use garagelink_shared::{ChatCommand, ChatEvent, Message};

use crate::api::{ApiFuture, ChatApi};
use crate::error::{ClientError, SendRejected};
use crate::events::{ConversationUpdate, DisplayState, StatusIndicator};
use crate::read_state::{ReadStateReconciler, ReadTrigger};
use crate::state::AppContext;

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// Ordered, id-deduplicated message list.
///
/// The first history merge may place older messages ahead of live ones.
/// After that the log is append-only.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    seen: HashSet<MessageId>,
    hydrated: bool,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless the id is already present.
    pub fn push(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Merge a history window.
    ///
    /// The first merge rebuilds the log as `history` followed by the live
    /// messages it does not contain. Later windows only append unseen ids,
    /// so existing entries never move.
    pub fn merge_history(&mut self, history: Vec<Message>) {
        if self.hydrated {
            for message in history {
                self.push(message);
            }
            return;
        }

        self.hydrated = true;
        let live = std::mem::take(&mut self.messages);
        self.seen.clear();
        for message in history.into_iter().chain(live) {
            self.push(message);
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen.clear();
        self.hydrated = false;
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationParams {
    pub conversation_id: ConversationId,
    /// Which side the local user is on.
    pub viewer: SenderType,
    /// False while no workshop is assigned; chat is disabled then.
    pub has_counterpart: bool,
}

pub struct ConversationStore {
    params: ConversationParams,
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn Connector>,
    channel_config: ChannelConfig,
    credential: Option<Credential>,
    reconciler: ReadStateReconciler,
    settle_timeout: Duration,

    channel: Option<ReconnectingChannel>,
    hydration: Option<ApiFuture<Vec<Message>>>,
    /// Deadline of the send in flight, if any.
    settling: Option<Instant>,
    pending: VecDeque<ConversationUpdate>,

    log: ConversationLog,
    input: String,
    status: ChannelState,
    focused: bool,
    last_error: Option<String>,
}

impl ConversationStore {
    pub fn new(params: ConversationParams, context: &AppContext) -> Result<Self, ClientError> {
        let channel_config = context.config.chat_channel(&params.conversation_id)?;
        Ok(Self {
            api: context.api.clone(),
            connector: context.connector.clone(),
            channel_config,
            credential: context.credential().cloned(),
            reconciler: context.reconciler(),
            settle_timeout: context.config.send_settle_timeout,
            params,
            channel: None,
            hydration: None,
            settling: None,
            pending: VecDeque::new(),
            log: ConversationLog::new(),
            input: String::new(),
            status: ChannelState::Idle,
            // A view that was just shown is assumed to have focus.
            focused: true,
            last_error: None,
        })
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.params.conversation_id
    }

    pub fn is_enabled(&self) -> bool {
        self.params.has_counterpart
    }

    pub fn is_active(&self) -> bool {
        self.channel.is_some()
    }

    /// Open the chat channel and start loading history. Does nothing while
    /// chat is disabled or already active.
    pub fn activate(&mut self) -> Result<(), ClientError> {
        if !self.is_enabled() {
            debug!(conversation = %self.params.conversation_id, "Chat disabled; not connecting");
            return Ok(());
        }
        if self.channel.is_some() {
            return Ok(());
        }

        let channel = ReconnectingChannel::spawn(self.channel_config.clone(), self.connector.clone());
        channel.open(self.credential.as_ref())?;
        self.channel = Some(channel);
        info!(conversation = %self.params.conversation_id, "Conversation activated");

        self.hydrate()
    }

    /// Start a history fetch. Live messages arriving meanwhile are kept.
    pub fn hydrate(&mut self) -> Result<(), ClientError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let Some(credential) = &self.credential else {
            return Err(ClientError::AuthMissing);
        };
        debug!(conversation = %self.params.conversation_id, "Fetching history");
        self.hydration = Some(self.api.fetch_history(&self.params.conversation_id, credential));
        Ok(())
    }

    /// Close the channel, drop any outstanding fetch and clear the log.
    /// Nothing from the old channel is observed afterwards.
    pub fn deactivate(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            info!(conversation = %self.params.conversation_id, "Conversation deactivated");
        }
        self.hydration = None;
        self.settling = None;
        self.pending.clear();
        self.log.clear();
        self.status = ChannelState::Idle;
        self.last_error = None;
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Send the input buffer.
    pub fn submit_input(&mut self) -> Result<(), SendRejected> {
        let content = self.input.clone();
        self.send_message(&content)
    }

    /// Transmit a chat message. On success the input buffer is cleared and
    /// the store is settling until the message comes back. There is no local
    /// echo: the server's copy is merged like any inbound message.
    pub fn send_message(&mut self, content: &str) -> Result<(), SendRejected> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SendRejected::Empty);
        }
        if !self.is_enabled() {
            return Err(SendRejected::Disabled);
        }
        if self.settling.is_some() {
            return Err(SendRejected::Settling);
        }
        let Some(channel) = self.channel.as_ref().filter(|c| c.state().is_open()) else {
            return Err(SendRejected::NotOpen);
        };

        channel.send(&ChatCommand::Message {
            content: content.to_string(),
        })?;

        self.input.clear();
        self.settling = Some(Instant::now() + self.settle_timeout);
        debug!(conversation = %self.params.conversation_id, "Message sent");
        Ok(())
    }

    pub fn is_settling(&self) -> bool {
        self.settling.is_some()
    }

    pub fn set_focus(&mut self, focused: bool) {
        let regained = focused && !self.focused;
        self.focused = focused;
        if regained && self.is_active() {
            self.reconcile(ReadTrigger::FocusRegained);
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    pub fn status(&self) -> ChannelState {
        self.status
    }

    pub fn status_indicator(&self) -> StatusIndicator {
        self.status.into()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn display_state(&self) -> DisplayState {
        if !self.is_enabled() {
            DisplayState::Unavailable(CHAT_UNAVAILABLE_TEXT)
        } else if self.log.is_empty() {
            DisplayState::Empty(CHAT_EMPTY_TEXT)
        } else {
            DisplayState::Messages
        }
    }

    /// Wait for and apply the next channel event, history result or settle
    /// timeout. Returns `None` when nothing is outstanding. Cancel-safe.
    pub async fn next_update(&mut self) -> Option<ConversationUpdate> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Some(update);
            }
            if self.channel.is_none() && self.hydration.is_none() && self.settling.is_none() {
                return None;
            }

            let settle_at = self.settling;
            tokio::select! {
                event = next_channel_event(&mut self.channel) => self.on_channel_event(event),
                result = next_history(&mut self.hydration) => {
                    self.hydration = None;
                    self.on_history(result);
                }
                _ = settle_due(settle_at) => self.settle("timeout"),
            }
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::StatusChanged(state) => self.on_status(state),
            ChannelEvent::Message(payload) => match ChatEvent::from_payload(payload) {
                Ok(Some(ChatEvent::Message(message))) => self.on_message(message),
                Ok(Some(ChatEvent::History(history))) => {
                    self.log.merge_history(history);
                    self.pending.push_back(ConversationUpdate::HistoryLoaded {
                        total: self.log.len(),
                    });
                }
                Ok(Some(ChatEvent::ServerError(text))) => {
                    warn!(conversation = %self.params.conversation_id, error = %text, "Server rejected chat action");
                    self.last_error = Some(text.clone());
                    self.pending.push_back(ConversationUpdate::Error(text));
                    self.settle("server error");
                }
                Ok(None) => debug!(conversation = %self.params.conversation_id, "Ignoring chat payload"),
                Err(e) => {
                    warn!(conversation = %self.params.conversation_id, error = %e, "Discarding malformed chat payload");
                }
            },
            ChannelEvent::Error(reason) => {
                debug!(conversation = %self.params.conversation_id, reason = %reason, "Chat channel error");
            }
        }
    }

    fn on_status(&mut self, state: ChannelState) {
        self.status = state;
        self.pending.push_back(ConversationUpdate::Status(state));

        if state.is_open() {
            self.last_error = None;
            if self.focused {
                self.reconcile(ReadTrigger::ChannelOpened);
            }
        } else {
            self.settle("channel left open");
        }
    }

    fn on_message(&mut self, message: Message) {
        let own = message.sender_type == self.params.viewer;
        if self.log.push(message.clone()) {
            self.pending.push_back(ConversationUpdate::Appended(vec![message]));
            if self.focused {
                self.reconcile(ReadTrigger::NewMessage);
            }
        }
        if own {
            self.settle("echo received");
        }
    }

    fn on_history(&mut self, result: Result<Vec<Message>, RequestError>) {
        match result {
            Ok(history) => {
                self.log.merge_history(history);
                debug!(conversation = %self.params.conversation_id, total = self.log.len(), "History merged");
                self.pending.push_back(ConversationUpdate::HistoryLoaded {
                    total: self.log.len(),
                });
            }
            Err(e) => {
                warn!(conversation = %self.params.conversation_id, error = %e, "History fetch failed");
                self.last_error = Some(e.to_string());
                self.pending
                    .push_back(ConversationUpdate::HistoryFailed(e.to_string()));
            }
        }
    }

    fn settle(&mut self, reason: &str) {
        if self.settling.take().is_some() {
            debug!(conversation = %self.params.conversation_id, reason, "Send settled");
            self.pending.push_back(ConversationUpdate::SendSettled);
        }
    }

    fn reconcile(&self, trigger: ReadTrigger) {
        self.reconciler
            .mark_read(&self.params.conversation_id, trigger);
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("params", &self.params)
            .field("status", &self.status)
            .field("messages", &self.log.len())
            .field("settling", &self.settling.is_some())
            .finish()
    }
}

async fn next_channel_event(channel: &mut Option<ReconnectingChannel>) -> ChannelEvent {
    match channel {
        Some(channel) => match channel.next_event().await {
            Some(event) => event,
            None => pending().await,
        },
        None => pending().await,
    }
}

async fn next_history(
    hydration: &mut Option<ApiFuture<Vec<Message>>>,
) -> Result<Vec<Message>, RequestError> {
    match hydration {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn settle_due(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}
