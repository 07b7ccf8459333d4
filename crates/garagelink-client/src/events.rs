//! Values the stores hand to the presentation layer.

use serde::Serialize;

use garagelink_net::ChannelState;
use garagelink_shared::Message;

/// Emitted by [`ConversationStore::next_update`](crate::ConversationStore::next_update).
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationUpdate {
    /// Messages newly added to the end of the log, in log order.
    Appended(Vec<Message>),
    /// History was merged into the log (fetch or server push).
    HistoryLoaded { total: usize },
    HistoryFailed(String),
    Status(ChannelState),
    /// Transient error text for the conversation view.
    Error(String),
    /// The previous send finished; the composer accepts a new message.
    SendSettled,
}

/// What the conversation view shows in place of, or above, the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DisplayState {
    /// No counterpart yet; chat is disabled.
    Unavailable(&'static str),
    Empty(&'static str),
    Messages,
}

/// Connection indicator derived from a channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusIndicator {
    Offline,
    Connecting,
    Connected,
    Retrying,
}

impl StatusIndicator {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Offline => "Offline",
            Self::Connecting => "Connecting…",
            Self::Connected => "Connected",
            Self::Retrying => "Reconnecting",
        }
    }
}

impl From<ChannelState> for StatusIndicator {
    fn from(state: ChannelState) -> Self {
        match state {
            ChannelState::Idle | ChannelState::Closing => Self::Offline,
            ChannelState::Connecting { .. } => Self::Connecting,
            ChannelState::Open => Self::Connected,
            ChannelState::WaitingToRetry { .. } => Self::Retrying,
        }
    }
}

impl std::fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
