//! Fire-and-forget mark-read requests.
//!
//! The reconciler never touches the notification summary; the server pushes
//! a fresh one once the read state has changed.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use garagelink_shared::types::{ConversationId, Credential};

use crate::api::ChatApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTrigger {
    /// A new message arrived while the viewer was focused on the conversation.
    NewMessage,
    /// Focus came back while the conversation view was active.
    FocusRegained,
    /// The conversation channel reached `Open` while focused.
    ChannelOpened,
}

impl std::fmt::Display for ReadTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NewMessage => "new_message",
            Self::FocusRegained => "focus_regained",
            Self::ChannelOpened => "channel_opened",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct ReadStateReconciler {
    api: Arc<dyn ChatApi>,
    credential: Option<Credential>,
}

impl ReadStateReconciler {
    pub fn new(api: Arc<dyn ChatApi>, credential: Option<Credential>) -> Self {
        Self { api, credential }
    }

    /// Issue a mark-read request in the background. Failures are logged and
    /// otherwise ignored. Returns `None` when there is no credential.
    pub fn mark_read(
        &self,
        conversation: &ConversationId,
        trigger: ReadTrigger,
    ) -> Option<JoinHandle<()>> {
        let Some(credential) = &self.credential else {
            warn!(conversation = %conversation, %trigger, "Skipping mark-read: no credential");
            return None;
        };

        let request = self.api.mark_read(conversation, credential);
        let conversation = conversation.clone();
        Some(tokio::spawn(async move {
            match request.await {
                Ok(()) => debug!(conversation = %conversation, %trigger, "Marked read"),
                Err(e) => warn!(conversation = %conversation, %trigger, error = %e, "Mark-read failed"),
            }
        }))
    }
}

impl std::fmt::Debug for ReadStateReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStateReconciler")
            .field("has_credential", &self.credential.is_some())
            .finish()
    }
}
