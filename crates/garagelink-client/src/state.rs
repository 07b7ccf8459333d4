//! Application context shared by the stores.
//!
//! Built once at startup and passed explicitly to whatever needs it. Holds
//! the configuration, the collaborator API, the socket connector and the
//! single [`NotificationAggregator`].

use std::sync::Arc;

use garagelink_net::{Connector, WsConnector};
use garagelink_shared::types::Credential;

use crate::api::{ChatApi, HttpChatApi};
use crate::config::ClientConfig;
use crate::conversation::{ConversationParams, ConversationStore};
use crate::error::ClientError;
use crate::notifications::NotificationAggregator;
use crate::read_state::ReadStateReconciler;

#[derive(Clone)]
pub struct AppContext {
    pub config: ClientConfig,
    pub api: Arc<dyn ChatApi>,
    pub connector: Arc<dyn Connector>,
    pub notifications: NotificationAggregator,
}

impl AppContext {
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ClientError> {
        let notifications =
            NotificationAggregator::new(api.clone(), connector.clone(), config.notification_channel()?);
        Ok(Self {
            config,
            api,
            connector,
            notifications,
        })
    }

    /// HTTP API and real websockets, as configured.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let api = Arc::new(HttpChatApi::new(&config.api_base)?);
        Self::new(config, api, Arc::new(WsConnector::default()))
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.config.access_token.as_ref()
    }

    pub fn reconciler(&self) -> ReadStateReconciler {
        ReadStateReconciler::new(self.api.clone(), self.credential().cloned())
    }

    /// A store for one conversation view. Nothing connects until
    /// [`ConversationStore::activate`].
    pub fn conversation(&self, params: ConversationParams) -> Result<ConversationStore, ClientError> {
        ConversationStore::new(params, self)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("notifications", &self.notifications)
            .finish()
    }
}
