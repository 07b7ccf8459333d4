//! Request/response collaborator: message history, mark-read and the
//! unread summary.

use futures::future::BoxFuture;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use garagelink_shared::constants::{MESSAGES_API_PATH, UNREAD_SUMMARY_API_PATH};
use garagelink_shared::error::RequestError;
use garagelink_shared::types::{ConversationId, Credential};
use garagelink_shared::{Message, NotificationSummary};

pub type ApiFuture<T> = BoxFuture<'static, Result<T, RequestError>>;

/// Authenticated calls the stores make besides the realtime channels.
///
/// Futures are `'static` so callers can hold them across their own event
/// loops or hand them to `tokio::spawn`.
pub trait ChatApi: Send + Sync + 'static {
    fn fetch_history(
        &self,
        conversation: &ConversationId,
        credential: &Credential,
    ) -> ApiFuture<Vec<Message>>;

    fn mark_read(&self, conversation: &ConversationId, credential: &Credential) -> ApiFuture<()>;

    fn fetch_unread_summary(&self, credential: &Credential) -> ApiFuture<NotificationSummary>;
}

/// History comes back either as a bare list or wrapped in `{messages: [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    List(Vec<Message>),
    Wrapped { messages: Vec<Message> },
}

impl From<HistoryResponse> for Vec<Message> {
    fn from(resp: HistoryResponse) -> Self {
        match resp {
            HistoryResponse::List(messages) | HistoryResponse::Wrapped { messages } => messages,
        }
    }
}

/// [`ChatApi`] over HTTP with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: Url,
}

impl HttpChatApi {
    pub fn new(base_url: &str) -> Result<Self, RequestError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, RequestError> {
        let base_url = Url::parse(base_url).map_err(|e| RequestError::Url(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RequestError> {
        self.base_url
            .join(path)
            .map_err(|e| RequestError::Url(e.to_string()))
    }

    fn conversation_path(conversation: &ConversationId, suffix: &str) -> String {
        format!("{MESSAGES_API_PATH}{conversation}/{suffix}")
    }
}

impl ChatApi for HttpChatApi {
    fn fetch_history(
        &self,
        conversation: &ConversationId,
        credential: &Credential,
    ) -> ApiFuture<Vec<Message>> {
        let url = self.endpoint(&Self::conversation_path(conversation, ""));
        let client = self.client.clone();
        let credential = credential.clone();
        Box::pin(async move {
            let resp: HistoryResponse = get_json(&client, url?, &credential).await?;
            Ok(resp.into())
        })
    }

    fn mark_read(&self, conversation: &ConversationId, credential: &Credential) -> ApiFuture<()> {
        let url = self.endpoint(&Self::conversation_path(conversation, "mark-read/"));
        let client = self.client.clone();
        let credential = credential.clone();
        Box::pin(async move {
            let url = url?;
            let endpoint = url.path().to_string();
            let resp = client
                .post(url)
                .bearer_auth(credential.as_str())
                .send()
                .await
                .map_err(|e| http_error(&endpoint, e))?;
            check_status(&endpoint, resp.status())?;
            debug!(endpoint = %endpoint, "Marked conversation read");
            Ok(())
        })
    }

    fn fetch_unread_summary(&self, credential: &Credential) -> ApiFuture<NotificationSummary> {
        let url = self.endpoint(UNREAD_SUMMARY_API_PATH);
        let client = self.client.clone();
        let credential = credential.clone();
        Box::pin(async move { get_json(&client, url?, &credential).await })
    }
}

async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: Url,
    credential: &Credential,
) -> Result<T, RequestError> {
    let endpoint = url.path().to_string();
    let resp = client
        .get(url)
        .bearer_auth(credential.as_str())
        .send()
        .await
        .map_err(|e| http_error(&endpoint, e))?;
    check_status(&endpoint, resp.status())?;

    resp.json::<T>().await.map_err(|e| RequestError::Decode {
        endpoint,
        reason: e.to_string(),
    })
}

fn http_error(endpoint: &str, e: reqwest::Error) -> RequestError {
    RequestError::Http {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    }
}

fn check_status(endpoint: &str, status: reqwest::StatusCode) -> Result<(), RequestError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(RequestError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}
