//! Endpoint candidates and socket URL construction.
//!
//! The realtime service may be exposed on more than one host/port and the
//! client cannot know in advance which one is reachable, so every channel
//! purpose carries an ordered, non-empty candidate list.

use thiserror::Error;
use url::Url;

use garagelink_shared::constants::{CHAT_SOCKET_PATH_PREFIX, NOTIFICATION_SOCKET_PATH};
use garagelink_shared::types::{ConversationId, Credential};

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Endpoint candidate list is empty")]
    Empty,

    #[error("Invalid socket URL: {0}")]
    Url(#[from] url::ParseError),
}

/// One connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// `wss://` instead of `ws://`.
    pub secure: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
        }
    }

    pub fn with_tls(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.scheme(), self.host, self.port)
    }
}

/// Ordered candidate list. Index 0 is always where a new cycle starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointList(Vec<Endpoint>);

impl EndpointList {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, EndpointError> {
        if endpoints.is_empty() {
            return Err(EndpointError::Empty);
        }
        Ok(Self(endpoints))
    }

    /// Same host, one candidate per port, in the given order.
    pub fn from_ports(host: &str, ports: &[u16], secure: bool) -> Result<Self, EndpointError> {
        Self::new(
            ports
                .iter()
                .map(|&port| Endpoint::new(host, port).with_tls(secure))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    // Never empty, but clippy wants the pair.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.0.len() - 1
    }

    pub fn first(&self) -> &Endpoint {
        &self.0[0]
    }

    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.0.get(index)
    }
}

/// Which realtime service a channel talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelPurpose {
    /// Per-conversation chat socket.
    Chat(ConversationId),
    /// Per-user notification stream.
    Notifications,
}

impl ChannelPurpose {
    pub fn path(&self) -> String {
        match self {
            Self::Chat(conversation) => format!("{CHAT_SOCKET_PATH_PREFIX}{conversation}/"),
            Self::Notifications => NOTIFICATION_SOCKET_PATH.to_string(),
        }
    }

    /// Short name used in log fields.
    pub fn label(&self) -> String {
        match self {
            Self::Chat(conversation) => format!("chat:{conversation}"),
            Self::Notifications => "notifications".to_string(),
        }
    }
}

/// Build `ws[s]://host:port<path>?token=<credential>`.
pub fn socket_url(
    endpoint: &Endpoint,
    path: &str,
    credential: &Credential,
) -> Result<Url, EndpointError> {
    let mut url = Url::parse(&endpoint.to_string())?;
    url.set_path(path);
    url.query_pairs_mut()
        .append_pair("token", credential.as_str());
    Ok(url)
}

/// The URL without its query string, safe to log.
pub fn display_url(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
