use thiserror::Error;

/// Socket-level failures. Never fatal: they feed the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("Socket session already closed")]
    SessionClosed,
}

/// A single inbound payload could not be understood.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed {kind} payload: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

/// A request/response collaborator call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Request to {endpoint} failed: {reason}")]
    Http { endpoint: String, reason: String },

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Invalid request URL: {0}")]
    Url(String),
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("No credential available")]
    AuthMissing,

    #[error("Channel is not open")]
    NotOpen,

    #[error("Channel has been closed")]
    Closed,

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}
