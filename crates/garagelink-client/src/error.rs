use thiserror::Error;

use garagelink_net::EndpointError;
use garagelink_shared::error::{ChannelError, RequestError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No credential available")]
    AuthMissing,

    #[error("Channel error: {0}")]
    Channel(ChannelError),

    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Invalid endpoint configuration: {0}")]
    Endpoint(#[from] EndpointError),
}

impl From<ChannelError> for ClientError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::AuthMissing => Self::AuthMissing,
            other => Self::Channel(other),
        }
    }
}

/// Why a chat send was refused. The input buffer is left untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendRejected {
    #[error("Message is empty")]
    Empty,

    #[error("Chat is not available for this conversation")]
    Disabled,

    #[error("Chat is not connected")]
    NotOpen,

    #[error("Previous message is still being sent")]
    Settling,

    #[error("Channel refused the message: {0}")]
    Channel(String),
}

impl From<ChannelError> for SendRejected {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NotOpen => Self::NotOpen,
            other => Self::Channel(other.to_string()),
        }
    }
}
