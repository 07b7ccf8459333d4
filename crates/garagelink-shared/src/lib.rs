//! # garagelink-shared
//!
//! Types shared by the realtime layer: identifiers, the chat and
//! notification wire shapes, the error taxonomy and protocol constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{ChannelError, ParseError, RequestError, TransportError};
pub use protocol::{
    ChatCommand, ChatEvent, Message, NotificationItem, NotificationSummary,
};
pub use types::{ConversationId, Credential, MessageId, SenderType, UserId};
