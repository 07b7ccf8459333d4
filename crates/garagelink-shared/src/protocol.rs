use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::CHAT_SERVER_ERROR_FALLBACK;
use crate::error::ParseError;
use crate::types::{ConversationId, MessageId, SenderType, UserId};

/// A chat message as delivered by the server. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(alias = "senderType")]
    pub sender_type: SenderType,
    pub content: String,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default, alias = "serviceRequestId", skip_serializing_if = "Option::is_none")]
    pub service_request_id: Option<ConversationId>,
    #[serde(default, alias = "senderId", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(default, alias = "senderName", skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

/// Commands sent *to* the chat socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ChatCommand {
    /// Post a new message in the conversation.
    #[serde(rename = "chat.message")]
    Message { content: String },
}

/// Payloads received *from* the chat socket.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A single new message (enveloped or bare).
    Message(Message),
    /// The recent history, pushed by the server after connecting.
    History(Vec<Message>),
    /// The server refused an action (e.g. the conversation is closed).
    ServerError(String),
}

impl ChatEvent {
    /// Classify an inbound chat payload.
    ///
    /// Returns `Ok(None)` for shapes this client does not handle, and
    /// `Err` for recognized shapes whose body is malformed.
    pub fn from_payload(payload: Value) -> Result<Option<Self>, ParseError> {
        let Value::Object(mut obj) = payload else {
            return Ok(None);
        };

        let kind = obj.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("chat.message") => {
                let message = obj.remove("message").ok_or_else(|| ParseError::Malformed {
                    kind: "chat.message",
                    reason: "missing `message`".into(),
                })?;
                Ok(Some(Self::Message(decode("chat.message", message)?)))
            }
            Some("chat.history") => {
                let messages = obj.remove("messages").unwrap_or(Value::Array(Vec::new()));
                Ok(Some(Self::History(decode("chat.history", messages)?)))
            }
            Some("chat.error") => {
                let text = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(CHAT_SERVER_ERROR_FALLBACK)
                    .to_string();
                Ok(Some(Self::ServerError(text)))
            }
            Some(_) => Ok(None),
            None if obj.contains_key("id") && obj.contains_key("content") => {
                Ok(Some(Self::Message(decode("message", Value::Object(obj))?)))
            }
            None => Ok(None),
        }
    }
}

/// Per-conversation unread entry of a [`NotificationSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationItem {
    #[serde(
        rename = "service_request_id",
        alias = "serviceRequestId",
        alias = "conversation_id",
        alias = "conversationId"
    )]
    pub conversation_id: ConversationId,
    #[serde(alias = "unreadCount")]
    pub unread_count: u64,
    /// Display metadata (counterpart name, ...) passed through untouched.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Global unread state. Always replaced as a whole, never merged.
///
/// `total_unread_count` is authoritative: the server may count sources that
/// are not listed in `items`, so it is never recomputed from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSummary {
    #[serde(alias = "totalUnreadCount")]
    pub total_unread_count: u64,
    #[serde(default)]
    pub items: Vec<NotificationItem>,
}

impl NotificationSummary {
    /// Classify an inbound notification payload.
    ///
    /// Accepts `{"event": "notifications.update", "data": {...}}` and a bare
    /// summary object. Anything else yields `Ok(None)`.
    pub fn from_payload(payload: Value) -> Result<Option<Self>, ParseError> {
        let Value::Object(mut obj) = payload else {
            return Ok(None);
        };

        if obj.get("event").and_then(Value::as_str) == Some("notifications.update") {
            if let Some(data) = obj.remove("data") {
                return decode("notifications.update", data).map(Some);
            }
            return Ok(None);
        }

        if obj.contains_key("total_unread_count") || obj.contains_key("totalUnreadCount") {
            return decode("notification summary", Value::Object(obj)).map(Some);
        }

        Ok(None)
    }

    pub fn unread_for(&self, conversation: &ConversationId) -> u64 {
        self.items
            .iter()
            .filter(|item| &item.conversation_id == conversation)
            .map(|item| item.unread_count)
            .sum()
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, ParseError> {
    serde_json::from_value(value).map_err(|e| ParseError::Malformed {
        kind,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message_json(id: u64) -> Value {
        json!({
            "id": id,
            "sender_type": "PARTY_B",
            "content": "Your car is ready",
            "created_at": "2024-05-01T10:15:00+00:00",
            "sender_name": "Garage Nord",
        })
    }

    #[test]
    fn test_chat_command_wire_shape() {
        let cmd = ChatCommand::Message {
            content: "hello".into(),
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"type": "chat.message", "content": "hello"})
        );
    }

    #[test]
    fn test_enveloped_and_bare_messages() {
        let enveloped = json!({"type": "chat.message", "message": message_json(7)});
        let bare = message_json(7);

        let a = ChatEvent::from_payload(enveloped).unwrap().unwrap();
        let b = ChatEvent::from_payload(bare).unwrap().unwrap();
        assert_eq!(a, b);

        match a {
            ChatEvent::Message(m) => {
                assert_eq!(m.id.as_str(), "7");
                assert_eq!(m.sender_type, SenderType::PartyB);
                assert_eq!(m.sender_name.as_deref(), Some("Garage Nord"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_camel_case_message_fields() {
        let payload = json!({
            "id": "m-1",
            "senderType": "PARTY_A",
            "content": "hi",
            "createdAt": "2024-05-01T10:15:00Z",
        });
        let event = ChatEvent::from_payload(payload).unwrap().unwrap();
        assert!(matches!(event, ChatEvent::Message(m) if m.sender_type == SenderType::PartyA));
    }

    #[test]
    fn test_history_and_error_payloads() {
        let history = json!({"type": "chat.history", "messages": [message_json(1), message_json(2)]});
        match ChatEvent::from_payload(history).unwrap().unwrap() {
            ChatEvent::History(msgs) => assert_eq!(msgs.len(), 2),
            other => panic!("unexpected event: {other:?}"),
        }

        let err = ChatEvent::from_payload(json!({"type": "chat.error"})).unwrap().unwrap();
        assert_eq!(err, ChatEvent::ServerError(CHAT_SERVER_ERROR_FALLBACK.into()));
    }

    #[test]
    fn test_unknown_chat_shapes_are_ignored() {
        assert!(ChatEvent::from_payload(json!({"type": "typing"})).unwrap().is_none());
        assert!(ChatEvent::from_payload(json!({"hello": 1})).unwrap().is_none());
        assert!(ChatEvent::from_payload(json!([1, 2])).unwrap().is_none());
    }

    #[test]
    fn test_malformed_chat_message_is_parse_error() {
        let payload = json!({"type": "chat.message", "message": {"id": 1}});
        assert!(matches!(
            ChatEvent::from_payload(payload),
            Err(ParseError::Malformed { kind: "chat.message", .. })
        ));
    }

    #[test]
    fn test_message_without_sender_type_is_parse_error() {
        let payload = json!({
            "type": "chat.message",
            "message": {
                "id": 3,
                "content": "hi",
                "created_at": "2024-05-01T10:15:00Z",
                "sender_id": 12,
                "sender_name": "Garage Nord",
            },
        });
        assert!(matches!(
            ChatEvent::from_payload(payload),
            Err(ParseError::Malformed { kind: "chat.message", .. })
        ));
    }

    #[test]
    fn test_enveloped_summary() {
        let payload = json!({
            "event": "notifications.update",
            "data": {
                "totalUnreadCount": 3,
                "items": [{"conversationId": "sr-1", "unreadCount": 3}]
            }
        });
        let summary = NotificationSummary::from_payload(payload).unwrap().unwrap();
        assert_eq!(summary.total_unread_count, 3);
        assert_eq!(summary.items.len(), 1);
        assert_eq!(summary.unread_for(&ConversationId::from("sr-1")), 3);
    }

    #[test]
    fn test_bare_summary_keeps_metadata() {
        let payload = json!({
            "total_unread_count": 5,
            "items": [{"service_request_id": 12, "unread_count": 2, "counterpart_name": "Ana"}]
        });
        let summary = NotificationSummary::from_payload(payload).unwrap().unwrap();
        // Server total wins over the item sum.
        assert_eq!(summary.total_unread_count, 5);
        let item = &summary.items[0];
        assert_eq!(item.conversation_id.as_str(), "12");
        assert_eq!(item.metadata.get("counterpart_name"), Some(&json!("Ana")));
    }

    #[test]
    fn test_unrecognized_notification_shapes() {
        let legacy = json!({"type": "notifications.update", "item": {"unread_count": 1}});
        assert!(NotificationSummary::from_payload(legacy).unwrap().is_none());
        assert!(NotificationSummary::from_payload(json!("text")).unwrap().is_none());
        assert!(NotificationSummary::from_payload(json!({"total_unread_count": -1})).is_err());
    }
}
