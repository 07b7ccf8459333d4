/// Application name
pub const APP_NAME: &str = "GarageLink";

/// WebSocket close code for a normal, intentional closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Default realtime host
pub const DEFAULT_WS_HOST: &str = "localhost";

/// Default realtime ports, tried in order
pub const DEFAULT_WS_PORTS: [u16; 2] = [8000, 8001];

/// Default base URL of the request/response API
pub const DEFAULT_API_BASE: &str = "http://localhost:8000";

/// Delay before trying the next endpoint of the same cycle
pub const FAILOVER_DELAY_MS: u64 = 1_000;

/// Delay before restarting a full cycle on the chat channel
pub const CHAT_RETRY_DELAY_MS: u64 = 3_000;

/// Delay before restarting a full cycle on the notification channel
pub const NOTIFICATION_RETRY_DELAY_MS: u64 = 5_000;

/// How long a sent chat message may stay unconfirmed before the
/// input is released again
pub const SEND_SETTLE_TIMEOUT_MS: u64 = 5_000;

/// Socket path prefix of the per-conversation chat endpoint
pub const CHAT_SOCKET_PATH_PREFIX: &str = "/ws/chat/";

/// Socket path of the per-user notification endpoint
pub const NOTIFICATION_SOCKET_PATH: &str = "/ws/notifications/";

/// REST paths (relative to the API base)
pub const MESSAGES_API_PATH: &str = "/api/messages/";
pub const UNREAD_SUMMARY_API_PATH: &str = "/api/messages/unread-summary/";

/// Display texts
pub const CHAT_UNAVAILABLE_TEXT: &str = "Chat will be available once a workshop is connected.";
pub const CHAT_EMPTY_TEXT: &str = "Start the conversation for this service.";
pub const CHAT_SERVER_ERROR_FALLBACK: &str = "Chat not available.";
