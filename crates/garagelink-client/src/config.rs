//! Client configuration loaded from environment variables.
//!
//! All settings have defaults matching a local development backend, so the
//! client starts with zero configuration.

use std::time::Duration;

use url::Url;

use garagelink_net::{ChannelConfig, ChannelPurpose, EndpointError, EndpointList, RetryPolicy};
use garagelink_shared::constants::{
    CHAT_RETRY_DELAY_MS, DEFAULT_API_BASE, DEFAULT_WS_HOST, DEFAULT_WS_PORTS, FAILOVER_DELAY_MS,
    NOTIFICATION_RETRY_DELAY_MS, SEND_SETTLE_TIMEOUT_MS,
};
use garagelink_shared::types::{ConversationId, Credential};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Host of the realtime service.
    /// Env: `GARAGELINK_WS_HOST`
    /// Default: `localhost`
    pub ws_host: String,

    /// Candidate ports, tried in order.
    /// Env: `GARAGELINK_WS_PORTS` (comma separated)
    /// Default: `8000,8001`
    pub ws_ports: Vec<u16>,

    /// Env: `GARAGELINK_WS_SECURE` (true/false)
    /// Default: `false`
    pub ws_secure: bool,

    /// Base URL of the request/response API.
    /// Env: `GARAGELINK_API_BASE`
    /// Default: `http://localhost:8000`
    pub api_base: String,

    /// Env: `GARAGELINK_FAILOVER_DELAY_MS`
    pub failover_delay: Duration,

    /// Env: `GARAGELINK_CHAT_RETRY_MS`
    pub chat_retry_delay: Duration,

    /// Env: `GARAGELINK_NOTIFICATION_RETRY_MS`
    pub notification_retry_delay: Duration,

    /// How long a send may stay unconfirmed.
    /// Env: `GARAGELINK_SEND_SETTLE_MS`
    pub send_settle_timeout: Duration,

    /// Env: `GARAGELINK_ACCESS_TOKEN`
    /// Default: none (nothing connects until one is supplied).
    pub access_token: Option<Credential>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_host: DEFAULT_WS_HOST.to_string(),
            ws_ports: DEFAULT_WS_PORTS.to_vec(),
            ws_secure: false,
            api_base: DEFAULT_API_BASE.to_string(),
            failover_delay: Duration::from_millis(FAILOVER_DELAY_MS),
            chat_retry_delay: Duration::from_millis(CHAT_RETRY_DELAY_MS),
            notification_retry_delay: Duration::from_millis(NOTIFICATION_RETRY_DELAY_MS),
            send_settle_timeout: Duration::from_millis(SEND_SETTLE_TIMEOUT_MS),
            access_token: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("GARAGELINK_WS_HOST") {
            if !host.trim().is_empty() {
                config.ws_host = host.trim().to_string();
            }
        }

        if let Some(ports) = lookup("GARAGELINK_WS_PORTS") {
            match parse_ports(&ports) {
                Some(parsed) => config.ws_ports = parsed,
                None => {
                    tracing::warn!(value = %ports, "Invalid GARAGELINK_WS_PORTS, using default");
                }
            }
        }

        if let Some(val) = lookup("GARAGELINK_WS_SECURE") {
            config.ws_secure = val != "false" && val != "0";
        }

        if let Some(base) = lookup("GARAGELINK_API_BASE") {
            match Url::parse(&base) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                    config.api_base = base;
                }
                _ => {
                    tracing::warn!(value = %base, "Invalid GARAGELINK_API_BASE, using default");
                }
            }
        }

        read_millis(&lookup, "GARAGELINK_FAILOVER_DELAY_MS", &mut config.failover_delay);
        read_millis(&lookup, "GARAGELINK_CHAT_RETRY_MS", &mut config.chat_retry_delay);
        read_millis(
            &lookup,
            "GARAGELINK_NOTIFICATION_RETRY_MS",
            &mut config.notification_retry_delay,
        );
        read_millis(&lookup, "GARAGELINK_SEND_SETTLE_MS", &mut config.send_settle_timeout);

        if let Some(token) = lookup("GARAGELINK_ACCESS_TOKEN") {
            config.access_token = Credential::new(token);
        }

        config
    }

    pub fn endpoints(&self) -> Result<EndpointList, EndpointError> {
        EndpointList::from_ports(&self.ws_host, &self.ws_ports, self.ws_secure)
    }

    pub fn chat_policy(&self) -> RetryPolicy {
        RetryPolicy {
            failover_delay: self.failover_delay,
            cycle_delay: self.chat_retry_delay,
        }
    }

    pub fn notification_policy(&self) -> RetryPolicy {
        RetryPolicy {
            failover_delay: self.failover_delay,
            cycle_delay: self.notification_retry_delay,
        }
    }

    pub fn chat_channel(&self, conversation: &ConversationId) -> Result<ChannelConfig, EndpointError> {
        Ok(ChannelConfig::new(
            &ChannelPurpose::Chat(conversation.clone()),
            self.endpoints()?,
            self.chat_policy(),
        ))
    }

    pub fn notification_channel(&self) -> Result<ChannelConfig, EndpointError> {
        Ok(ChannelConfig::new(
            &ChannelPurpose::Notifications,
            self.endpoints()?,
            self.notification_policy(),
        ))
    }
}

/// Comma-separated list of ports; `None` if empty or any entry is invalid.
fn parse_ports(value: &str) -> Option<Vec<u16>> {
    let ports = value
        .split(',')
        .map(|p| p.trim().parse::<u16>().ok().filter(|&p| p != 0))
        .collect::<Option<Vec<_>>>()?;
    if ports.is_empty() {
        None
    } else {
        Some(ports)
    }
}

/// Positive millisecond count. Zero would turn retries into a busy loop.
fn read_millis(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut Duration) {
    if let Some(val) = lookup(key) {
        match val.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => *target = Duration::from_millis(ms),
            _ => tracing::warn!(key, value = %val, "Invalid duration, using default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.ws_host, "localhost");
        assert_eq!(config.ws_ports, vec![8000, 8001]);
        assert_eq!(config.api_base, "http://localhost:8000");
        assert_eq!(config.chat_policy(), RetryPolicy::chat());
        assert_eq!(config.notification_policy(), RetryPolicy::notifications());
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GARAGELINK_WS_HOST", "rt.example.org"),
            ("GARAGELINK_WS_PORTS", "443, 8443"),
            ("GARAGELINK_WS_SECURE", "true"),
            ("GARAGELINK_API_BASE", "https://api.example.org"),
            ("GARAGELINK_CHAT_RETRY_MS", "250"),
            ("GARAGELINK_ACCESS_TOKEN", "abc"),
        ]));

        assert_eq!(config.ws_ports, vec![443, 8443]);
        assert!(config.ws_secure);
        assert_eq!(config.chat_retry_delay, Duration::from_millis(250));
        assert_eq!(config.access_token.as_ref().map(Credential::as_str), Some("abc"));

        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints.first().to_string(), "wss://rt.example.org:443");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GARAGELINK_WS_PORTS", "8000,abc"),
            ("GARAGELINK_API_BASE", "not a url"),
            ("GARAGELINK_FAILOVER_DELAY_MS", "-5"),
            ("GARAGELINK_ACCESS_TOKEN", "   "),
        ]));

        assert_eq!(config.ws_ports, vec![8000, 8001]);
        assert_eq!(config.api_base, "http://localhost:8000");
        assert_eq!(config.failover_delay, Duration::from_secs(1));
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_zero_delays_are_rejected() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("GARAGELINK_FAILOVER_DELAY_MS", "0"),
            ("GARAGELINK_CHAT_RETRY_MS", "0"),
            ("GARAGELINK_NOTIFICATION_RETRY_MS", " 0 "),
            ("GARAGELINK_SEND_SETTLE_MS", "0"),
        ]));

        assert_eq!(config.chat_policy(), RetryPolicy::chat());
        assert_eq!(config.notification_policy(), RetryPolicy::notifications());
        assert_eq!(config.send_settle_timeout, ClientConfig::default().send_settle_timeout);
    }

    #[test]
    fn test_parse_ports() {
        assert_eq!(parse_ports("8000"), Some(vec![8000]));
        assert_eq!(parse_ports(""), None);
        assert_eq!(parse_ports("0"), None);
        assert_eq!(parse_ports("70000"), None);
    }

    #[test]
    fn test_channel_configs() {
        let config = ClientConfig::default();
        let chat = config.chat_channel(&ConversationId::from("9")).unwrap();
        assert_eq!(chat.path, "/ws/chat/9/");
        assert_eq!(chat.label, "chat:9");
        let notifications = config.notification_channel().unwrap();
        assert_eq!(notifications.path, "/ws/notifications/");
    }
}
