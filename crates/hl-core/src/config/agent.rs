//! Agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::backoff::BackoffConfig;
use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConnectionError;

/// Configuration for the host agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Broker endpoint the agent dials out to
    pub proxy_url: String,

    /// Credential presented to the broker as the `token` query parameter
    pub token: Option<String>,

    /// Connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Keepalive (ping/pong watchdog) settings
    pub keepalive: KeepaliveConfig,

    /// Per-session queue sizes
    pub queues: QueueConfig,

    /// Proxy handler settings
    pub proxy: ProxyConfig,

    /// Session token validation
    pub auth: AuthConfig,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            proxy_url: "ws://localhost:8080/v1/connectbackend".to_string(),
            token: None,
            connect_timeout: Duration::from_secs(30),
            keepalive: KeepaliveConfig::default(),
            queues: QueueConfig::default(),
            proxy: ProxyConfig::default(),
            auth: AuthConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Ping/pong liveness settings for the broker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// How often a ping is written (milliseconds)
    #[serde(with = "duration_millis")]
    pub ping_interval: Duration,

    /// How often the watchdog checks the last pong (milliseconds)
    #[serde(with = "duration_millis")]
    pub check_interval: Duration,

    /// Longest tolerated silence between pongs (milliseconds)
    #[serde(with = "duration_millis")]
    pub max_wait: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            check_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(10),
        }
    }
}

/// Bounded queue capacities
///
/// The outbound queue is shared by every session on a connection and is the
/// only path to the WebSocket writer. Each session gets its own inbound queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Messages buffered per session from broker to handler
    pub inbound_capacity: usize,

    /// Messages buffered from all handlers to the writer
    pub outbound_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 10,
            outbound_capacity: 10,
        }
    }
}

/// Proxy handler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Path prefix the proxy handler is registered under
    pub path_prefix: String,

    /// Accept self-signed certificates on buffered HTTPS targets
    pub insecure_skip_verify: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/v1/container-proxy/".to_string(),
            insecure_skip_verify: true,
        }
    }
}

/// Session token validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require a valid token in each session's initial message
    pub enabled: bool,

    /// Key the presented tokens are checked against
    pub shared_key: Option<String>,
}

impl AgentConfig {
    /// Broker URL with the agent token attached as a query parameter
    pub fn connect_url(&self) -> Result<Url, ConnectionError> {
        let mut url = Url::parse(&self.proxy_url).map_err(|e| ConnectionError::InvalidUrl {
            url: self.proxy_url.clone(),
            reason: e.to_string(),
        })?;
        if let Some(token) = self.token.as_deref().filter(|token| !token.is_empty()) {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }
}
