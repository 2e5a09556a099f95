//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::discord::{DEFAULT_API_BASE, DEFAULT_INTENTS};
use crate::relay::DEFAULT_WEBHOOK_NAME;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub bot: BotConfig,
    pub monitoring: MonitoringConfig,
}

/// Discord connection configuration
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: String,
    pub api_base: String,
    pub gateway_intents: u64,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

// Keeps the token out of logs.
impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("api_base", &self.api_base)
            .field("gateway_intents", &self.gateway_intents)
            .field("request_timeout", &self.request_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

/// Command and relay behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BotConfig {
    pub command_prefix: String,
    #[serde(with = "humantime_serde")]
    pub command_cooldown: Duration,
    pub webhook_name: String,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub metrics_addr: SocketAddr,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            gateway_intents: DEFAULT_INTENTS,
            request_timeout: Duration::from_secs(15),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: "?".to_string(),
            command_cooldown: Duration::from_secs(3),
            webhook_name: DEFAULT_WEBHOOK_NAME.to_string(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            metrics_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}
