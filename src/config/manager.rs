//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file, then apply environment overrides.
    ///
    /// A missing file is not an error: defaults plus environment are used.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            tracing::warn!("Configuration file not found at {}, using defaults and environment", path.display());
            return Self::load_from_env();
        }

        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from defaults and environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }
}

impl Config {
    /// Override fields from `RELAYBOT_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(token) = std::env::var("RELAYBOT_TOKEN") {
            self.discord.token = token;
        }

        if let Ok(prefix) = std::env::var("RELAYBOT_PREFIX") {
            self.bot.command_prefix = prefix;
        }

        if let Ok(cooldown) = std::env::var("RELAYBOT_COOLDOWN") {
            self.bot.command_cooldown = humantime::parse_duration(&cooldown)
                .with_context(|| format!("Invalid RELAYBOT_COOLDOWN: {}", cooldown))?;
        }

        if let Ok(name) = std::env::var("RELAYBOT_WEBHOOK_NAME") {
            self.bot.webhook_name = name;
        }

        if let Ok(addr) = std::env::var("RELAYBOT_METRICS_ADDR") {
            self.monitoring.metrics_addr = addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid RELAYBOT_METRICS_ADDR: {}", addr))?;
            self.monitoring.enabled = true;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_discord_config()
            .with_context(|| "Discord configuration validation failed")?;

        self.validate_bot_config()
            .with_context(|| "Bot configuration validation failed")?;

        Ok(())
    }

    fn validate_discord_config(&self) -> Result<()> {
        if self.discord.token.trim().is_empty() {
            bail!("discord.token must be set (or RELAYBOT_TOKEN)");
        }

        if !self.discord.api_base.starts_with("http://") && !self.discord.api_base.starts_with("https://") {
            bail!("discord.api_base must be an http(s) URL");
        }

        if self.discord.request_timeout.is_zero() {
            bail!("discord.request_timeout must be greater than 0");
        }

        Ok(())
    }

    fn validate_bot_config(&self) -> Result<()> {
        let prefix = &self.bot.command_prefix;
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            bail!("bot.command_prefix must be non-empty and contain no whitespace");
        }

        let name_len = self.bot.webhook_name.chars().count();
        if name_len == 0 || name_len > 80 {
            bail!("bot.webhook_name must be between 1 and 80 characters");
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, token: Option<&str>, prefix: Option<&str>) {
        if let Some(token) = token {
            self.discord.token = token.to_string();
            tracing::info!("CLI override: bot token set");
        }

        if let Some(prefix) = prefix {
            self.bot.command_prefix = prefix.to_string();
            tracing::info!("CLI override: command prefix set to {}", prefix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.discord.token = "token".to_string();
        config
    }

    #[test]
    fn test_defaults_need_only_a_token() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_prefix_and_webhook_name() {
        let mut config = valid();
        config.bot.command_prefix = "! ".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.bot.webhook_name = "x".repeat(81);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_request_timeout() {
        let mut config = valid();
        config.discord.request_timeout = std::time::Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.merge_with_cli_args(Some("abc"), Some("!"));
        assert_eq!(config.discord.token, "abc");
        assert_eq!(config.bot.command_prefix, "!");
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", valid().discord);
        assert!(!rendered.contains("\"token\""));
        assert!(rendered.contains("<redacted>"));
    }
}
