//! Configuration file loading tests

use relaybot::config::ConfigManager;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
[discord]
token = "abc"
api_base = "http://127.0.0.1:8080/api"
gateway_intents = 33281
request_timeout = "30s"
reconnect_delay = "2s 500ms"

[bot]
command_prefix = "!"
command_cooldown = "5s"
webhook_name = "Mirror"
shutdown_timeout = "1m"

[monitoring]
enabled = true
metrics_addr = "0.0.0.0:9100"
"#,
    );

    let config = assert_ok!(ConfigManager::load_from_file(file.path()));
    assert_ok!(config.validate());

    assert_eq!(config.discord.api_base, "http://127.0.0.1:8080/api");
    assert_eq!(config.discord.gateway_intents, 33281);
    assert_eq!(config.discord.request_timeout, Duration::from_secs(30));
    assert_eq!(config.discord.reconnect_delay, Duration::from_millis(2500));
    assert_eq!(config.bot.command_cooldown, Duration::from_secs(5));
    assert_eq!(config.bot.webhook_name, "Mirror");
    assert_eq!(config.bot.shutdown_timeout, Duration::from_secs(60));
    assert!(config.monitoring.enabled);
    assert_eq!(config.monitoring.metrics_addr.port(), 9100);
}

#[test]
fn test_partial_config_uses_defaults() {
    let file = write_config(
        r#"
[discord]
token = "abc"
"#,
    );

    let config = assert_ok!(ConfigManager::load_from_file(file.path()));
    assert_ok!(config.validate());

    assert_eq!(config.discord.api_base, "https://discord.com/api/v10");
    assert_eq!(config.bot.command_cooldown, Duration::from_secs(3));
    assert_eq!(config.bot.webhook_name, "Relay Bot");
    assert!(!config.monitoring.enabled);
}

#[test]
fn test_malformed_config_is_an_error() {
    let file = write_config("[bot]\ncommand_cooldown = \"soon\"\n");
    assert_err!(ConfigManager::load_from_file(file.path()));

    let file = write_config("this is not toml");
    assert_err!(ConfigManager::load_from_file(file.path()));
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigManager::load_from_file(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.bot.command_prefix, "?");
}
