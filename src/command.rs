//! Command Dispatch
//!
//! Parses prefixed chat commands and runs the `relay` command on behalf of
//! administrators. Errors never escape: every outcome becomes a reply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::platform::{ChatPlatform, SourceMessage};
use crate::relay::RelayController;

pub const RELAY_COMMAND: &str = "relay";

pub const PERMISSION_DENIED: &str = "You need the Administrator permission to use this command.";
pub const GUILD_ONLY: &str = "This command can only be used in a server.";

/// Parsed shape of `relay` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    Start { source: String, target: String },
    Stop,
    Invalid,
}

impl RelayCommand {
    /// Two arguments always mean start; otherwise a leading `stop` means stop
    pub fn parse(args: &[&str]) -> Self {
        match args {
            [source, target] => RelayCommand::Start {
                source: source.to_string(),
                target: target.to_string(),
            },
            ["stop", ..] => RelayCommand::Stop,
            _ => RelayCommand::Invalid,
        }
    }
}

/// Usage line of the relay command for a given prefix
pub fn relay_usage(prefix: &str) -> String {
    format!(
        "{p}relay <source-channel-id> <target-channel-id> OR {p}relay stop",
        p = prefix
    )
}

/// Routes command messages to the relay controller and replies in-channel
pub struct CommandDispatcher {
    platform: Arc<dyn ChatPlatform>,
    controller: Arc<RelayController>,
    metrics: Arc<Metrics>,
    prefix: String,
    cooldown: Duration,
    last_used: Mutex<HashMap<String, Instant>>,
}

impl CommandDispatcher {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        controller: Arc<RelayController>,
        metrics: Arc<Metrics>,
        prefix: impl Into<String>,
        cooldown: Duration,
    ) -> Self {
        Self {
            platform,
            controller,
            metrics,
            prefix: prefix.into(),
            cooldown,
            last_used: Mutex::new(HashMap::new()),
        }
    }

    /// Split a message into command name and arguments, if it is a command
    pub fn parse_invocation<'a>(&self, content: &'a str) -> Option<(&'a str, Vec<&'a str>)> {
        let rest = content.strip_prefix(self.prefix.as_str())?;
        let mut words = rest.split_whitespace();
        let name = words.next()?;
        Some((name, words.collect()))
    }

    /// Whether a message should be handed to [`handle`](Self::handle)
    pub fn is_command(&self, message: &SourceMessage) -> bool {
        !message.author.bot
            && matches!(
                self.parse_invocation(&message.content),
                Some((name, _)) if name.eq_ignore_ascii_case(RELAY_COMMAND)
            )
    }

    /// Handle a chat message. Returns the reply sent, or `None` if the
    /// message was not a relay command.
    pub async fn handle(&self, message: &SourceMessage) -> Option<String> {
        if !self.is_command(message) {
            return None;
        }
        let (_, args) = self.parse_invocation(&message.content)?;

        let reply = self.authorize_and_run(message, &args).await;
        if let Err(e) = self.platform.send_message(&message.channel_id, &reply).await {
            warn!(channel_id = %message.channel_id, error = %e, "Failed to send command reply");
        }
        Some(reply)
    }

    async fn authorize_and_run(&self, message: &SourceMessage, args: &[&str]) -> String {
        let Some(guild_id) = message.guild_id.as_deref() else {
            return GUILD_ONLY.to_string();
        };

        match self.platform.member_is_admin(guild_id, &message.author.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(user_id = %message.author.id, "Relay command denied");
                return PERMISSION_DENIED.to_string();
            }
            Err(e) => {
                warn!(user_id = %message.author.id, error = %e, "Permission check failed");
                return PERMISSION_DENIED.to_string();
            }
        }

        if let Some(remaining) = self.cooldown_remaining(&message.author.id) {
            let secs = remaining.as_secs_f64().ceil().max(1.0) as u64;
            return format!(
                "Please wait {} more second(s) before reusing the relay command.",
                secs
            );
        }

        self.metrics.record_command();
        info!(
            user_id = %message.author.id,
            channel_id = %message.channel_id,
            args = ?args,
            "Running relay command"
        );
        self.execute(&message.channel_id, args).await
    }

    /// Run the relay command for a caller in `channel_id`
    pub async fn execute(&self, channel_id: &str, args: &[&str]) -> String {
        match RelayCommand::parse(args) {
            RelayCommand::Start { source, target } => {
                self.controller.start(&source, &target).await.to_string()
            }
            RelayCommand::Stop => self.controller.stop(channel_id).to_string(),
            RelayCommand::Invalid => format!(
                "Invalid command format. Usage: `{}`",
                relay_usage(&self.prefix)
            ),
        }
    }

    /// Time left on the user's cooldown; starts a new one when none is left
    fn cooldown_remaining(&self, user_id: &str) -> Option<Duration> {
        let mut last_used = self.last_used.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if let Some(previous) = last_used.get(user_id) {
            let elapsed = now.duration_since(*previous);
            if elapsed < self.cooldown {
                return Some(self.cooldown - elapsed);
            }
        }
        let cooldown = self.cooldown;
        last_used.retain(|_, used| now.duration_since(*used) < cooldown);
        last_used.insert(user_id.to_string(), now);
        None
    }

    #[cfg(test)]
    fn tracked_cooldowns(&self) -> usize {
        self.last_used.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shapes() {
        assert_eq!(
            RelayCommand::parse(&["1", "2"]),
            RelayCommand::Start {
                source: "1".to_string(),
                target: "2".to_string()
            }
        );
        assert_eq!(RelayCommand::parse(&["stop"]), RelayCommand::Stop);
        assert_eq!(RelayCommand::parse(&["stop", "now", "please"]), RelayCommand::Stop);
        assert_eq!(
            RelayCommand::parse(&["stop", "2"]),
            RelayCommand::Start {
                source: "stop".to_string(),
                target: "2".to_string()
            }
        );
        assert_eq!(RelayCommand::parse(&[]), RelayCommand::Invalid);
        assert_eq!(RelayCommand::parse(&["1"]), RelayCommand::Invalid);
    }

    #[tokio::test]
    async fn test_expired_cooldowns_are_pruned() {
        let platform: Arc<dyn ChatPlatform> =
            Arc::new(crate::discord::DiscordClient::with_base_url("t", "http://127.0.0.1:9"));
        let metrics = Arc::new(Metrics::new());
        let controller = Arc::new(RelayController::new(Arc::clone(&platform), "Relay Bot", Arc::clone(&metrics)));
        let dispatcher = CommandDispatcher::new(platform, controller, metrics, "?", Duration::from_millis(20));

        assert!(dispatcher.cooldown_remaining("1").is_none());
        assert!(dispatcher.cooldown_remaining("2").is_none());
        assert!(dispatcher.cooldown_remaining("1").is_some());
        assert_eq!(dispatcher.tracked_cooldowns(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(dispatcher.cooldown_remaining("3").is_none());
        assert_eq!(dispatcher.tracked_cooldowns(), 1);
    }

    #[test]
    fn test_usage_string() {
        assert_eq!(
            relay_usage("?"),
            "?relay <source-channel-id> <target-channel-id> OR ?relay stop"
        );
    }
}
