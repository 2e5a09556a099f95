//! Relay Controller
//!
//! Starts and stops relays, and turns each captured source message into a
//! webhook delivery.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::provisioner::WebhookProvisioner;
use super::registry::RelayRegistry;
use super::rewriter::{mentioned_user_ids, rewrite};
use super::session::{ListenerHandle, RelaySession, RelayStats, SessionActivity, StopSignal};
use crate::metrics::Metrics;
use crate::platform::{
    ChatPlatform, MessageSubscription, OutboundFile, SourceMessage, Webhook, WebhookPayload,
};

/// Raw-body marker of a custom emoji token such as `<:name:id>`
pub const CUSTOM_EMOJI_MARKER: &str = "<:";

/// Result of a relay command, rendered as the user-facing reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Started { source: String, target: String },
    InvalidChannel,
    AlreadyActive { target: String },
    ProvisioningFailed,
    Stopped { target: String },
    NothingToStop { target: String },
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayOutcome::Started { source, target } => {
                write!(f, "Started relaying messages from <#{}> to <#{}>.", source, target)
            }
            RelayOutcome::InvalidChannel => write!(f, "Invalid channel ID provided."),
            RelayOutcome::AlreadyActive { target } => {
                write!(f, "Relaying to <#{}> is already active.", target)
            }
            RelayOutcome::ProvisioningFailed => {
                write!(f, "Failed to start relaying. Could not create/get a webhook.")
            }
            RelayOutcome::Stopped { target } => {
                write!(f, "Stopped relaying messages to <#{}>.", target)
            }
            RelayOutcome::NothingToStop { target } => {
                write!(f, "No active relaying to stop for <#{}>.", target)
            }
        }
    }
}

/// Build the webhook payload for a source message.
///
/// Returns `None` when the message carries nothing worth relaying: no body,
/// no attachments, no embeds and no custom emoji.
pub fn compose_payload<F>(message: &SourceMessage, resolve: F) -> Option<WebhookPayload>
where
    F: Fn(&str) -> Option<String>,
{
    let content = (!message.content.is_empty()).then(|| rewrite(&message.content, &resolve));

    let files = (!message.attachments.is_empty()).then(|| {
        message
            .attachments
            .iter()
            .map(|attachment| OutboundFile {
                url: attachment.url.clone(),
                name: attachment.name.clone(),
            })
            .collect::<Vec<_>>()
    });

    let embeds = (!message.embeds.is_empty()).then(|| message.embeds.clone());

    let has_emoji = message.content.contains(CUSTOM_EMOJI_MARKER);
    if content.is_none() && files.is_none() && embeds.is_none() && !has_emoji {
        return None;
    }

    Some(WebhookPayload {
        username: message.author.username.clone(),
        avatar_url: message.author.avatar_url.clone(),
        content,
        files,
        embeds,
    })
}

/// Everything a session's listener needs to forward messages
struct RelayPipeline {
    platform: Arc<dyn ChatPlatform>,
    webhook: Arc<Webhook>,
    activity: Arc<SessionActivity>,
    metrics: Arc<Metrics>,
    target_channel_id: String,
}

impl RelayPipeline {
    async fn run(self, mut subscription: MessageSubscription, stop: StopSignal) {
        debug!(
            source_channel = %subscription.channel_id(),
            target_channel = %self.target_channel_id,
            "Relay listener started"
        );

        while let Some(message) = subscription.recv().await {
            // Abort only lands at the next yield; the signal is seen right away.
            if stop.is_raised() {
                break;
            }
            self.handle(message).await;
        }

        debug!(target_channel = %self.target_channel_id, "Relay listener ended");
    }

    async fn handle(&self, message: SourceMessage) {
        if message.webhook_id.as_deref() == Some(self.webhook.id.as_str()) {
            debug!(message_id = %message.id, "Skipping message posted by this relay");
            return;
        }

        let names = self.resolve_mentions(&message).await;
        let Some(payload) = compose_payload(&message, |id| names.get(id).cloned()) else {
            debug!(message_id = %message.id, "Skipping empty source message");
            self.metrics.record_dropped();
            return;
        };

        // Fire and forget: the listener never waits on delivery.
        let platform = Arc::clone(&self.platform);
        let webhook = Arc::clone(&self.webhook);
        let activity = Arc::clone(&self.activity);
        let metrics = Arc::clone(&self.metrics);
        let target_channel_id = self.target_channel_id.clone();
        tokio::spawn(async move {
            match platform.execute_webhook(&webhook, &payload).await {
                Ok(()) => {
                    activity.record_delivery();
                    metrics.record_forwarded();
                }
                Err(e) => {
                    error!(
                        target_channel = %target_channel_id,
                        webhook_id = %webhook.id,
                        error = %e,
                        "Failed to send message through webhook"
                    );
                    metrics.record_delivery_failure();
                }
            }
        });
    }

    async fn resolve_mentions(&self, message: &SourceMessage) -> HashMap<String, String> {
        let mut names = HashMap::new();
        let Some(guild_id) = message.guild_id.as_deref() else {
            return names;
        };

        for user_id in mentioned_user_ids(&message.content) {
            match self.platform.member_display_name(guild_id, &user_id).await {
                Ok(Some(name)) => {
                    names.insert(user_id, name);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(user_id = %user_id, error = %e, "Mention lookup failed");
                }
            }
        }
        names
    }
}

/// Owns the relay registry and drives relay lifecycles
pub struct RelayController {
    platform: Arc<dyn ChatPlatform>,
    provisioner: WebhookProvisioner,
    registry: RelayRegistry,
    metrics: Arc<Metrics>,
}

impl RelayController {
    /// Create a controller with an empty registry
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        webhook_name: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let provisioner = WebhookProvisioner::new(Arc::clone(&platform), webhook_name);
        Self {
            platform,
            provisioner,
            registry: RelayRegistry::new(),
            metrics,
        }
    }

    /// Start relaying `source_channel_id` into `target_channel_id`
    pub async fn start(&self, source_channel_id: &str, target_channel_id: &str) -> RelayOutcome {
        if !self.channel_exists(source_channel_id).await
            || !self.channel_exists(target_channel_id).await
        {
            return RelayOutcome::InvalidChannel;
        }

        if self.registry.has(target_channel_id) {
            return RelayOutcome::AlreadyActive {
                target: target_channel_id.to_string(),
            };
        }

        let Some(webhook) = self.provisioner.provision(target_channel_id).await else {
            return RelayOutcome::ProvisioningFailed;
        };

        // Another start may have won the race while provisioning.
        let inserted = self.registry.try_insert_with(target_channel_id, || {
            self.attach_listener(source_channel_id, target_channel_id, webhook)
        });
        if inserted.is_none() {
            return RelayOutcome::AlreadyActive {
                target: target_channel_id.to_string(),
            };
        }

        self.metrics.set_active_sessions(self.registry.len());
        info!(
            source_channel = %source_channel_id,
            target_channel = %target_channel_id,
            "Started relay"
        );

        RelayOutcome::Started {
            source: source_channel_id.to_string(),
            target: target_channel_id.to_string(),
        }
    }

    /// Stop the relay delivering into `target_channel_id`
    pub fn stop(&self, target_channel_id: &str) -> RelayOutcome {
        let Some(session) = self.registry.remove(target_channel_id) else {
            return RelayOutcome::NothingToStop {
                target: target_channel_id.to_string(),
            };
        };

        session.stop();
        session.log_stats();
        self.metrics.set_active_sessions(self.registry.len());

        RelayOutcome::Stopped {
            target: target_channel_id.to_string(),
        }
    }

    pub fn is_active(&self, target_channel_id: &str) -> bool {
        self.registry.has(target_channel_id)
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn sessions(&self) -> Vec<RelayStats> {
        self.registry.snapshot()
    }

    /// Stop every relay. Returns how many were stopped.
    pub fn teardown(&self) -> usize {
        let sessions = self.registry.drain();
        for session in &sessions {
            session.stop();
            session.log_stats();
        }
        self.metrics.set_active_sessions(0);

        if !sessions.is_empty() {
            info!("Stopped {} active relay(s)", sessions.len());
        }
        sessions.len()
    }

    async fn channel_exists(&self, channel_id: &str) -> bool {
        match self.platform.channel(channel_id).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "Channel lookup failed");
                false
            }
        }
    }

    fn attach_listener(
        &self,
        source_channel_id: &str,
        target_channel_id: &str,
        webhook: Webhook,
    ) -> RelaySession {
        let activity = Arc::new(SessionActivity::new());
        let webhook_id = webhook.id.clone();
        let subscription = self.platform.subscribe(source_channel_id);

        let pipeline = RelayPipeline {
            platform: Arc::clone(&self.platform),
            webhook: Arc::new(webhook),
            activity: Arc::clone(&activity),
            metrics: Arc::clone(&self.metrics),
            target_channel_id: target_channel_id.to_string(),
        };
        let listener = ListenerHandle::spawn(|stop| pipeline.run(subscription, stop));

        RelaySession::new(
            source_channel_id.to_string(),
            target_channel_id.to_string(),
            webhook_id,
            activity,
            listener,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Attachment, Embed, MessageAuthor};

    fn message(content: &str) -> SourceMessage {
        SourceMessage {
            id: "m1".to_string(),
            channel_id: "a".to_string(),
            guild_id: Some("g".to_string()),
            author: MessageAuthor {
                id: "7".to_string(),
                username: "bob".to_string(),
                avatar_url: Some("https://cdn.example/bob.png".to_string()),
                bot: false,
            },
            webhook_id: None,
            content: content.to_string(),
            attachments: vec![],
            embeds: vec![],
        }
    }

    fn nobody(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_empty_message_is_dropped() {
        assert!(compose_payload(&message(""), nobody).is_none());
    }

    #[test]
    fn test_attachment_only_message() {
        let mut msg = message("");
        msg.attachments.push(Attachment {
            url: "https://cdn.example/cat.png".to_string(),
            name: "cat.png".to_string(),
        });

        let payload = compose_payload(&msg, nobody).unwrap();
        assert!(payload.content.is_none());
        assert!(payload.embeds.is_none());
        assert_eq!(
            payload.files,
            Some(vec![OutboundFile {
                url: "https://cdn.example/cat.png".to_string(),
                name: "cat.png".to_string(),
            }])
        );
    }

    #[test]
    fn test_identity_and_rewritten_content() {
        let payload = compose_payload(&message("hi <@1> @everyone"), |id| {
            (id == "1").then(|| "Alice".to_string())
        })
        .unwrap();
        assert_eq!(payload.username, "bob");
        assert_eq!(payload.avatar_url.as_deref(), Some("https://cdn.example/bob.png"));
        assert_eq!(payload.content.as_deref(), Some("hi @Alice everyone"));
        assert!(payload.files.is_none());
    }

    #[test]
    fn test_embeds_are_copied() {
        let mut msg = message("");
        msg.embeds.push(Embed {
            title: Some("News".to_string()),
            ..Embed::default()
        });
        let payload = compose_payload(&msg, nobody).unwrap();
        assert_eq!(payload.embeds.unwrap()[0].title.as_deref(), Some("News"));
    }

    #[test]
    fn test_emoji_message_is_forwarded() {
        let payload = compose_payload(&message("<:party:1234>"), nobody).unwrap();
        assert_eq!(payload.content.as_deref(), Some("<:party:1234>"));
    }

    #[test]
    fn test_outcome_messages() {
        let started = RelayOutcome::Started {
            source: "1".to_string(),
            target: "2".to_string(),
        };
        assert_eq!(started.to_string(), "Started relaying messages from <#1> to <#2>.");
        assert_eq!(
            RelayOutcome::NothingToStop { target: "2".to_string() }.to_string(),
            "No active relaying to stop for <#2>."
        );
    }
}
