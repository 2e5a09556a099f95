//! Webhook Provisioner

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::platform::{ChatPlatform, Webhook};

/// Default display name for webhooks created by the bot
pub const DEFAULT_WEBHOOK_NAME: &str = "Relay Bot";

/// Fetches or creates the webhook a relay delivers through
pub struct WebhookProvisioner {
    platform: Arc<dyn ChatPlatform>,
    webhook_name: String,
}

impl WebhookProvisioner {
    pub fn new(platform: Arc<dyn ChatPlatform>, webhook_name: impl Into<String>) -> Self {
        Self {
            platform,
            webhook_name: webhook_name.into(),
        }
    }

    /// Name given to newly created webhooks
    pub fn webhook_name(&self) -> &str {
        &self.webhook_name
    }

    /// Return the channel's first webhook, creating one if it has none.
    ///
    /// Never fails: an unknown channel or any platform error yields `None`.
    pub async fn provision(&self, channel_id: &str) -> Option<Webhook> {
        match self.platform.channel(channel_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(channel_id = %channel_id, "Cannot provision webhook for unknown channel");
                return None;
            }
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "Channel lookup failed while provisioning webhook");
                return None;
            }
        }

        let webhooks = match self.platform.list_webhooks(channel_id).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                error!(channel_id = %channel_id, error = %e, "Failed to create/get webhook");
                return None;
            }
        };

        if let Some(existing) = webhooks.into_iter().next() {
            if !existing.is_executable() {
                warn!(
                    channel_id = %channel_id,
                    webhook_id = %existing.id,
                    "First webhook of the channel has no token; deliveries through it will fail"
                );
            }
            debug!(channel_id = %channel_id, webhook_id = %existing.id, "Reusing existing webhook");
            return Some(existing);
        }

        match self.platform.create_webhook(channel_id, &self.webhook_name).await {
            Ok(webhook) => {
                info!(channel_id = %channel_id, webhook_id = %webhook.id, "Created relay webhook");
                Some(webhook)
            }
            Err(e) => {
                error!(channel_id = %channel_id, error = %e, "Failed to create/get webhook");
                None
            }
        }
    }
}
