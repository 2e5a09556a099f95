//! Chat Platform Module
//!
//! The seam between the relay core and the chat service it runs on.
//! Everything the relay needs from the platform goes through [`ChatPlatform`].

pub mod hub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hub::{MessageHub, MessageSubscription};

/// Errors raised by platform calls
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Webhook {0} has no token and cannot be executed")]
    MissingWebhookToken(String),

    #[error("Gateway error: {0}")]
    Gateway(String),
}

/// A channel the bot can see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// A delivery endpoint bound to a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    #[serde(default)]
    pub token: Option<String>,
    pub channel_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Webhook {
    /// Only webhooks that expose a token can be executed by the bot
    pub fn is_executable(&self) -> bool {
        self.token.as_deref().is_some_and(|token| !token.is_empty())
    }
}

/// Author of an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAuthor {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub bot: bool,
}

/// File attached to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub name: String,
}

/// Structured rich embed, in the shape the platform both sends and accepts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

/// An inbound message observed in some channel
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMessage {
    pub id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author: MessageAuthor,
    /// Set when the message was posted through a webhook
    pub webhook_id: Option<String>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
}

/// File to re-upload through a webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub url: String,
    pub name: String,
}

/// Message posted through a webhook under a mirrored identity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip)]
    pub files: Option<Vec<OutboundFile>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
}

/// Operations the relay and the command layer consume from the chat service.
///
/// Lookups answer `Ok(None)` when the object does not exist or is not
/// visible to the bot; `Err` is reserved for transport and API failures.
#[async_trait]
pub trait ChatPlatform: Send + Sync + 'static {
    /// Resolve a channel by id
    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, PlatformError>;

    /// List the webhooks of a channel, in platform order
    async fn list_webhooks(&self, channel_id: &str) -> Result<Vec<Webhook>, PlatformError>;

    /// Create a webhook on a channel
    async fn create_webhook(&self, channel_id: &str, name: &str) -> Result<Webhook, PlatformError>;

    /// Post a message through a webhook
    async fn execute_webhook(
        &self,
        webhook: &Webhook,
        payload: &WebhookPayload,
    ) -> Result<(), PlatformError>;

    /// Display name of a guild member, if they are a member
    async fn member_display_name(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, PlatformError>;

    /// Whether a guild member holds administrator privilege
    async fn member_is_admin(&self, guild_id: &str, user_id: &str) -> Result<bool, PlatformError>;

    /// Send a plain bot message to a channel
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), PlatformError>;

    /// Subscribe to messages posted in a channel
    fn subscribe(&self, channel_id: &str) -> MessageSubscription;
}
