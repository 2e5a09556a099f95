//! Discord wire types
//!
//! Only the fields the bot reads are modelled; everything else is ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::platform::{Attachment, Embed, MessageAuthor, SourceMessage};

pub const CDN_BASE: &str = "https://cdn.discordapp.com";

/// ADMINISTRATOR permission bit
pub const PERMISSION_ADMINISTRATOR: u64 = 1 << 3;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    /// CDN url of the user's custom avatar, if they set one
    pub fn avatar_url(&self) -> Option<String> {
        self.avatar.as_ref().map(|hash| {
            let ext = if hash.starts_with("a_") { "gif" } else { "png" };
            format!("{}/avatars/{}/{}.{}", CDN_BASE, self.id, hash, ext)
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Name shown for a guild member: nickname, then global name, then username
pub fn display_name(member: Option<&Member>, user: &User) -> String {
    member
        .and_then(|m| m.nick.clone())
        .or_else(|| user.global_name.clone())
        .unwrap_or_else(|| user.username.clone())
}

/// Entry of a message's `mentions` array; gateway events attach a partial member
#[derive(Debug, Clone, Deserialize)]
pub struct Mention {
    #[serde(flatten)]
    pub user: User,
    #[serde(default)]
    pub member: Option<Member>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAttachment {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: User,
    #[serde(default)]
    pub webhook_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
}

impl From<Message> for SourceMessage {
    fn from(message: Message) -> Self {
        let avatar_url = message.author.avatar_url();
        SourceMessage {
            id: message.id,
            channel_id: message.channel_id,
            guild_id: message.guild_id,
            author: MessageAuthor {
                id: message.author.id,
                username: message.author.username,
                avatar_url,
                bot: message.author.bot,
            },
            webhook_id: message.webhook_id,
            content: message.content,
            attachments: message
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    url: a.url,
                    name: a.filename,
                })
                .collect(),
            embeds: message.embeds,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Role {
    pub id: String,
    pub permissions: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Guild {
    /// Whether `member_roles` (plus @everyone) grant ADMINISTRATOR
    pub fn grants_admin(&self, member_roles: &[String]) -> bool {
        self.roles
            .iter()
            .filter(|role| role.id == self.id || member_roles.contains(&role.id))
            .filter_map(|role| role.permissions.parse::<u64>().ok())
            .any(|bits| bits & PERMISSION_ADMINISTRATOR != 0)
    }
}

/// Envelope of every gateway frame
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}
