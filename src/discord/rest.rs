//! Discord REST client
//!
//! Implements [`ChatPlatform`] on top of the Discord HTTP API. Inbound
//! messages are not fetched here; the gateway publishes them into the
//! client's [`MessageHub`].

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::types::{display_name, Guild, Member};
use crate::config::DiscordConfig;
use crate::platform::{
    ChannelInfo, ChatPlatform, MessageHub, MessageSubscription, PlatformError, Webhook,
    WebhookPayload,
};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const USER_AGENT: &str = concat!("DiscordBot (relaybot, ", env!("CARGO_PKG_VERSION"), ")");

/// Snowflakes are decimal ids; anything else cannot name a Discord object
fn is_snowflake(id: &str) -> bool {
    !id.is_empty() && id.len() <= 20 && id.bytes().all(|b| b.is_ascii_digit())
}

/// Nicknames change; cached names are refetched after this long
const MEMBER_NAME_TTL: Duration = Duration::from_secs(600);
const MEMBER_NAME_CAPACITY: usize = 10_000;

/// Member display names keyed by guild and user, with expiry and a size cap
struct MemberNameCache {
    entries: HashMap<(String, String), (String, Instant)>,
    ttl: Duration,
    capacity: usize,
}

impl MemberNameCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
        }
    }

    fn get(&self, guild_id: &str, user_id: &str) -> Option<String> {
        let (name, cached_at) = self
            .entries
            .get(&(guild_id.to_string(), user_id.to_string()))?;
        (cached_at.elapsed() < self.ttl).then(|| name.clone())
    }

    fn insert(&mut self, guild_id: &str, user_id: &str, name: String) {
        let key = (guild_id.to_string(), user_id.to_string());
        let now = Instant::now();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let ttl = self.ttl;
            self.entries.retain(|_, (_, cached_at)| now.duration_since(*cached_at) < ttl);
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (_, cached_at))| *cached_at)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (name, now));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Discord HTTP API client
pub struct DiscordClient {
    http: Client,
    api_base: String,
    token: String,
    hub: MessageHub,
    member_names: RwLock<MemberNameCache>,
}

impl DiscordClient {
    /// Create a client from configuration
    pub fn new(config: &DiscordConfig) -> Result<Self, PlatformError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self::with_http(http, &config.token, &config.api_base))
    }

    /// Create a client against a custom API base (used by tests)
    pub fn with_base_url(token: &str, api_base: &str) -> Self {
        Self::with_http(Client::new(), token, api_base)
    }

    fn with_http(http: Client, token: &str, api_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            hub: MessageHub::new(),
            member_names: RwLock::new(MemberNameCache::new(MEMBER_NAME_TTL, MEMBER_NAME_CAPACITY)),
        }
    }

    /// Hub the gateway publishes inbound messages into
    pub fn hub(&self) -> &MessageHub {
        &self.hub
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Cache a member's display name, e.g. from a gateway event
    pub fn remember_member_name(&self, guild_id: &str, user_id: &str, name: String) {
        self.member_names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild_id, user_id, name);
    }

    pub(crate) fn cached_member_name(&self, guild_id: &str, user_id: &str) -> Option<String> {
        self.member_names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(guild_id, user_id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bot {}", self.token))
    }

    /// Turn non-success responses into [`PlatformError::Api`]
    async fn check(response: Response) -> Result<Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PlatformError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// GET a resource, mapping 404 and 403 to `None`
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PlatformError> {
        let response = self.authorized(self.http.get(self.url(path))).send().await?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            debug!(path = %path, status = %response.status(), "Resource not visible");
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(Some(response.json().await?))
    }

    /// Fetch the websocket url for the gateway
    pub async fn gateway_url(&self) -> Result<String, PlatformError> {
        let response = self
            .authorized(self.http.get(self.url("/gateway/bot")))
            .send()
            .await?;
        let body: Value = Self::check(response).await?.json().await?;
        let url = body["url"]
            .as_str()
            .ok_or_else(|| PlatformError::Gateway("missing 'url' in gateway response".to_string()))?;
        Ok(format!("{}/?v=10&encoding=json", url))
    }

    async fn fetch_member(&self, guild_id: &str, user_id: &str) -> Result<Option<Member>, PlatformError> {
        if !is_snowflake(guild_id) || !is_snowflake(user_id) {
            return Ok(None);
        }
        self.get_optional(&format!("/guilds/{}/members/{}", guild_id, user_id))
            .await
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, PlatformError> {
        let response = Self::check(self.http.get(url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, PlatformError> {
        if !is_snowflake(channel_id) {
            return Ok(None);
        }
        self.get_optional(&format!("/channels/{}", channel_id)).await
    }

    async fn list_webhooks(&self, channel_id: &str) -> Result<Vec<Webhook>, PlatformError> {
        let response = self
            .authorized(self.http.get(self.url(&format!("/channels/{}/webhooks", channel_id))))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create_webhook(&self, channel_id: &str, name: &str) -> Result<Webhook, PlatformError> {
        let response = self
            .authorized(self.http.post(self.url(&format!("/channels/{}/webhooks", channel_id))))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn execute_webhook(
        &self,
        webhook: &Webhook,
        payload: &WebhookPayload,
    ) -> Result<(), PlatformError> {
        let token = match webhook.token.as_deref() {
            Some(token) if webhook.is_executable() => token,
            _ => return Err(PlatformError::MissingWebhookToken(webhook.id.clone())),
        };
        let url = self.url(&format!("/webhooks/{}/{}?wait=true", webhook.id, token));

        let request = match payload.files.as_deref() {
            Some(files) if !files.is_empty() => {
                let mut form = Form::new().text("payload_json", serde_json::to_string(payload)?);
                for (index, file) in files.iter().enumerate() {
                    let bytes = self.download(&file.url).await?;
                    form = form.part(
                        format!("files[{}]", index),
                        Part::bytes(bytes).file_name(file.name.clone()),
                    );
                }
                self.http.post(url).multipart(form)
            }
            _ => self.http.post(url).json(payload),
        };

        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn member_display_name(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, PlatformError> {
        if let Some(name) = self.cached_member_name(guild_id, user_id) {
            return Ok(Some(name));
        }

        let Some(member) = self.fetch_member(guild_id, user_id).await? else {
            return Ok(None);
        };
        let Some(user) = member.user.as_ref() else {
            warn!(guild_id = %guild_id, user_id = %user_id, "Member response without user");
            return Ok(None);
        };

        let name = display_name(Some(&member), user);
        self.remember_member_name(guild_id, user_id, name.clone());
        Ok(Some(name))
    }

    async fn member_is_admin(&self, guild_id: &str, user_id: &str) -> Result<bool, PlatformError> {
        if !is_snowflake(guild_id) {
            return Ok(false);
        }
        let Some(guild) = self.get_optional::<Guild>(&format!("/guilds/{}", guild_id)).await? else {
            return Ok(false);
        };
        if guild.owner_id == user_id {
            return Ok(true);
        }

        let member = self.fetch_member(guild_id, user_id).await?;
        Ok(member.is_some_and(|m| guild.grants_admin(&m.roles)))
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), PlatformError> {
        let response = self
            .authorized(self.http.post(self.url(&format!("/channels/{}/messages", channel_id))))
            .json(&json!({
                "content": content,
                "allowed_mentions": { "parse": [] }
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn subscribe(&self, channel_id: &str) -> MessageSubscription {
        self.hub.subscribe(channel_id)
    }
}
