//! In-memory chat platform shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use relaybot::platform::{
    Attachment, ChannelInfo, ChatPlatform, MessageAuthor, MessageHub, MessageSubscription,
    PlatformError, SourceMessage, Webhook, WebhookPayload,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

pub const GUILD: &str = "900";

/// A webhook execution observed by the fake
#[derive(Debug, Clone)]
pub struct Delivery {
    pub webhook: Webhook,
    pub payload: WebhookPayload,
}

pub struct FakePlatform {
    pub hub: MessageHub,
    channels: HashSet<String>,
    webhooks: Mutex<HashMap<String, Vec<Webhook>>>,
    members: Mutex<HashMap<String, String>>,
    admins: Mutex<HashSet<String>>,
    pub replies: Mutex<Vec<(String, String)>>,
    pub created_webhooks: AtomicUsize,
    pub fail_webhook_listing: AtomicBool,
    pub fail_delivery: AtomicBool,
    deliveries_tx: mpsc::UnboundedSender<Delivery>,
    deliveries_rx: Mutex<Option<mpsc::UnboundedReceiver<Delivery>>>,
}

impl FakePlatform {
    pub fn new(channels: &[&str]) -> Self {
        let (deliveries_tx, deliveries_rx) = mpsc::unbounded_channel();
        Self {
            hub: MessageHub::new(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
            webhooks: Mutex::new(HashMap::new()),
            members: Mutex::new(HashMap::new()),
            admins: Mutex::new(HashSet::new()),
            replies: Mutex::new(Vec::new()),
            created_webhooks: AtomicUsize::new(0),
            fail_webhook_listing: AtomicBool::new(false),
            fail_delivery: AtomicBool::new(false),
            deliveries_tx,
            deliveries_rx: Mutex::new(Some(deliveries_rx)),
        }
    }

    pub fn with_member(self, user_id: &str, name: &str) -> Self {
        self.members.lock().unwrap().insert(user_id.to_string(), name.to_string());
        self
    }

    pub fn with_admin(self, user_id: &str) -> Self {
        self.admins.lock().unwrap().insert(user_id.to_string());
        self
    }

    pub fn with_webhook(self, channel_id: &str, webhook_id: &str) -> Self {
        self.webhooks
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .push(webhook(channel_id, webhook_id));
        self
    }

    /// Add a webhook without a token, as other apps' webhooks are listed
    pub fn with_tokenless_webhook(self, channel_id: &str, webhook_id: &str) -> Self {
        let mut tokenless = webhook(channel_id, webhook_id);
        tokenless.token = None;
        self.webhooks
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .push(tokenless);
        self
    }

    /// Receiver of webhook executions; can be taken once
    pub fn deliveries(&self) -> mpsc::UnboundedReceiver<Delivery> {
        self.deliveries_rx
            .lock()
            .unwrap()
            .take()
            .expect("deliveries receiver already taken")
    }

    /// Publish a message as if it was posted in `channel_id`
    pub fn post(&self, message: SourceMessage) -> usize {
        self.hub.publish(&message)
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }
}

pub fn webhook(channel_id: &str, webhook_id: &str) -> Webhook {
    Webhook {
        id: webhook_id.to_string(),
        token: Some(format!("token-{}", webhook_id)),
        channel_id: channel_id.to_string(),
        name: Some("Relay Bot".to_string()),
    }
}

pub fn message(channel_id: &str, author_id: &str, content: &str) -> SourceMessage {
    SourceMessage {
        id: format!("msg-{}", content.len()),
        channel_id: channel_id.to_string(),
        guild_id: Some(GUILD.to_string()),
        author: MessageAuthor {
            id: author_id.to_string(),
            username: format!("user{}", author_id),
            avatar_url: Some(format!("https://cdn.example/{}.png", author_id)),
            bot: false,
        },
        webhook_id: None,
        content: content.to_string(),
        attachments: vec![],
        embeds: vec![],
    }
}

pub fn with_attachment(mut message: SourceMessage, url: &str, name: &str) -> SourceMessage {
    message.attachments.push(Attachment {
        url: url.to_string(),
        name: name.to_string(),
    });
    message
}

/// Wait briefly for the next delivery
pub async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Option<Delivery> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
}

/// Assert that no delivery arrives within a short window
pub async fn assert_no_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) {
    let result = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(result.is_err(), "unexpected delivery: {:?}", result);
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelInfo>, PlatformError> {
        Ok(self.channels.contains(channel_id).then(|| ChannelInfo {
            id: channel_id.to_string(),
            guild_id: Some(GUILD.to_string()),
            name: None,
        }))
    }

    async fn list_webhooks(&self, channel_id: &str) -> Result<Vec<Webhook>, PlatformError> {
        if self.fail_webhook_listing.load(Ordering::SeqCst) {
            return Err(PlatformError::Api {
                status: 403,
                body: "Missing Permissions".to_string(),
            });
        }
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .get(channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_webhook(&self, channel_id: &str, name: &str) -> Result<Webhook, PlatformError> {
        let n = self.created_webhooks.fetch_add(1, Ordering::SeqCst);
        let mut created = webhook(channel_id, &format!("created-{}", n));
        created.name = Some(name.to_string());
        self.webhooks
            .lock()
            .unwrap()
            .entry(channel_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn execute_webhook(
        &self,
        webhook: &Webhook,
        payload: &WebhookPayload,
    ) -> Result<(), PlatformError> {
        if !webhook.is_executable() {
            return Err(PlatformError::MissingWebhookToken(webhook.id.clone()));
        }
        if self.fail_delivery.load(Ordering::SeqCst) {
            return Err(PlatformError::Api {
                status: 500,
                body: "boom".to_string(),
            });
        }
        let _ = self.deliveries_tx.send(Delivery {
            webhook: webhook.clone(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn member_display_name(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, PlatformError> {
        if guild_id != GUILD {
            return Ok(None);
        }
        Ok(self.members.lock().unwrap().get(user_id).cloned())
    }

    async fn member_is_admin(&self, _guild_id: &str, user_id: &str) -> Result<bool, PlatformError> {
        Ok(self.admins.lock().unwrap().contains(user_id))
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), PlatformError> {
        self.replies
            .lock()
            .unwrap()
            .push((channel_id.to_string(), content.to_string()));
        Ok(())
    }

    fn subscribe(&self, channel_id: &str) -> MessageSubscription {
        self.hub.subscribe(channel_id)
    }
}
