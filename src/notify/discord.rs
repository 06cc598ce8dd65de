//! notify::discord
//!
//! Discord transport via webhook POST with embeds.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Notification, NotifyError, Transport};

const BOT_USERNAME: &str = "teamflow";

/// Discord webhook transport.
pub struct DiscordTransport {
    client: Client,
    webhook_url: String,
}

impl DiscordTransport {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            webhook_url: webhook_url.into(),
        }
    }

    fn build_body(&self, notification: &Notification) -> WebhookBody {
        WebhookBody {
            username: BOT_USERNAME.to_string(),
            // Plaintext fallback shown in notifications
            content: notification.title.clone(),
            embeds: vec![DiscordEmbed {
                title: notification.title.clone(),
                description: notification.text.clone(),
                url: notification.url.clone(),
                color: notification.kind.discord_color(),
                fields: notification
                    .fields
                    .iter()
                    .map(|(label, value)| DiscordField {
                        name: label.clone(),
                        value: value.clone(),
                        inline: true,
                    })
                    .collect(),
            }],
        }
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = self.build_body(notification);
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(format!(
                "HTTP {}",
                response.status()
            )))
        }
    }
}

#[derive(Serialize)]
struct WebhookBody {
    username: String,
    content: String,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    color: u32,
    fields: Vec<DiscordField>,
}

#[derive(Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyKind;

    #[test]
    fn body_carries_embed() {
        let transport = DiscordTransport::new("https://discord.com/api/webhooks/1/abc");
        let notification = Notification::new(NotifyKind::Warning, "コンフリクト", "a.txt")
            .with_field("ブランチ", "feature/x");

        let body = transport.build_body(&notification);
        assert_eq!(body.username, "teamflow");
        assert_eq!(body.embeds.len(), 1);
        assert_eq!(body.embeds[0].title, "コンフリクト");
        assert_eq!(body.embeds[0].fields.len(), 1);
        assert_eq!(body.embeds[0].color, NotifyKind::Warning.discord_color());
    }
}
