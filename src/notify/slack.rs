//! notify::slack
//!
//! Slack transport over the Web API (`chat.postMessage`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Notification, NotifyError, Transport};

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Username shown for tool-originated messages.
const BOT_USERNAME: &str = "teamflow";
const BOT_ICON: &str = ":rocket:";

/// Slack transport.
pub struct SlackTransport {
    client: Client,
    token: String,
    channel: String,
    api_url: String,
}

impl SlackTransport {
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            channel: channel.into(),
            api_url: POST_MESSAGE_URL.to_string(),
        }
    }

    /// Point at a custom API endpoint. Used by tests.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn build_body(&self, notification: &Notification) -> PostMessageBody {
        PostMessageBody {
            channel: self.channel.clone(),
            username: BOT_USERNAME.to_string(),
            icon_emoji: BOT_ICON.to_string(),
            // Plaintext fallback for clients that drop attachments
            text: notification.to_plaintext(),
            attachments: vec![SlackAttachment {
                color: notification.kind.slack_color().to_string(),
                title: notification.title.clone(),
                title_link: notification.url.clone(),
                text: notification.text.clone(),
                fields: notification
                    .fields
                    .iter()
                    .map(|(label, value)| SlackField {
                        title: label.clone(),
                        value: value.clone(),
                        short: true,
                    })
                    .collect(),
            }],
        }
    }
}

#[async_trait]
impl Transport for SlackTransport {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = self.build_body(notification);
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let result: PostMessageResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if result.ok {
            Ok(())
        } else {
            Err(NotifyError::Rejected(
                result.error.unwrap_or_else(|| "unknown".to_string()),
            ))
        }
    }
}

#[derive(Serialize)]
struct PostMessageBody {
    channel: String,
    username: String,
    icon_emoji: String,
    text: String,
    attachments: Vec<SlackAttachment>,
}

#[derive(Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title_link: Option<String>,
    text: String,
    fields: Vec<SlackField>,
}

#[derive(Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}
