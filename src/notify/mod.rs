//! notify
//!
//! Team notification fanout.
//!
//! A [`Notification`] is a transport-neutral value that every transport
//! renders its own way: Slack attachments, Discord embeds, or plain
//! text. Transport failures are logged and swallowed; a notification
//! never aborts a phase.

pub mod discord;
pub mod slack;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::logger::Logger;

/// Errors from notification transports.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(String),

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Color accent for structured renderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Info,
    Success,
    Warning,
}

impl NotifyKind {
    /// Slack attachment color.
    pub fn slack_color(&self) -> &'static str {
        match self {
            NotifyKind::Info => "#439FE0",
            NotifyKind::Success => "good",
            NotifyKind::Warning => "warning",
        }
    }

    /// Discord embed color (decimal RGB).
    pub fn discord_color(&self) -> u32 {
        match self {
            NotifyKind::Info => 0x43_9F_E0,
            NotifyKind::Success => 0x2E_B8_86,
            NotifyKind::Warning => 0xDA_A0_38,
        }
    }
}

/// A transport-neutral notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotifyKind,
    pub title: String,
    pub text: String,
    /// Short labeled values rendered as fields/columns.
    pub fields: Vec<(String, String)>,
    /// Link target, when the notification concerns a web resource.
    pub url: Option<String>,
}

impl Notification {
    pub fn new(kind: NotifyKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            text: text.into(),
            fields: Vec::new(),
            url: None,
        }
    }

    pub fn with_field(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((label.into(), value.into()));
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Plaintext rendering, used as the fallback body everywhere.
    pub fn to_plaintext(&self) -> String {
        let mut out = format!("{}\n{}", self.title, self.text);
        for (label, value) in &self.fields {
            out.push_str(&format!("\n{}: {}", label, value));
        }
        if let Some(url) = &self.url {
            out.push_str(&format!("\n{}", url));
        }
        out
    }
}

/// One delivery channel (Slack, Discord).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &'static str;

    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Fanout over all configured transports.
pub struct Notifier {
    transports: Vec<Box<dyn Transport>>,
    logger: Logger,
}

impl Notifier {
    pub fn new(transports: Vec<Box<dyn Transport>>, logger: Logger) -> Self {
        Self { transports, logger }
    }

    /// A notifier with no transports; `notify` becomes a no-op.
    pub fn disabled(logger: Logger) -> Self {
        Self {
            transports: Vec::new(),
            logger,
        }
    }

    /// True when at least one transport is configured.
    pub fn is_configured(&self) -> bool {
        !self.transports.is_empty()
    }

    /// Deliver to every transport. Failures are logged as warnings and
    /// never propagate.
    pub async fn notify(&self, notification: &Notification) {
        for transport in &self.transports {
            if let Err(e) = transport.send(notification).await {
                self.logger.warn(&format!(
                    "notification via {} failed: {}",
                    transport.name(),
                    e
                ));
            }
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("transports", &self.transports.len())
            .finish()
    }
}
