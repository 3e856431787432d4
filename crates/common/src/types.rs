//! Value types shared between the retrieval core and the messaging adapters.

use std::fmt;

use {
    serde::{Deserialize, Serialize},
    url::Url,
};

use crate::error::{Error, Result};

/// How a delivered artifact is rendered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationKind {
    Animation,
    Video,
    Document,
}

impl PresentationKind {
    /// Caption prefix shown above the size/timestamp lines.
    #[must_use]
    pub fn caption_label(self) -> &'static str {
        match self {
            Self::Animation => "🎞️ Downloaded GIF",
            Self::Video => "📹 Downloaded video",
            Self::Document => "📄 Downloaded file",
        }
    }

    /// Caption used when the remote URL is handed to the messaging service as-is.
    #[must_use]
    pub fn passthrough_caption(self) -> &'static str {
        match self {
            Self::Animation => "🎞️ GIF (sent directly by Telegram)",
            Self::Video => "📹 Video (sent directly by Telegram)",
            Self::Document => "📄 File (sent directly by Telegram)",
        }
    }
}

impl fmt::Display for PresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Animation => f.write_str("animation"),
            Self::Video => f.write_str("video"),
            Self::Document => f.write_str("document"),
        }
    }
}

/// Where a request's status updates and artifacts go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub chat_id: i64,
    /// Message that carried the URL; replies thread onto it.
    pub reply_to: Option<i32>,
    /// Per-request status message edited as the pipeline progresses.
    pub status_message_id: Option<i32>,
}

impl DeliveryTarget {
    #[must_use]
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            reply_to: None,
            status_message_id: None,
        }
    }

    #[must_use]
    pub fn with_reply_to(mut self, message_id: i32) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    #[must_use]
    pub fn with_status_message(mut self, message_id: i32) -> Self {
        self.status_message_id = Some(message_id);
        self
    }
}

/// Parse requester input into a URL. Both a scheme and a host are required.
pub fn parse_request_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed).map_err(|_| Error::invalid_url(trimmed))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(Error::invalid_url(trimmed)),
    }
}
