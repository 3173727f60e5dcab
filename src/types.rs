//! Chat message types decoded from the room feed.
//!
//! Every field is optional or defaulted so that sparse payloads decode, and fields this
//! crate does not know about are ignored.

/// Date and time types for message timestamps.
pub use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single chat message as it appears on one line of the feed.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    /// Message identifier
    pub id: Option<String>,
    /// Raw markdown text
    pub text: Option<String>,
    /// Rendered HTML
    pub html: Option<String>,
    /// When the message was sent
    pub sent: Option<DateTime<Utc>>,
    /// When the message was last edited, if ever
    pub edited_at: Option<DateTime<Utc>>,
    /// Author of the message
    pub from_user: Option<User>,
    /// Whether the message is unread for the authenticated user
    pub unread: Option<bool>,
    /// Number of users who have read the message
    pub read_by: Option<u64>,
    /// URLs found in the message
    pub urls: Vec<MessageUrl>,
    /// Users mentioned in the message
    pub mentions: Vec<Mention>,
    /// Issues referenced in the message
    pub issues: Vec<Issue>,
    /// Free-form metadata attached by integrations
    pub meta: Vec<Value>,
    /// Version of the message
    pub v: Option<u64>,
}

impl Message {
    /// `true` when the message carries neither text nor an identifier, which is what a
    /// bare `{}` line decodes to.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.text.is_none() && self.html.is_none()
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    /// Profile path relative to the web host
    pub url: Option<String>,
    pub avatar_url: Option<String>,
    pub avatar_url_small: Option<String>,
    pub avatar_url_medium: Option<String>,
    pub v: Option<u64>,
    /// Gravatar version
    pub gv: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Mention {
    pub screen_name: Option<String>,
    pub user_id: Option<String>,
    /// Set for group mentions such as `@/all`
    pub user_ids: Vec<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Issue {
    pub number: Option<String>,
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MessageUrl {
    pub url: Option<String>,
}
