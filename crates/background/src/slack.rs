// Slack event envelope
//
// Only the fields the event procedure reads are modelled; unknown fields are
// ignored on deserialization.

use serde::{Deserialize, Serialize};

use crate::router::ChannelType;

/// An Events API callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackEvent {
    /// Unique per delivery; the deduplication key for event runs
    pub event_id: String,
    pub team_id: String,
    /// Installations the event was delivered for; the first is the bot
    #[serde(default)]
    pub authorizations: Vec<SlackAuthorization>,
    pub event: SlackMessageEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackAuthorization {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackMessageEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub text: String,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl SlackEvent {
    /// User id of the bot the event was delivered to
    pub fn bot_user_id(&self) -> Option<&str> {
        self.authorizations.first().map(|a| a.user_id.as_str())
    }

    pub fn channel_type(&self) -> ChannelType {
        ChannelType::from_slack(&self.event.event_type, self.event.channel_type.as_deref())
    }

    /// Timestamp replies are threaded under
    pub fn reply_thread(&self) -> &str {
        self.event.thread_ts.as_deref().unwrap_or(&self.event.ts)
    }
}
