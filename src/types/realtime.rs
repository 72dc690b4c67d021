use serde::{Deserialize, Serialize};

use super::bookmark::Bookmark;

/// Lifecycle status of a change-feed subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Connecting,
    Subscribed,
    TimedOut,
    Closed,
    ChannelError,
}

impl ChannelStatus {
    /// Terminal statuses never lead to further events for the same mount.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelStatus::Closed | ChannelStatus::ChannelError)
    }

    /// Short label shown next to the bookmark list.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelStatus::Connecting => "Connecting...",
            ChannelStatus::Subscribed => "Live",
            ChannelStatus::TimedOut => "Reconnecting...",
            ChannelStatus::Closed => "Offline",
            ChannelStatus::ChannelError => "Realtime unavailable",
        }
    }
}

/// A row-level change delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(Bookmark),
    Update(Bookmark),
    Delete { id: String },
}

impl ChangeEvent {
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Insert(b) | ChangeEvent::Update(b) => &b.id,
            ChangeEvent::Delete { id } => id,
        }
    }
}

/// Everything a realtime channel can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Status(ChannelStatus),
    Change(ChangeEvent),
}

/// Which rows a subscription should receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub schema: String,
    pub table: String,
    pub filter_column: String,
    pub filter_value: String,
}

impl SubscriptionRequest {
    /// Changes to `table` rows owned by `user_id`.
    pub fn owned_by(table: &str, user_id: &str) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.to_string(),
            filter_column: "user_id".to_string(),
            filter_value: user_id.to_string(),
        }
    }

    /// Filter expression understood by the change feed, e.g. `user_id=eq.42`.
    pub fn filter_expr(&self) -> String {
        format!("{}=eq.{}", self.filter_column, self.filter_value)
    }

    /// Channel topic name.
    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }
}
