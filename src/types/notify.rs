use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
    MultipleMessages,
    ThreadReply,
    StatusChange,
    PinnedArgument,
    Reaction,
}

impl NotificationKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new_message" => Some(Self::NewMessage),
            "multiple_messages" => Some(Self::MultipleMessages),
            "thread_reply" => Some(Self::ThreadReply),
            "status_change" => Some(Self::StatusChange),
            "pinned_argument" => Some(Self::PinnedArgument),
            "reaction" => Some(Self::Reaction),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
            Self::MultipleMessages => "multiple_messages",
            Self::ThreadReply => "thread_reply",
            Self::StatusChange => "status_change",
            Self::PinnedArgument => "pinned_argument",
            Self::Reaction => "reaction",
        }
    }
}

pub type EventMetadata = HashMap<String, String>;

/// An activity mutation reported by the content layer (new message, reaction,
/// status change), before aggregation decides whether it groups.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub discussion_id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub kind: NotificationKind,
    pub metadata: EventMetadata,
}

/// A notification row that is still open for grouping (`is_sent == false`) or
/// has been closed and become immutable (`is_sent == true`). At most one open
/// row exists per `(discussion_id, recipient_id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingNotification {
    pub id: u64,
    pub discussion_id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub kind: NotificationKind,
    pub message_count: u32,
    pub last_message_content: Option<String>,
    pub thread_context: Option<String>,
    pub is_sent: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregationOutcome {
    pub sent: bool,
    pub grouped: bool,
    pub count: Option<u32>,
}

impl AggregationOutcome {
    pub fn suppressed() -> Self {
        Self {
            sent: false,
            grouped: false,
            count: None,
        }
    }
}

/// Per-user notification preferences, persisted server-side so they survive
/// device changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    #[serde(default)]
    pub muted_kinds: Vec<NotificationKind>,
    #[serde(default)]
    pub dismissed_nudge_hint: bool,
}

impl NotificationPreference {
    pub fn is_muted(&self, kind: NotificationKind) -> bool {
        self.muted_kinds.contains(&kind)
    }
}
