use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discussion {
    pub id: String,
    pub title: String,
    pub status: Option<String>,
    pub last_activity_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub discussion_id: String,
    pub author_id: String,
    pub content: String,
    pub pinned: bool,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub created_at: OffsetDateTime,
}

/// The record of how far a user has read into a discussion. Absence means the
/// user has never read it, which the unread algorithm treats as "every message
/// from the other party is unread".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionReadState {
    pub discussion_id: String,
    pub user_id: String,
    pub last_read_message_id: Option<String>,
    pub last_read_at: OffsetDateTime,
}

/// A discussion-list entry as the client renders it: the shared row plus the
/// locally maintained unread counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscussionEntry {
    pub discussion: Discussion,
    pub unread_count: u32,
}

#[derive(Debug, Clone)]
pub enum DiscussionEvent {
    Inserted(Discussion),
    Updated(Discussion),
    Deleted { id: String },
}

#[derive(Debug, Clone)]
pub enum MessageEvent {
    Inserted(Message),
    Updated(Message),
    Deleted { id: String, discussion_id: String },
}

#[derive(Debug, Clone)]
pub enum ReactionEvent {
    Added(Reaction),
    Removed(Reaction),
}
