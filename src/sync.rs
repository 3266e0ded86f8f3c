use crate::store::ReadStateStore;
use crate::types::sync::{
    Discussion, DiscussionEntry, DiscussionEvent, DiscussionReadState, Message, MessageEvent,
    ReactionEvent,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// The three ordered change feeds a client subscribes to. Ordering is only
/// guaranteed within one feed; the discussion-list bump for a message is
/// applied from the message event itself, never derived from the message
/// list, so cross-feed ordering does not matter.
pub struct SyncFeeds {
    pub discussions: broadcast::Sender<DiscussionEvent>,
    pub messages: broadcast::Sender<MessageEvent>,
    pub reactions: broadcast::Sender<ReactionEvent>,
}

impl SyncFeeds {
    pub fn new(capacity: usize) -> Self {
        Self {
            discussions: broadcast::channel(capacity).0,
            messages: broadcast::channel(capacity).0,
            reactions: broadcast::channel(capacity).0,
        }
    }
}

#[derive(Default)]
struct SyncModel {
    discussions: Vec<DiscussionEntry>,
    open_discussion: Option<String>,
    messages: Vec<Message>,
}

/// Handle for the spawned feed listeners. Dropping it does not stop them;
/// call `unsubscribe` when the consuming view goes away so listeners never
/// leak across navigations.
pub struct SyncSubscription {
    handles: Vec<JoinHandle<()>>,
}

impl SyncSubscription {
    pub fn unsubscribe(self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(|handle| handle.is_finished())
    }
}

/// Client-side read model kept consistent by incremental feed events. The
/// caches are ephemeral: a full `load_discussions`/`open_discussion` reload
/// is always the reconciliation path of last resort.
#[derive(Clone)]
pub struct RealtimeSyncClient {
    viewer_id: String,
    read_states: Arc<ReadStateStore>,
    model: Arc<Mutex<SyncModel>>,
}

impl RealtimeSyncClient {
    pub fn new(viewer_id: &str, read_states: Arc<ReadStateStore>) -> Self {
        Self {
            viewer_id: viewer_id.to_string(),
            read_states,
            model: Arc::new(Mutex::new(SyncModel::default())),
        }
    }

    /// Full load of the discussion list; unread counts are recomputed from
    /// the read-state rows and the supplied message histories.
    pub fn load_discussions(
        &self,
        discussions: Vec<Discussion>,
        histories: &HashMap<String, Vec<Message>>,
    ) {
        let mut model = self.model.lock().expect("sync model lock");
        model.discussions = discussions
            .into_iter()
            .map(|discussion| {
                let read_state = self.read_states.get(&discussion.id, &self.viewer_id);
                let unread_count = histories
                    .get(&discussion.id)
                    .map(|messages| unread_count(messages, &self.viewer_id, read_state.as_ref()))
                    .unwrap_or(0);
                DiscussionEntry {
                    discussion,
                    unread_count,
                }
            })
            .collect();
        sort_by_activity(&mut model.discussions);
    }

    /// Full load of one discussion's message list and switch the message
    /// cache to it.
    pub fn open_discussion(&self, discussion_id: &str, messages: Vec<Message>) {
        let mut model = self.model.lock().expect("sync model lock");
        model.open_discussion = Some(discussion_id.to_string());
        model.messages = messages;
    }

    pub fn discussions(&self) -> Vec<DiscussionEntry> {
        self.model.lock().expect("sync model lock").discussions.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.model.lock().expect("sync model lock").messages.clone()
    }

    /// The pinned view is a filter over the message list, so it can never
    /// drift from it.
    pub fn pinned_messages(&self) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|message| message.pinned)
            .collect()
    }

    /// Upserts the viewer's read state and optimistically zeroes the local
    /// counter without waiting for confirmation.
    pub fn mark_read(&self, discussion_id: &str, now: OffsetDateTime) {
        let last_read_message_id = {
            let model = self.model.lock().expect("sync model lock");
            if model.open_discussion.as_deref() == Some(discussion_id) {
                model.messages.last().map(|message| message.id.clone())
            } else {
                None
            }
        };
        self.read_states.upsert(DiscussionReadState {
            discussion_id: discussion_id.to_string(),
            user_id: self.viewer_id.clone(),
            last_read_message_id,
            last_read_at: now,
        });
        let mut model = self.model.lock().expect("sync model lock");
        if let Some(entry) = model
            .discussions
            .iter_mut()
            .find(|entry| entry.discussion.id == discussion_id)
        {
            entry.unread_count = 0;
        }
    }

    pub fn apply_discussion_event(&self, event: DiscussionEvent) {
        let mut model = self.model.lock().expect("sync model lock");
        match event {
            DiscussionEvent::Inserted(discussion) => {
                if model
                    .discussions
                    .iter()
                    .any(|entry| entry.discussion.id == discussion.id)
                {
                    return;
                }
                model.discussions.insert(
                    0,
                    DiscussionEntry {
                        discussion,
                        unread_count: 0,
                    },
                );
                sort_by_activity(&mut model.discussions);
            }
            DiscussionEvent::Updated(discussion) => {
                // Unknown ids are dropped; a reload reconciles them later.
                let Some(entry) = model
                    .discussions
                    .iter_mut()
                    .find(|entry| entry.discussion.id == discussion.id)
                else {
                    return;
                };
                entry.discussion = discussion;
                sort_by_activity(&mut model.discussions);
            }
            DiscussionEvent::Deleted { id } => {
                model.discussions.retain(|entry| entry.discussion.id != id);
            }
        }
    }

    pub fn apply_message_event(&self, event: MessageEvent) {
        let mut model = self.model.lock().expect("sync model lock");
        match event {
            MessageEvent::Inserted(message) => {
                // List bump first, straight from the event, independent of
                // the message cache.
                if message.author_id != self.viewer_id
                    && let Some(entry) = model
                        .discussions
                        .iter_mut()
                        .find(|entry| entry.discussion.id == message.discussion_id)
                {
                    entry.unread_count += 1;
                    if message.created_at > entry.discussion.last_activity_at {
                        entry.discussion.last_activity_at = message.created_at;
                    }
                    sort_by_activity(&mut model.discussions);
                }
                if model.open_discussion.as_deref() == Some(message.discussion_id.as_str())
                    && !model.messages.iter().any(|m| m.id == message.id)
                {
                    model.messages.push(message);
                }
            }
            MessageEvent::Updated(message) => {
                if model.open_discussion.as_deref() != Some(message.discussion_id.as_str()) {
                    return;
                }
                let Some(existing) = model.messages.iter_mut().find(|m| m.id == message.id) else {
                    return;
                };
                *existing = message;
            }
            MessageEvent::Deleted { id, discussion_id } => {
                if model.open_discussion.as_deref() == Some(discussion_id.as_str()) {
                    model.messages.retain(|m| m.id != id);
                }
            }
        }
    }

    pub fn apply_reaction_event(&self, event: ReactionEvent) {
        let mut model = self.model.lock().expect("sync model lock");
        match event {
            ReactionEvent::Added(reaction) => {
                let Some(message) = model
                    .messages
                    .iter_mut()
                    .find(|m| m.id == reaction.message_id)
                else {
                    return;
                };
                if !message
                    .reactions
                    .iter()
                    .any(|r| r.user_id == reaction.user_id && r.emoji == reaction.emoji)
                {
                    message.reactions.push(reaction);
                }
            }
            ReactionEvent::Removed(reaction) => {
                let Some(message) = model
                    .messages
                    .iter_mut()
                    .find(|m| m.id == reaction.message_id)
                else {
                    return;
                };
                message
                    .reactions
                    .retain(|r| !(r.user_id == reaction.user_id && r.emoji == reaction.emoji));
            }
        }
    }

    /// Spawns one listener per feed. Events are applied in the order the
    /// transport delivers them; a lagged receiver skips ahead and leaves
    /// reconciliation to the next full reload.
    pub fn subscribe(&self, feeds: &SyncFeeds) -> SyncSubscription {
        let discussion_client = self.clone();
        let mut discussion_rx = feeds.discussions.subscribe();
        let discussions = tokio::spawn(async move {
            loop {
                match discussion_rx.recv().await {
                    Ok(event) => discussion_client.apply_discussion_event(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let message_client = self.clone();
        let mut message_rx = feeds.messages.subscribe();
        let messages = tokio::spawn(async move {
            loop {
                match message_rx.recv().await {
                    Ok(event) => message_client.apply_message_event(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let reaction_client = self.clone();
        let mut reaction_rx = feeds.reactions.subscribe();
        let reactions = tokio::spawn(async move {
            loop {
                match reaction_rx.recv().await {
                    Ok(event) => reaction_client.apply_reaction_event(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        SyncSubscription {
            handles: vec![discussions, messages, reactions],
        }
    }
}

/// Without a read-state row every message from the other party counts as
/// unread, including in discussions that predate read tracking.
pub fn unread_count(
    messages: &[Message],
    viewer_id: &str,
    read_state: Option<&DiscussionReadState>,
) -> u32 {
    match read_state {
        None => messages
            .iter()
            .filter(|message| message.author_id != viewer_id)
            .count() as u32,
        Some(read_state) => messages
            .iter()
            .filter(|message| {
                message.author_id != viewer_id && message.created_at > read_state.last_read_at
            })
            .count() as u32,
    }
}

fn sort_by_activity(discussions: &mut [DiscussionEntry]) {
    discussions.sort_by(|a, b| {
        b.discussion
            .last_activity_at
            .cmp(&a.discussion.last_activity_at)
    });
}
