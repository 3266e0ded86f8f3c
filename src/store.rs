use crate::types::notify::{NotificationKind, NotificationPreference, PendingNotification};
use crate::types::push::{DeliveryRecord, PushSubscription, SubscriptionKeys};
use crate::types::sync::DiscussionReadState;

use std::collections::HashMap;
use std::sync::Mutex;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    Conflict,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict => f.write_str("conditional write lost a race"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The open notification row for a `(discussion_id, recipient_id)` key, plus
/// the key's write version. Commits carry the version back so a write that
/// raced another one is rejected instead of clobbering it.
#[derive(Debug, Clone)]
pub struct PendingSnapshot {
    pub row: Option<PendingNotification>,
    pub version: u64,
}

#[derive(Debug, Clone)]
pub struct NewPendingNotification {
    pub discussion_id: String,
    pub recipient_id: String,
    pub sender_id: String,
    pub kind: NotificationKind,
    pub last_message_content: Option<String>,
    pub thread_context: Option<String>,
}

#[derive(Default)]
struct NotificationState {
    next_id: u64,
    rows: Vec<PendingNotification>,
    versions: HashMap<(String, String), u64>,
}

/// Store for pending/closed notification rows. Writes are conditional on a
/// per-key version taken by `pending_for`, which makes the lookup-then-write
/// of the aggregator an optimistic single-writer-per-key operation.
#[derive(Default)]
pub struct NotificationStore {
    inner: Mutex<NotificationState>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_for(&self, discussion_id: &str, recipient_id: &str) -> PendingSnapshot {
        let state = self.inner.lock().expect("notification store lock");
        let version = state
            .versions
            .get(&(discussion_id.to_string(), recipient_id.to_string()))
            .copied()
            .unwrap_or(0);
        let row = state
            .rows
            .iter()
            .rev()
            .find(|row| {
                !row.is_sent
                    && row.discussion_id == discussion_id
                    && row.recipient_id == recipient_id
            })
            .cloned();
        PendingSnapshot { row, version }
    }

    /// Merges one more message into the open row for the key: increments the
    /// count, overwrites the last content, and promotes the kind to
    /// `MultipleMessages` once two or more messages grouped.
    pub fn commit_merge(
        &self,
        discussion_id: &str,
        recipient_id: &str,
        version: u64,
        content: Option<&str>,
    ) -> Result<PendingNotification, StoreError> {
        let mut state = self.inner.lock().expect("notification store lock");
        let key = (discussion_id.to_string(), recipient_id.to_string());
        if state.versions.get(&key).copied().unwrap_or(0) != version {
            return Err(StoreError::Conflict);
        }
        let row = state
            .rows
            .iter_mut()
            .rev()
            .find(|row| {
                !row.is_sent
                    && row.discussion_id == discussion_id
                    && row.recipient_id == recipient_id
            })
            .ok_or(StoreError::Conflict)?;
        row.message_count += 1;
        if let Some(content) = content {
            row.last_message_content = Some(content.to_string());
        }
        if row.message_count >= 2 {
            row.kind = NotificationKind::MultipleMessages;
        }
        let row = row.clone();
        *state.versions.entry(key).or_insert(0) += 1;
        Ok(row)
    }

    /// Inserts a fresh row with `message_count = 1`, conditional on the key's
    /// version not having moved since the snapshot. Any open row for the key
    /// is closed first so at most one unsent row exists per key.
    pub fn commit_create(
        &self,
        expected_version: u64,
        new: NewPendingNotification,
        now: OffsetDateTime,
    ) -> Result<PendingNotification, StoreError> {
        let mut state = self.inner.lock().expect("notification store lock");
        let key = (new.discussion_id.clone(), new.recipient_id.clone());
        if state.versions.get(&key).copied().unwrap_or(0) != expected_version {
            return Err(StoreError::Conflict);
        }
        Ok(insert_row(&mut state, new, now))
    }

    /// Unconditional insert, used after a conditional write lost the race
    /// twice: the event is recorded as a new notification rather than failing
    /// the caller.
    pub fn create_unchecked(
        &self,
        new: NewPendingNotification,
        now: OffsetDateTime,
    ) -> PendingNotification {
        let mut state = self.inner.lock().expect("notification store lock");
        insert_row(&mut state, new, now)
    }

    pub fn get(&self, id: u64) -> Option<PendingNotification> {
        let state = self.inner.lock().expect("notification store lock");
        state.rows.iter().find(|row| row.id == id).cloned()
    }

    pub fn kind_of(&self, id: u64) -> Option<NotificationKind> {
        self.get(id).map(|row| row.kind)
    }

    /// Ad-hoc direct sends have no pending row but still need a notification
    /// id for their delivery records; they draw from the same sequence.
    pub fn allocate_direct_id(&self) -> u64 {
        let mut state = self.inner.lock().expect("notification store lock");
        state.next_id += 1;
        state.next_id
    }

    pub fn rows_for(&self, discussion_id: &str, recipient_id: &str) -> Vec<PendingNotification> {
        let state = self.inner.lock().expect("notification store lock");
        state
            .rows
            .iter()
            .filter(|row| row.discussion_id == discussion_id && row.recipient_id == recipient_id)
            .cloned()
            .collect()
    }
}

fn insert_row(
    state: &mut NotificationState,
    new: NewPendingNotification,
    now: OffsetDateTime,
) -> PendingNotification {
    let key = (new.discussion_id.clone(), new.recipient_id.clone());
    for row in state.rows.iter_mut() {
        if !row.is_sent
            && row.discussion_id == new.discussion_id
            && row.recipient_id == new.recipient_id
        {
            row.is_sent = true;
        }
    }
    state.next_id += 1;
    let row = PendingNotification {
        id: state.next_id,
        discussion_id: new.discussion_id,
        recipient_id: new.recipient_id,
        sender_id: new.sender_id,
        kind: new.kind,
        message_count: 1,
        last_message_content: new.last_message_content,
        thread_context: new.thread_context,
        is_sent: false,
        created_at: now,
    };
    state.rows.push(row.clone());
    *state.versions.entry(key).or_insert(0) += 1;
    row
}

/// One subscription list per user, unique per `(user_id, endpoint)`.
#[derive(Default)]
pub struct SubscriptionStore {
    inner: Mutex<HashMap<String, Vec<PushSubscription>>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent on `(user_id, endpoint)`; last write wins for keys. A
    /// rotated endpoint registers as a new row and the stale one is left for
    /// delivery failure to prune.
    pub fn upsert(
        &self,
        user_id: &str,
        endpoint: &str,
        keys: SubscriptionKeys,
        now: OffsetDateTime,
    ) -> PushSubscription {
        let mut state = self.inner.lock().expect("subscription store lock");
        let subscriptions = state.entry(user_id.to_string()).or_default();
        if let Some(existing) = subscriptions.iter_mut().find(|s| s.endpoint == endpoint) {
            existing.keys = keys;
            existing.updated_at = now;
            return existing.clone();
        }
        let subscription = PushSubscription {
            user_id: user_id.to_string(),
            endpoint: endpoint.to_string(),
            keys,
            created_at: now,
            updated_at: now,
        };
        subscriptions.push(subscription.clone());
        subscription
    }

    pub fn remove(&self, user_id: &str, endpoint: &str) -> bool {
        let mut state = self.inner.lock().expect("subscription store lock");
        let Some(subscriptions) = state.get_mut(user_id) else {
            return false;
        };
        let before = subscriptions.len();
        subscriptions.retain(|s| s.endpoint != endpoint);
        let removed = subscriptions.len() != before;
        if subscriptions.is_empty() {
            state.remove(user_id);
        }
        removed
    }

    pub fn list_active(&self, user_id: &str) -> Vec<PushSubscription> {
        let state = self.inner.lock().expect("subscription store lock");
        state.get(user_id).cloned().unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<String, Vec<PushSubscription>> {
        self.inner.lock().expect("subscription store lock").clone()
    }
}

/// Append-only log of dispatch attempts; the authoritative input for
/// analytics rollups.
#[derive(Default)]
pub struct DeliveryStore {
    inner: Mutex<Vec<DeliveryRecord>>,
}

impl DeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: DeliveryRecord) {
        self.inner.lock().expect("delivery store lock").push(record);
    }

    /// Marks a notification clicked. Only the first click counts; later
    /// clicks are no-ops.
    pub fn mark_clicked(&self, notification_id: u64, at: OffsetDateTime) -> bool {
        let mut records = self.inner.lock().expect("delivery store lock");
        let already = records
            .iter()
            .any(|r| r.notification_id == notification_id && r.clicked_at.is_some());
        if already {
            return false;
        }
        let mut marked = false;
        for record in records
            .iter_mut()
            .filter(|r| r.notification_id == notification_id)
        {
            record.clicked_at = Some(at);
            marked = true;
        }
        marked
    }

    pub fn records_since(&self, cutoff: OffsetDateTime) -> Vec<DeliveryRecord> {
        let records = self.inner.lock().expect("delivery store lock");
        records
            .iter()
            .filter(|r| r.sent_at >= cutoff)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<DeliveryRecord> {
        self.inner.lock().expect("delivery store lock").clone()
    }
}

#[derive(Default)]
pub struct ReadStateStore {
    inner: Mutex<HashMap<(String, String), DiscussionReadState>>,
}

impl ReadStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, read_state: DiscussionReadState) {
        let mut state = self.inner.lock().expect("read state store lock");
        let key = (
            read_state.discussion_id.clone(),
            read_state.user_id.clone(),
        );
        state.insert(key, read_state);
    }

    pub fn get(&self, discussion_id: &str, user_id: &str) -> Option<DiscussionReadState> {
        let state = self.inner.lock().expect("read state store lock");
        state
            .get(&(discussion_id.to_string(), user_id.to_string()))
            .cloned()
    }
}

/// Persisted log of ambient-ping sends per sender; quota and cooldown are
/// computed by querying it, never from in-process counters.
#[derive(Default)]
pub struct NudgeStore {
    inner: Mutex<HashMap<String, Vec<OffsetDateTime>>>,
}

impl NudgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sender_id: &str, at: OffsetDateTime) {
        let mut state = self.inner.lock().expect("nudge store lock");
        state.entry(sender_id.to_string()).or_default().push(at);
    }

    pub fn sends_since(&self, sender_id: &str, cutoff: OffsetDateTime) -> u32 {
        let state = self.inner.lock().expect("nudge store lock");
        state
            .get(sender_id)
            .map(|sends| sends.iter().filter(|at| **at >= cutoff).count() as u32)
            .unwrap_or(0)
    }

    pub fn last_send(&self, sender_id: &str) -> Option<OffsetDateTime> {
        let state = self.inner.lock().expect("nudge store lock");
        state.get(sender_id).and_then(|sends| sends.last().copied())
    }
}

#[derive(Default)]
pub struct PreferenceStore {
    inner: Mutex<HashMap<String, NotificationPreference>>,
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> NotificationPreference {
        let state = self.inner.lock().expect("preference store lock");
        state.get(user_id).cloned().unwrap_or_default()
    }

    pub fn set(&self, user_id: &str, preference: NotificationPreference) {
        let mut state = self.inner.lock().expect("preference store lock");
        state.insert(user_id.to_string(), preference);
    }
}
