use crate::ports::{PushSender, TimeProvider};
use crate::push::PushDispatcher;
use crate::store::{NewPendingNotification, NotificationStore, PendingSnapshot, PreferenceStore, StoreError};
use crate::types::notify::{ActivityEvent, AggregationOutcome, NotificationKind, PendingNotification};
use crate::types::push::{PayloadData, PushPayload};

mod templates;

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

enum Decision {
    Group,
    Create,
}

/// Decides whether an activity event merges into the open notification for
/// its `(discussion, recipient)` key or starts a new one, then hands the
/// rendered message to the dispatcher without blocking the caller.
pub struct NotificationAggregator<T, S> {
    time: T,
    dispatcher: Option<PushDispatcher<S, T>>,
    notifications: Arc<NotificationStore>,
    preferences: Arc<PreferenceStore>,
    grouping_window: Duration,
    icon: Option<String>,
}

impl<T, S> NotificationAggregator<T, S>
where
    T: TimeProvider,
    S: PushSender,
{
    pub fn new(
        time: T,
        dispatcher: Option<PushDispatcher<S, T>>,
        notifications: Arc<NotificationStore>,
        preferences: Arc<PreferenceStore>,
        grouping_window: Duration,
        icon: Option<String>,
    ) -> Self {
        Self {
            time,
            dispatcher,
            notifications,
            preferences,
            grouping_window,
            icon,
        }
    }

    pub fn handle_event(&self, event: ActivityEvent) -> AggregationOutcome {
        self.handle_event_with_rng(event, &mut rand::thread_rng())
    }

    /// The caller's write completes here; dispatch runs on its own task and
    /// its failures are logged, never propagated back.
    pub fn handle_event_with_rng<R: Rng>(
        &self,
        event: ActivityEvent,
        rng: &mut R,
    ) -> AggregationOutcome {
        if event.recipient_id == event.sender_id {
            return AggregationOutcome::suppressed();
        }

        let (row, grouped) = self.group_or_create(&event);
        let sent = self.spawn_dispatch(&event, &row, rng);
        AggregationOutcome {
            sent,
            grouped,
            count: Some(row.message_count),
        }
    }

    /// Optimistic single-writer-per-key: snapshot, decide, commit with the
    /// snapshot version. A lost race is retried once; losing again falls
    /// back to recording the event as a new notification.
    fn group_or_create(&self, event: &ActivityEvent) -> (PendingNotification, bool) {
        let mut retried = false;
        loop {
            let snapshot = self
                .notifications
                .pending_for(&event.discussion_id, &event.recipient_id);
            let now = self.time.now();
            let result = match decide(&snapshot, event.kind, now, self.grouping_window) {
                Decision::Group => self
                    .notifications
                    .commit_merge(
                        &event.discussion_id,
                        &event.recipient_id,
                        snapshot.version,
                        event.metadata.get("content").map(String::as_str),
                    )
                    .map(|row| (row, true)),
                Decision::Create => self
                    .notifications
                    .commit_create(snapshot.version, new_pending(event), now)
                    .map(|row| (row, false)),
            };
            match result {
                Ok(outcome) => return outcome,
                Err(StoreError::Conflict) if !retried => {
                    retried = true;
                }
                Err(StoreError::Conflict) => {
                    let row = self.notifications.create_unchecked(new_pending(event), now);
                    return (row, false);
                }
            }
        }
    }

    fn spawn_dispatch<R: Rng>(
        &self,
        event: &ActivityEvent,
        row: &PendingNotification,
        rng: &mut R,
    ) -> bool {
        let Some(dispatcher) = self.dispatcher.clone() else {
            return false;
        };
        if self.preferences.get(&event.recipient_id).is_muted(row.kind) {
            return false;
        }

        let rendered = templates::render_with_rng(row.kind, &event.metadata, row.message_count, rng);
        let payload = PushPayload {
            title: rendered.title,
            body: rendered.body,
            icon: self.icon.clone(),
            tag: Some(format!("discussion-{}", event.discussion_id)),
            data: Some(PayloadData::Target {
                url: format!("/discussions/{}", event.discussion_id),
            }),
        };
        let recipient_id = event.recipient_id.clone();
        let notification_id = row.id;
        tokio::spawn(async move {
            let outcome = dispatcher
                .dispatch(&recipient_id, notification_id, &payload)
                .await;
            if outcome.failed > 0 {
                eprintln!(
                    "push delivery warning: {} of {} endpoints failed (user {recipient_id})",
                    outcome.failed, outcome.attempted
                );
            }
        });
        true
    }
}

fn decide(
    snapshot: &PendingSnapshot,
    kind: NotificationKind,
    now: time::OffsetDateTime,
    window: Duration,
) -> Decision {
    let window = time::Duration::try_from(window).unwrap_or(time::Duration::MAX);
    if kind == NotificationKind::NewMessage
        && let Some(row) = &snapshot.row
        && matches!(
            row.kind,
            NotificationKind::NewMessage | NotificationKind::MultipleMessages
        )
        && now - row.created_at <= window
    {
        Decision::Group
    } else {
        Decision::Create
    }
}

fn new_pending(event: &ActivityEvent) -> NewPendingNotification {
    NewPendingNotification {
        discussion_id: event.discussion_id.clone(),
        recipient_id: event.recipient_id.clone(),
        sender_id: event.sender_id.clone(),
        kind: event.kind,
        last_message_content: event.metadata.get("content").cloned(),
        thread_context: event.metadata.get("context").cloned(),
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::analytics::DeliveryAnalytics;
    use crate::push::tests::{SendBehavior, TestSender, TestTime};
    use crate::store::SubscriptionStore;
    use crate::types::notify::{EventMetadata, NotificationPreference};
    use crate::types::push::SubscriptionKeys;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    struct Fixture {
        aggregator: NotificationAggregator<TestTime, TestSender>,
        time: TestTime,
        sender: TestSender,
        notifications: Arc<NotificationStore>,
        subscriptions: Arc<SubscriptionStore>,
        preferences: Arc<PreferenceStore>,
    }

    fn fixture() -> Fixture {
        let time = TestTime::at("2025-03-01T10:00:00Z");
        let sender = TestSender::default();
        let notifications = Arc::new(NotificationStore::new());
        let subscriptions = Arc::new(SubscriptionStore::new());
        let preferences = Arc::new(PreferenceStore::new());
        let analytics = Arc::new(DeliveryAnalytics::new(Arc::clone(&notifications)));
        let dispatcher = PushDispatcher::new(
            sender.clone(),
            time.clone(),
            Arc::clone(&subscriptions),
            analytics,
            4,
            Duration::from_secs(5),
        );
        let aggregator = NotificationAggregator::new(
            time.clone(),
            Some(dispatcher),
            Arc::clone(&notifications),
            Arc::clone(&preferences),
            Duration::from_secs(120),
            None,
        );
        Fixture {
            aggregator,
            time,
            sender,
            notifications,
            subscriptions,
            preferences,
        }
    }

    fn event(kind: NotificationKind, metadata: &[(&str, &str)]) -> ActivityEvent {
        ActivityEvent {
            discussion_id: "d1".to_string(),
            recipient_id: "u2".to_string(),
            sender_id: "u1".to_string(),
            kind,
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<EventMetadata>(),
        }
    }

    async fn wait_for_sends(sender: &TestSender, count: usize) {
        for _ in 0..200 {
            if sender.sent().len() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("dispatch never reached {count} sends");
    }

    #[tokio::test]
    async fn handle_event__should_suppress_self_notifications() {
        // Given
        let fixture = fixture();
        let mut event = event(NotificationKind::NewMessage, &[("title", "Pagamento")]);
        event.recipient_id = "u1".to_string();

        // When
        let outcome = fixture.aggregator.handle_event(event);

        // Then
        assert_eq!(outcome, AggregationOutcome::suppressed());
        assert!(fixture.notifications.rows_for("d1", "u1").is_empty());
    }

    #[tokio::test]
    async fn handle_event__should_group_messages_within_the_window() {
        // Given
        let fixture = fixture();

        // When
        let first = fixture
            .aggregator
            .handle_event(event(NotificationKind::NewMessage, &[("title", "Pagamento")]));
        fixture.time.advance(time::Duration::seconds(30));
        let second = fixture
            .aggregator
            .handle_event(event(NotificationKind::NewMessage, &[("title", "Pagamento")]));

        // Then
        assert!(!first.grouped);
        assert_eq!(first.count, Some(1));
        assert!(second.grouped);
        assert_eq!(second.count, Some(2));
        let rows = fixture.notifications.rows_for("d1", "u2");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message_count, 2);
        assert_eq!(rows[0].kind, NotificationKind::MultipleMessages);
    }

    #[tokio::test]
    async fn handle_event__should_start_fresh_row_after_the_window() {
        // Given
        let fixture = fixture();

        // When
        fixture
            .aggregator
            .handle_event(event(NotificationKind::NewMessage, &[("title", "Pagamento")]));
        fixture.time.advance(time::Duration::seconds(121));
        fixture
            .aggregator
            .handle_event(event(NotificationKind::NewMessage, &[("title", "Pagamento")]));

        // Then
        let rows = fixture.notifications.rows_for("d1", "u2");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.message_count == 1));
        assert_eq!(rows.iter().filter(|row| !row.is_sent).count(), 1);
    }

    #[tokio::test]
    async fn handle_event__should_not_group_non_message_events() {
        // Given
        let fixture = fixture();

        // When
        fixture
            .aggregator
            .handle_event(event(NotificationKind::NewMessage, &[("title", "Pagamento")]));
        let reaction = fixture
            .aggregator
            .handle_event(event(NotificationKind::Reaction, &[("emoji", "❤️")]));

        // Then
        assert!(!reaction.grouped);
        assert_eq!(fixture.notifications.rows_for("d1", "u2").len(), 2);
    }

    #[tokio::test]
    async fn handle_event__should_dispatch_with_substituted_template() {
        // Given
        let fixture = fixture();
        let registered_at = OffsetDateTime::parse("2025-03-01T09:00:00Z", &Rfc3339).expect("time");
        fixture.subscriptions.upsert(
            "u2",
            "https://push.example/a",
            SubscriptionKeys {
                p256dh: "p256".to_string(),
                auth: "auth".to_string(),
            },
            registered_at,
        );
        let mut rng = StdRng::from_seed([0u8; 32]);

        // When
        let outcome = fixture.aggregator.handle_event_with_rng(
            event(NotificationKind::NewMessage, &[("title", "Pagamento")]),
            &mut rng,
        );

        // Then
        assert!(outcome.sent);
        wait_for_sends(&fixture.sender, 1).await;
        let sent = fixture.sender.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.body.contains("Pagamento"));
        assert_eq!(sent[0].1.tag.as_deref(), Some("discussion-d1"));
        assert_eq!(
            sent[0].1.data,
            Some(PayloadData::Target {
                url: "/discussions/d1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn handle_event__should_record_row_but_skip_dispatch_for_muted_kind() {
        // Given
        let fixture = fixture();
        fixture.subscriptions.upsert(
            "u2",
            "https://push.example/a",
            SubscriptionKeys {
                p256dh: "p256".to_string(),
                auth: "auth".to_string(),
            },
            OffsetDateTime::parse("2025-03-01T09:00:00Z", &Rfc3339).expect("time"),
        );
        fixture.preferences.set(
            "u2",
            NotificationPreference {
                muted_kinds: vec![NotificationKind::Reaction],
                dismissed_nudge_hint: false,
            },
        );

        // When
        let outcome = fixture
            .aggregator
            .handle_event(event(NotificationKind::Reaction, &[("emoji", "❤️")]));

        // Then
        assert!(!outcome.sent);
        assert_eq!(fixture.notifications.rows_for("d1", "u2").len(), 1);
        tokio::task::yield_now().await;
        assert!(fixture.sender.sent().is_empty());
    }

    #[tokio::test]
    async fn handle_event__should_not_fail_when_dispatch_fails() {
        // Given
        let fixture = fixture();
        fixture
            .sender
            .behave("https://push.example/a", SendBehavior::FailTransient);
        fixture.subscriptions.upsert(
            "u2",
            "https://push.example/a",
            SubscriptionKeys {
                p256dh: "p256".to_string(),
                auth: "auth".to_string(),
            },
            OffsetDateTime::parse("2025-03-01T09:00:00Z", &Rfc3339).expect("time"),
        );

        // When
        let outcome = fixture
            .aggregator
            .handle_event(event(NotificationKind::NewMessage, &[("title", "Pagamento")]));

        // Then
        assert!(outcome.sent);
        assert_eq!(outcome.count, Some(1));
        assert_eq!(fixture.notifications.rows_for("d1", "u2").len(), 1);
    }

    #[tokio::test]
    async fn handle_event__should_report_unsent_without_dispatcher() {
        // Given
        let fixture = fixture();
        let aggregator: NotificationAggregator<TestTime, TestSender> = NotificationAggregator::new(
            fixture.time.clone(),
            None,
            Arc::clone(&fixture.notifications),
            Arc::clone(&fixture.preferences),
            Duration::from_secs(120),
            None,
        );

        // When
        let outcome =
            aggregator.handle_event(event(NotificationKind::NewMessage, &[("title", "Pagamento")]));

        // Then
        assert!(!outcome.sent);
        assert_eq!(fixture.notifications.rows_for("d1", "u2").len(), 1);
    }
}
