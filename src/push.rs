use crate::analytics::DeliveryAnalytics;
use crate::ports::{PushSender, SendError, TimeProvider};
use crate::store::SubscriptionStore;
use crate::types::push::{DeliveryStatus, DispatchOutcome, PushPayload, PushSubscription};

pub(crate) mod vapid;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub use vapid::{VapidCredentials, generate_vapid_credentials};
pub(crate) use vapid::{VapidConfigStatus, load_vapid_config};

enum EndpointOutcome {
    Delivered,
    Failed,
    TimedOut,
}

/// Fans one payload out to every registered endpoint of a recipient.
/// Endpoints fail independently; one slow or dead device never delays or
/// fails delivery to the others.
pub struct PushDispatcher<S, T> {
    sender: S,
    time: T,
    subscriptions: Arc<SubscriptionStore>,
    analytics: Arc<DeliveryAnalytics>,
    max_in_flight: usize,
    endpoint_timeout: Duration,
}

impl<S: Clone, T: Clone> Clone for PushDispatcher<S, T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            time: self.time.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            analytics: Arc::clone(&self.analytics),
            max_in_flight: self.max_in_flight,
            endpoint_timeout: self.endpoint_timeout,
        }
    }
}

impl<S, T> PushDispatcher<S, T>
where
    S: PushSender,
    T: TimeProvider,
{
    pub fn new(
        sender: S,
        time: T,
        subscriptions: Arc<SubscriptionStore>,
        analytics: Arc<DeliveryAnalytics>,
        max_in_flight: usize,
        endpoint_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            time,
            subscriptions,
            analytics,
            max_in_flight: max_in_flight.max(1),
            endpoint_timeout,
        }
    }

    /// Attempts delivery to all of the recipient's endpoints under a bounded
    /// concurrency pool. Zero registered endpoints is not an error; the
    /// outcome simply reports zero attempts.
    pub async fn dispatch(
        &self,
        recipient_id: &str,
        notification_id: u64,
        payload: &PushPayload,
    ) -> DispatchOutcome {
        let subscriptions = self.subscriptions.list_active(recipient_id);
        let attempted = subscriptions.len();
        if attempted == 0 {
            return DispatchOutcome::default();
        }

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut handles = Vec::with_capacity(attempted);
        for subscription in subscriptions {
            let semaphore = Arc::clone(&semaphore);
            let dispatcher = self.clone();
            let payload = payload.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                dispatcher
                    .attempt(notification_id, &subscription, &payload)
                    .await
            }));
        }

        let mut outcome = DispatchOutcome {
            attempted,
            delivered: 0,
            failed: 0,
        };
        for handle in handles {
            match handle.await {
                Ok(EndpointOutcome::Delivered) => outcome.delivered += 1,
                Ok(EndpointOutcome::Failed) | Ok(EndpointOutcome::TimedOut) => outcome.failed += 1,
                Err(err) => {
                    eprintln!("push dispatch task error: {err}");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    async fn attempt(
        &self,
        notification_id: u64,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> EndpointOutcome {
        let sent_at = self.time.now();
        let send = self
            .sender
            .send(&subscription.endpoint, &subscription.keys, payload);
        match tokio::time::timeout(self.endpoint_timeout, send).await {
            Ok(Ok(())) => {
                self.analytics.record(
                    notification_id,
                    &subscription.endpoint,
                    DeliveryStatus::Delivered,
                    sent_at,
                );
                EndpointOutcome::Delivered
            }
            Ok(Err(err)) => {
                if err.is_permanent() {
                    self.subscriptions
                        .remove(&subscription.user_id, &subscription.endpoint);
                    eprintln!(
                        "push delivery error: endpoint gone, pruned ({}): {err}",
                        subscription.endpoint
                    );
                } else {
                    eprintln!(
                        "push delivery error: {err} (endpoint {})",
                        subscription.endpoint
                    );
                }
                self.analytics.record(
                    notification_id,
                    &subscription.endpoint,
                    DeliveryStatus::Failed,
                    sent_at,
                );
                EndpointOutcome::Failed
            }
            Err(_) => {
                // No answer from the transport; the outcome is unknown and
                // nothing retries it (best-effort delivery).
                self.analytics.record(
                    notification_id,
                    &subscription.endpoint,
                    DeliveryStatus::Sent,
                    sent_at,
                );
                EndpointOutcome::TimedOut
            }
        }
    }
}
