use crate::types::push::{PushPayload, SubscriptionKeys};

/// Transport errors distinguish endpoints that are gone for good (pruned from
/// the registry) from transient failures (left for the next natural send).
pub trait SendError: std::fmt::Display + Send + Sync + 'static {
    fn is_permanent(&self) -> bool;
}

pub trait PushSender: Clone + Send + Sync + 'static {
    type Error: SendError;
    type Fut<'a>: Future<Output = Result<(), Self::Error>> + Send + 'a
    where
        Self: 'a;

    fn send<'a>(
        &'a self,
        endpoint: &'a str,
        keys: &'a SubscriptionKeys,
        payload: &'a PushPayload,
    ) -> Self::Fut<'a>;
}
