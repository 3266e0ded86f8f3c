use crate::analytics::DeliveryAnalytics;
use crate::auth::AuthState;
use crate::config::AppConfig;
use crate::store::{NotificationStore, NudgeStore, PreferenceStore, SubscriptionStore};

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub(crate) auth: Option<AuthState>,
    pub notifications: Arc<NotificationStore>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub analytics: Arc<DeliveryAnalytics>,
    pub nudges: Arc<NudgeStore>,
    pub preferences: Arc<PreferenceStore>,
}
