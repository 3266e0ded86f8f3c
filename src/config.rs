use serde::Deserialize;
use std::time::Duration;

#[derive(Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub notification_icon: Option<String>,
    pub auth: Option<AuthConfig>,
    pub tuning: NotifyTuning,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub key: String,
    pub cookie_name: String,
}

/// Tunables for the notification pipeline, loadable from a TOML file via
/// `--tuning`. Defaults match the product behavior: a 2 minute grouping
/// window, 10 nudges per day with a 2 hour cooldown.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyTuning {
    pub grouping_window_secs: u64,
    pub nudge_daily_limit: u32,
    pub nudge_cooldown_hours: i64,
    pub nudge_utc_offset_hours: i8,
    pub fanout_max_in_flight: usize,
    pub endpoint_timeout_secs: u64,
}

impl Default for NotifyTuning {
    fn default() -> Self {
        Self {
            grouping_window_secs: 120,
            nudge_daily_limit: 10,
            nudge_cooldown_hours: 2,
            nudge_utc_offset_hours: 0,
            fanout_max_in_flight: 4,
            endpoint_timeout_secs: 10,
        }
    }
}

impl NotifyTuning {
    pub fn grouping_window(&self) -> Duration {
        Duration::from_secs(self.grouping_window_secs)
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_secs(self.endpoint_timeout_secs)
    }

    pub fn nudge_cooldown(&self) -> time::Duration {
        time::Duration::hours(self.nudge_cooldown_hours)
    }

    pub fn nudge_utc_offset(&self) -> time::UtcOffset {
        time::UtcOffset::from_hms(self.nudge_utc_offset_hours, 0, 0)
            .unwrap_or(time::UtcOffset::UTC)
    }
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "Duet".to_string(),
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            notification_icon: None,
            auth: None,
            tuning: NotifyTuning::default(),
        }
    }
}
