use crate::store::{DeliveryStore, NotificationStore};
use crate::types::push::{DeliveryRecord, DeliveryStatus};

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::OffsetDateTime;

/// Records dispatch outcomes and answers rollup queries over the delivery
/// log. Rollups are computed from the log on demand; there are no separate
/// counters to drift out of sync.
pub struct DeliveryAnalytics {
    deliveries: DeliveryStore,
    notifications: Arc<NotificationStore>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub sent: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStats {
    pub total_sent: usize,
    pub delivered: usize,
    pub failed: usize,
    pub clicked: usize,
    pub delivery_rate: f64,
    pub click_rate: f64,
    pub by_kind: HashMap<String, KindStats>,
}

impl DeliveryAnalytics {
    pub fn new(notifications: Arc<NotificationStore>) -> Self {
        Self {
            deliveries: DeliveryStore::new(),
            notifications,
        }
    }

    pub fn record(
        &self,
        notification_id: u64,
        endpoint: &str,
        status: DeliveryStatus,
        sent_at: OffsetDateTime,
    ) {
        self.deliveries.append(DeliveryRecord {
            notification_id,
            endpoint: endpoint.to_string(),
            status,
            sent_at,
            clicked_at: None,
        });
    }

    pub fn record_click(&self, notification_id: u64, at: OffsetDateTime) -> bool {
        self.deliveries.mark_clicked(notification_id, at)
    }

    /// Rollup over records whose attempt falls inside the trailing window.
    /// Notifications without a stored row (ad-hoc direct sends) are bucketed
    /// under `direct`.
    pub fn stats_since(&self, cutoff: OffsetDateTime) -> DeliveryStats {
        let records = self.deliveries.records_since(cutoff);
        let total_sent = records.len();
        let delivered = records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Delivered)
            .count();
        let failed = records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Failed)
            .count();
        let clicked = records
            .iter()
            .filter(|r| r.clicked_at.is_some())
            .map(|r| r.notification_id)
            .collect::<HashSet<_>>()
            .len();

        let mut by_kind: HashMap<String, KindStats> = HashMap::new();
        for record in &records {
            let kind = self
                .notifications
                .kind_of(record.notification_id)
                .map(|kind| kind.as_str().to_string())
                .unwrap_or_else(|| "direct".to_string());
            let entry = by_kind.entry(kind).or_default();
            entry.sent += 1;
            match record.status {
                DeliveryStatus::Delivered => entry.delivered += 1,
                DeliveryStatus::Failed => entry.failed += 1,
                DeliveryStatus::Sent => {}
            }
        }

        DeliveryStats {
            total_sent,
            delivered,
            failed,
            clicked,
            delivery_rate: rate(delivered, total_sent),
            click_rate: rate(clicked, total_sent),
            by_kind,
        }
    }
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
