use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub private_key: String,
    pub public_key: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// One push endpoint registered by one of a user's devices. Unique per
/// `(user_id, endpoint)`; re-registration with the same endpoint refreshes
/// `keys` and `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub user_id: String,
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// `Delivered` means the push transport accepted the message, `Failed` that it
/// rejected the attempt. `Sent` records an attempt whose outcome never came
/// back (endpoint timeout); delivery is best-effort so nothing retries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Failed,
}

/// One row per dispatch attempt per subscription. Immutable once written
/// except `clicked_at`, which is set at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub notification_id: u64,
    pub endpoint: String,
    pub status: DeliveryStatus,
    pub sent_at: OffsetDateTime,
    pub clicked_at: Option<OffsetDateTime>,
}

/// The `data` field of the wire payload: receivers accept both a bare URL
/// string and an object carrying a `url` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadData {
    Target { url: String },
    Plain(String),
}

impl PayloadData {
    pub fn url(&self) -> &str {
        match self {
            Self::Target { url } => url,
            Self::Plain(url) => url,
        }
    }
}

/// The JSON payload delivered to the receiving agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PayloadData>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    #[test]
    fn payload_data__should_accept_bare_string() {
        // When
        let data: PayloadData = serde_json::from_str(r#""/discussions/d1""#).expect("parse");

        // Then
        assert_eq!(data.url(), "/discussions/d1");
    }

    #[test]
    fn payload_data__should_accept_url_object() {
        // When
        let data: PayloadData =
            serde_json::from_str(r#"{"url": "/discussions/d1"}"#).expect("parse");

        // Then
        assert_eq!(
            data,
            PayloadData::Target {
                url: "/discussions/d1".to_string()
            }
        );
    }

    #[test]
    fn push_payload__should_omit_empty_optional_fields() {
        // Given
        let payload = PushPayload {
            title: "Hi".to_string(),
            body: "Body".to_string(),
            icon: None,
            tag: None,
            data: None,
        };

        // When
        let json = serde_json::to_string(&payload).expect("serialize");

        // Then
        assert_eq!(json, r#"{"title":"Hi","body":"Body"}"#);
    }
}
