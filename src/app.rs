use crate::analytics::DeliveryAnalytics;
use crate::auth as auth_service;
use crate::config;
use crate::state;
use crate::store::{NotificationStore, NudgeStore, PreferenceStore, SubscriptionStore};

use axum::Router;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;

use std::sync::Arc;

mod auth;
mod notifications;
mod push;

pub fn app(config: config::AppConfig) -> Router {
    let auth = auth_service::AuthState::from_config(&config)
        .unwrap_or_else(|err| panic!("invalid auth configuration: {err}"));
    let notifications = Arc::new(NotificationStore::new());
    let state = state::AppState {
        auth,
        analytics: Arc::new(DeliveryAnalytics::new(Arc::clone(&notifications))),
        notifications,
        subscriptions: Arc::new(SubscriptionStore::new()),
        nudges: Arc::new(NudgeStore::new()),
        preferences: Arc::new(PreferenceStore::new()),
        config,
    };
    Router::new()
        .route("/notifications", post(notifications::notification_create))
        .route(
            "/push/subscriptions",
            post(push::subscription_upsert).delete(push::subscription_remove),
        )
        .route("/push/send", post(push::push_send))
        .route("/push/nudge", post(push::push_nudge))
        .route("/api/push/public-key", get(push::push_public_key))
        .route("/api/push/clicked", post(push::push_clicked))
        .route(
            "/api/push/preferences",
            get(push::preferences_view).post(push::preferences_update),
        )
        .route("/api/debug/push/registry", get(push::push_registry_debug))
        .route("/api/debug/push/stats", get(push::push_stats_debug))
        .route("/health", get(health))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
#[allow(non_snake_case)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::body::to_bytes;
    use axum::http::Request;
    use axum::http::StatusCode;
    use axum::http::header::AUTHORIZATION;
    use base64::{URL_SAFE_NO_PAD, encode_config};
    use jwt_simple::algorithms::MACLike;
    use jwt_simple::prelude::{Claims, Duration as JwtDuration, HS256Key};
    use serde_json::Value as JsonValue;
    use serde_json::json;
    use tower::ServiceExt;

    const VAPID_PRIVATE: &str = "9pKJeIXAyyCj5M0QagsVvDYHlPF-cymJCbB5iHPsdEE";
    const VAPID_PUBLIC: &str =
        "BCRweRf_U5iQM4pKNucGRzM6OuLp8Hisa8yX0N2ePIf1oxKitvFT6qvuGgYoTxlMatMDaytXbZR3rVClc2w_p6U";

    fn vapid_config() -> config::AppConfig {
        config::AppConfig {
            vapid_private_key: Some(VAPID_PRIVATE.to_string()),
            vapid_public_key: Some(VAPID_PUBLIC.to_string()),
            vapid_subject: Some("mailto:duet@example.com".to_string()),
            ..Default::default()
        }
    }

    fn auth_config(key_bytes: &[u8]) -> config::AppConfig {
        config::AppConfig {
            auth: Some(config::AuthConfig {
                key: encode_config(key_bytes, URL_SAFE_NO_PAD),
                cookie_name: "duet_auth".to_string(),
            }),
            ..Default::default()
        }
    }

    fn auth_token(key_bytes: &[u8], issuer: &str, subject: &str) -> String {
        let key = HS256Key::from_bytes(key_bytes);
        let claims = Claims::create(JwtDuration::from_hours(1))
            .with_issuer(issuer)
            .with_subject(subject);
        key.authenticate(claims).expect("authenticate token")
    }

    fn json_request(method: &str, uri: &str, body: &JsonValue) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("build request")
    }

    async fn response_json(response: axum::response::Response) -> JsonValue {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("parse json")
    }

    #[tokio::test]
    async fn app__should_return_ok_on_health_endpoint() {
        // Given
        let app = app(config::AppConfig::default());

        // When
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert_eq!(body.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn auth_middleware__should_reject_requests_without_token() {
        // Given
        let app = app(auth_config(b"auth-reject-secret"));
        let body = json!({
            "discussionId": "d1",
            "recipientId": "u2",
            "senderId": "u1",
            "type": "new_message",
        });

        // When
        let response = app
            .oneshot(json_request("POST", "/notifications", &body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let payload = response_json(response).await;
        assert_eq!(payload["error"], "unauthorized");
    }

    #[tokio::test]
    async fn auth_middleware__should_accept_bearer_token() {
        // Given
        let key_bytes = b"auth-bearer-secret";
        let app = app(auth_config(key_bytes));
        let token = auth_token(key_bytes, "Duet", "u1");

        // When
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/push/preferences")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let payload = response_json(response).await;
        assert_eq!(payload["muted_kinds"], json!([]));
    }

    #[tokio::test]
    async fn notification_create__should_reject_missing_fields() {
        // Given
        let app = app(config::AppConfig::default());
        let body = json!({
            "discussionId": "d1",
            "senderId": "u1",
            "type": "new_message",
        });

        // When
        let response = app
            .oneshot(json_request("POST", "/notifications", &body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = response_json(response).await;
        assert_eq!(payload["error"], "recipientId is required.");
    }

    #[tokio::test]
    async fn notification_create__should_suppress_self_notifications() {
        // Given
        let app = app(config::AppConfig::default());
        let body = json!({
            "discussionId": "d1",
            "recipientId": "u1",
            "senderId": "u1",
            "type": "new_message",
        });

        // When
        let response = app
            .oneshot(json_request("POST", "/notifications", &body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let payload = response_json(response).await;
        assert_eq!(payload["success"], true);
        assert_eq!(payload["sent"], false);
        assert_eq!(payload["grouped"], false);
        assert!(payload.get("count").is_none());
    }

    #[tokio::test]
    async fn notification_create__should_group_repeated_messages() {
        // Given
        let app = app(config::AppConfig::default());
        let body = json!({
            "discussionId": "d1",
            "recipientId": "u2",
            "senderId": "u1",
            "type": "new_message",
            "metadata": { "title": "Pagamento", "sender": "Alex" },
        });

        // When
        let first = app
            .clone()
            .oneshot(json_request("POST", "/notifications", &body))
            .await
            .expect("first request");
        let second = app
            .oneshot(json_request("POST", "/notifications", &body))
            .await
            .expect("second request");

        // Then
        let first = response_json(first).await;
        assert_eq!(first["success"], true);
        assert_eq!(first["grouped"], false);
        assert_eq!(first["count"], 1);
        let second = response_json(second).await;
        assert_eq!(second["grouped"], true);
        assert_eq!(second["count"], 2);
    }

    #[tokio::test]
    async fn subscription_endpoints__should_upsert_and_remove_idempotently() {
        // Given
        let app = app(config::AppConfig::default());
        let subscribe = json!({
            "subscription": {
                "endpoint": "https://push.example/123",
                "keys": { "p256dh": "p256", "auth": "auth" },
            },
        });

        // When: register the same endpoint twice
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(json_request("POST", "/push/subscriptions", &subscribe))
                .await
                .expect("subscribe request");
            assert_eq!(response.status(), StatusCode::OK);
        }

        // Then: the registry holds a single row for the local user
        let registry = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/debug/push/registry")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("registry request");
        let registry = response_json(registry).await;
        assert_eq!(registry["local"].as_array().expect("rows").len(), 1);

        // When: remove it twice
        let remove = json!({ "endpoint": "https://push.example/123" });
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(json_request("DELETE", "/push/subscriptions", &remove))
                .await
                .expect("unsubscribe request");
            assert_eq!(response.status(), StatusCode::OK);
            let payload = response_json(response).await;
            assert_eq!(payload["success"], true);
        }
    }

    #[tokio::test]
    async fn push_subscribe__should_reject_blank_endpoint() {
        // Given
        let app = app(config::AppConfig::default());
        let body = json!({
            "subscription": {
                "endpoint": " ",
                "keys": { "p256dh": "p256", "auth": "auth" },
            },
        });

        // When
        let response = app
            .oneshot(json_request("POST", "/push/subscriptions", &body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn push_public_key__should_require_configuration() {
        // Given
        let app = app(config::AppConfig::default());

        // When
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/push/public-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn push_send__should_require_configuration() {
        // Given
        let app = app(config::AppConfig::default());
        let body = json!({
            "recipientUserId": "u2",
            "title": "Hi",
            "body": "Hello",
        });

        // When
        let response = app
            .oneshot(json_request("POST", "/push/send", &body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn push_send__should_report_zero_attempts_without_devices() {
        // Given
        let app = app(vapid_config());
        let body = json!({
            "recipientUserId": "u2",
            "title": "Hi",
            "body": "Hello",
            "url": "/discussions/d1",
        });

        // When
        let response = app
            .oneshot(json_request("POST", "/push/send", &body))
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let payload = response_json(response).await;
        assert_eq!(payload["sent"], 0);
        assert_eq!(payload["delivered"], 0);
        assert_eq!(payload["failed"], 0);
    }

    #[tokio::test]
    async fn push_nudge__should_allow_then_enforce_cooldown() {
        // Given
        let app = app(vapid_config());
        let body = json!({ "recipientUserId": "u2", "senderName": "Alex" });

        // When
        let first = app
            .clone()
            .oneshot(json_request("POST", "/push/nudge", &body))
            .await
            .expect("first nudge");
        let second = app
            .oneshot(json_request("POST", "/push/nudge", &body))
            .await
            .expect("second nudge");

        // Then
        assert_eq!(first.status(), StatusCode::OK);
        let first = response_json(first).await;
        assert_eq!(first["success"], true);
        assert_eq!(first["remainingToday"], 9);

        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let second = response_json(second).await;
        assert_eq!(second["error"], "cooldown active");
        let cooldown = second["cooldownSeconds"].as_u64().expect("cooldown");
        assert!(cooldown > 7100 && cooldown <= 7200, "cooldown was {cooldown}");
    }

    #[tokio::test]
    async fn preferences__should_round_trip() {
        // Given
        let app = app(config::AppConfig::default());
        let update = json!({
            "muted_kinds": ["reaction"],
            "dismissed_nudge_hint": true,
        });

        // When
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/push/preferences", &update))
            .await
            .expect("update request");
        assert_eq!(response.status(), StatusCode::OK);
        let fetched = app
            .oneshot(
                Request::builder()
                    .uri("/api/push/preferences")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("fetch request");

        // Then
        let payload = response_json(fetched).await;
        assert_eq!(payload["muted_kinds"], json!(["reaction"]));
        assert_eq!(payload["dismissed_nudge_hint"], true);
    }

    #[tokio::test]
    async fn push_clicked__should_report_unknown_notifications() {
        // Given
        let app = app(config::AppConfig::default());

        // When
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/push/clicked",
                &json!({ "notificationId": 42 }),
            ))
            .await
            .expect("request failed");

        // Then
        let payload = response_json(response).await;
        assert_eq!(payload["success"], false);
    }

    #[tokio::test]
    async fn push_stats_debug__should_start_empty() {
        // Given
        let app = app(config::AppConfig::default());

        // When
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/debug/push/stats?hours=48")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request failed");

        // Then
        assert_eq!(response.status(), StatusCode::OK);
        let payload = response_json(response).await;
        assert_eq!(payload["total_sent"], 0);
        assert_eq!(payload["delivery_rate"], 0.0);
    }
}
