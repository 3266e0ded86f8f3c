use crate::adapters::{TokioTimeProvider, WebPushSender};
use crate::nudge::{self, NudgeDecision, NudgeDenied, NudgeLimiter};
use crate::push::{self as push_service, PushDispatcher};
use crate::state;
use crate::types::notify::NotificationPreference;
use crate::types::push::{PayloadData, PushPayload, SubscriptionKeys};

use super::auth::AuthUser;

use axum::Extension;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: &'static str,
}

#[derive(Serialize)]
pub(crate) struct SuccessResponse {
    pub(crate) success: bool,
}

#[derive(Serialize)]
pub(crate) struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: String,
}

pub(crate) async fn push_public_key(
    State(state): State<state::AppState>,
) -> Result<Json<PublicKeyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let vapid = match push_service::load_vapid_config(&state.config) {
        push_service::VapidConfigStatus::Ready(vapid) => vapid,
        push_service::VapidConfigStatus::Incomplete | push_service::VapidConfigStatus::Missing => {
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "Push notifications are not configured.",
                }),
            ));
        }
    };

    Ok(Json(PublicKeyResponse {
        public_key: vapid.public_key,
    }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscribeRequest {
    pub(crate) subscription: SubscriptionPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionPayload {
    pub(crate) endpoint: String,
    pub(crate) keys: SubscriptionKeys,
}

pub(crate) async fn subscription_upsert(
    State(state): State<state::AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    let subscription = request.subscription;
    if subscription.endpoint.trim().is_empty()
        || subscription.keys.p256dh.trim().is_empty()
        || subscription.keys.auth.trim().is_empty()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "endpoint, p256dh, and auth are required.",
            }),
        ));
    }

    state.subscriptions.upsert(
        &user.0,
        &subscription.endpoint,
        subscription.keys,
        OffsetDateTime::now_utc(),
    );
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UnsubscribeRequest {
    pub(crate) endpoint: String,
}

pub(crate) async fn subscription_remove(
    State(state): State<state::AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<UnsubscribeRequest>,
) -> Json<SuccessResponse> {
    state.subscriptions.remove(&user.0, &request.endpoint);
    Json(SuccessResponse { success: true })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendRequest {
    pub(crate) recipient_user_id: String,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) url: Option<String>,
    pub(crate) notification_type: Option<String>,
    pub(crate) data: Option<PayloadData>,
}

#[derive(Serialize)]
pub(crate) struct SendResponse {
    pub(crate) sent: usize,
    pub(crate) delivered: usize,
    pub(crate) failed: usize,
}

pub(crate) async fn push_send(
    State(state): State<state::AppState>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, (StatusCode, Json<ErrorResponse>)> {
    if request.recipient_user_id.trim().is_empty()
        || request.title.trim().is_empty()
        || request.body.trim().is_empty()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "recipientUserId, title, and body are required.",
            }),
        ));
    }

    let dispatcher = build_dispatcher(&state)?;
    let payload = PushPayload {
        title: request.title,
        body: request.body,
        icon: state.config.notification_icon.clone(),
        tag: request.notification_type,
        data: request
            .data
            .or(request.url.map(|url| PayloadData::Target { url })),
    };
    let notification_id = state.notifications.allocate_direct_id();
    let outcome = dispatcher
        .dispatch(&request.recipient_user_id, notification_id, &payload)
        .await;

    Ok(Json(SendResponse {
        sent: outcome.attempted,
        delivered: outcome.delivered,
        failed: outcome.failed,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NudgeRequest {
    pub(crate) recipient_user_id: String,
    pub(crate) sender_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NudgeResponse {
    pub(crate) success: bool,
    pub(crate) remaining_today: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NudgeDeniedResponse {
    pub(crate) error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) cooldown_seconds: Option<u64>,
}

pub(crate) async fn push_nudge(
    State(state): State<state::AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<NudgeRequest>,
) -> Result<Json<NudgeResponse>, axum::response::Response> {
    use axum::response::IntoResponse;

    if request.recipient_user_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "recipientUserId is required.",
            }),
        )
            .into_response());
    }

    let dispatcher = build_dispatcher(&state).map_err(IntoResponse::into_response)?;
    let tuning = &state.config.tuning;
    let limiter = NudgeLimiter::new(
        TokioTimeProvider,
        Arc::clone(&state.nudges),
        tuning.nudge_daily_limit,
        tuning.nudge_cooldown(),
        tuning.nudge_utc_offset(),
    );

    let nth_today = match limiter.check(&user.0) {
        NudgeDecision::Allowed { nth_today } => nth_today,
        NudgeDecision::Denied(NudgeDenied::DailyLimitReached) => {
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(NudgeDeniedResponse {
                    error: "daily limit reached",
                    cooldown_seconds: None,
                }),
            )
                .into_response());
        }
        NudgeDecision::Denied(NudgeDenied::Cooldown { remaining }) => {
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(NudgeDeniedResponse {
                    error: "cooldown active",
                    cooldown_seconds: Some(remaining.whole_seconds().max(0) as u64),
                }),
            )
                .into_response());
        }
    };

    let sender_name = request.sender_name.unwrap_or_else(|| user.0.clone());
    let (title, body) = nudge::message_for(nth_today, &sender_name);
    limiter.record_send(&user.0);

    let payload = PushPayload {
        title,
        body,
        icon: state.config.notification_icon.clone(),
        tag: Some("nudge".to_string()),
        data: Some(PayloadData::Target {
            url: "/".to_string(),
        }),
    };
    let notification_id = state.notifications.allocate_direct_id();
    let recipient = request.recipient_user_id;
    tokio::spawn(async move {
        let outcome = dispatcher.dispatch(&recipient, notification_id, &payload).await;
        if outcome.failed > 0 {
            eprintln!(
                "nudge delivery warning: {} of {} endpoints failed (user {recipient})",
                outcome.failed, outcome.attempted
            );
        }
    });

    Ok(Json(NudgeResponse {
        success: true,
        remaining_today: limiter.remaining_today(&user.0),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClickRequest {
    pub(crate) notification_id: u64,
}

pub(crate) async fn push_clicked(
    State(state): State<state::AppState>,
    Json(request): Json<ClickRequest>,
) -> Json<SuccessResponse> {
    let marked = state
        .analytics
        .record_click(request.notification_id, OffsetDateTime::now_utc());
    Json(SuccessResponse { success: marked })
}

pub(crate) async fn preferences_view(
    State(state): State<state::AppState>,
    Extension(user): Extension<AuthUser>,
) -> Json<NotificationPreference> {
    Json(state.preferences.get(&user.0))
}

pub(crate) async fn preferences_update(
    State(state): State<state::AppState>,
    Extension(user): Extension<AuthUser>,
    Json(preference): Json<NotificationPreference>,
) -> Json<SuccessResponse> {
    state.preferences.set(&user.0, preference);
    Json(SuccessResponse { success: true })
}

pub(crate) async fn push_registry_debug(
    State(state): State<state::AppState>,
) -> Json<std::collections::HashMap<String, Vec<crate::types::push::PushSubscription>>> {
    Json(state.subscriptions.snapshot())
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatsQuery {
    pub(crate) hours: Option<i64>,
}

pub(crate) async fn push_stats_debug(
    State(state): State<state::AppState>,
    Query(query): Query<StatsQuery>,
) -> Json<crate::analytics::DeliveryStats> {
    let hours = query.hours.unwrap_or(24).max(0);
    let cutoff = OffsetDateTime::now_utc() - time::Duration::hours(hours);
    Json(state.analytics.stats_since(cutoff))
}

fn build_dispatcher(
    state: &state::AppState,
) -> Result<PushDispatcher<WebPushSender, TokioTimeProvider>, (StatusCode, Json<ErrorResponse>)> {
    let vapid = match push_service::load_vapid_config(&state.config) {
        push_service::VapidConfigStatus::Ready(vapid) => vapid,
        push_service::VapidConfigStatus::Incomplete | push_service::VapidConfigStatus::Missing => {
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "Push notifications are not configured.",
                }),
            ));
        }
    };

    let sender = WebPushSender::new(vapid).map_err(|err| {
        eprintln!("push send error: failed to init web-push ({err})");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to initialize push sender.",
            }),
        )
    })?;

    Ok(PushDispatcher::new(
        sender,
        TokioTimeProvider,
        Arc::clone(&state.subscriptions),
        Arc::clone(&state.analytics),
        state.config.tuning.fanout_max_in_flight,
        state.config.tuning.endpoint_timeout(),
    ))
}
