use crate::adapters::{TokioTimeProvider, WebPushSender};
use crate::notify::NotificationAggregator;
use crate::push::{self as push_service, PushDispatcher};
use crate::state;
use crate::types::notify::{ActivityEvent, EventMetadata, NotificationKind};

use super::push::ErrorResponse;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotificationRequest {
    pub(crate) discussion_id: Option<String>,
    pub(crate) recipient_id: Option<String>,
    pub(crate) sender_id: Option<String>,
    #[serde(rename = "type")]
    pub(crate) kind: Option<String>,
    pub(crate) metadata: Option<EventMetadata>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotificationResponse {
    pub(crate) success: bool,
    pub(crate) sent: bool,
    pub(crate) grouped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) count: Option<u32>,
}

pub(crate) async fn notification_create(
    State(state): State<state::AppState>,
    Json(request): Json<NotificationRequest>,
) -> Result<Json<NotificationResponse>, (StatusCode, Json<ErrorResponse>)> {
    let discussion_id = required(request.discussion_id, "discussionId is required.")?;
    let recipient_id = required(request.recipient_id, "recipientId is required.")?;
    let sender_id = required(request.sender_id, "senderId is required.")?;
    let kind = required(request.kind, "type is required.")?;
    let kind = NotificationKind::parse(&kind).ok_or((
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "type is not a known notification type.",
        }),
    ))?;

    let event = ActivityEvent {
        discussion_id,
        recipient_id,
        sender_id,
        kind,
        metadata: request.metadata.unwrap_or_default(),
    };

    let outcome = build_aggregator(&state).handle_event(event);
    Ok(Json(NotificationResponse {
        success: true,
        sent: outcome.sent,
        grouped: outcome.grouped,
        count: outcome.count,
    }))
}

fn required(
    value: Option<String>,
    message: &'static str,
) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err((StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))),
    }
}

/// Per-request aggregator wiring. Without a complete VAPID configuration the
/// aggregation still runs; only the dispatch leg is disabled.
fn build_aggregator(
    state: &state::AppState,
) -> NotificationAggregator<TokioTimeProvider, WebPushSender> {
    let dispatcher = match push_service::load_vapid_config(&state.config) {
        push_service::VapidConfigStatus::Ready(vapid) => match WebPushSender::new(vapid) {
            Ok(sender) => Some(PushDispatcher::new(
                sender,
                TokioTimeProvider,
                Arc::clone(&state.subscriptions),
                Arc::clone(&state.analytics),
                state.config.tuning.fanout_max_in_flight,
                state.config.tuning.endpoint_timeout(),
            )),
            Err(err) => {
                eprintln!("push notifications disabled: failed to init web-push ({err})");
                None
            }
        },
        push_service::VapidConfigStatus::Incomplete => {
            eprintln!("push notifications disabled: incomplete VAPID configuration");
            None
        }
        push_service::VapidConfigStatus::Missing => None,
    };
    NotificationAggregator::new(
        TokioTimeProvider,
        dispatcher,
        Arc::clone(&state.notifications),
        Arc::clone(&state.preferences),
        state.config.tuning.grouping_window(),
        state.config.notification_icon.clone(),
    )
}
