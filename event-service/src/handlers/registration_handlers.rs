use alumni_shared::models::{events, AttendanceResponse, EventSummary};
use alumni_shared::store::EventStore;
use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    Json,
};

use crate::error::{AppError, Result};
use crate::models::PayRegistrationRequest;
use crate::publish::{publish_registration_event_logged, registration_event};
use crate::state::AppState;

// POST /events/:id/register
pub async fn register_for_event<S>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore,
{
    let outcome = state.registrations().register(&id, &user_id).await?;

    tokio::spawn(publish_registration_event_logged(
        state.config.sns_topic_arn.clone(),
        registration_event(events::REGISTRATION_CONFIRMED, &outcome.event, &outcome.record),
    ));

    Ok(Json(serde_json::json!({
        "event": EventSummary::from(&outcome.event),
        "attendance": AttendanceResponse::from(&outcome.record)
    })))
}

// DELETE /events/:id/register
pub async fn cancel_registration<S>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore,
{
    let outcome = state.registrations().cancel(&id, &user_id).await?;

    tokio::spawn(publish_registration_event_logged(
        state.config.sns_topic_arn.clone(),
        registration_event(events::REGISTRATION_CANCELLED, &outcome.event, &outcome.record),
    ));

    Ok(Json(serde_json::json!({
        "event": EventSummary::from(&outcome.event),
        "attendance": AttendanceResponse::from(&outcome.record),
        "refundPending": outcome.refund_pending,
        "refundUnrecorded": outcome.refund_unrecorded
    })))
}

// POST /events/:id/register/payment
pub async fn pay_registration<S>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Extension(user_id): Extension<String>,
    payload: std::result::Result<Json<PayRegistrationRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore,
{
    let Json(payload) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;

    if payload.payment_token.trim().is_empty() {
        return Err(AppError::bad_request("paymentToken must not be empty".into()));
    }

    let outcome = state
        .registrations()
        .pay(&id, &user_id, &payload.payment_token)
        .await?;

    Ok(Json(serde_json::json!({
        "event": EventSummary::from(&outcome.event),
        "attendance": AttendanceResponse::from(&outcome.record),
        "refundPending": outcome.refund_pending,
        "refundUnrecorded": outcome.refund_unrecorded
    })))
}
