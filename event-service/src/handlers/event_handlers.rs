use alumni_shared::models::{AttendanceResponse, Event, EventSummary, RegistrationPolicy};
use alumni_shared::store::EventStore;
use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::CreateEventRequest;
use crate::state::AppState;

// GET /events
pub async fn list_events<S>(
    State(state): State<AppState<S>>,
    Extension(_user_id): Extension<String>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore,
{
    let now = Utc::now();
    let mut events: Vec<Event> = state
        .store
        .list_events()
        .await?
        .into_iter()
        .filter(|e| e.ends_at > now)
        .collect();
    events.sort_by_key(|e| e.starts_at);

    let summaries: Vec<EventSummary> = events.iter().map(EventSummary::from).collect();

    Ok(Json(serde_json::json!({ "events": summaries })))
}

// POST /events
pub async fn create_event<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<String>,
    payload: std::result::Result<Json<CreateEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>)>
where
    S: EventStore,
{
    let Json(payload) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;
    payload.validate().map_err(AppError::bad_request)?;

    let now = Utc::now();
    let event = Event {
        id: Uuid::new_v4().to_string(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        location: payload.location,
        organizer_id: user_id,
        starts_at: payload.starts_at,
        ends_at: payload.ends_at,
        capacity: payload.capacity,
        registration: payload.registration.unwrap_or(RegistrationPolicy {
            is_required: true,
            deadline: None,
            fee: None,
        }),
        attendees: vec![],
        created_at: now,
        updated_at: now,
        version: 0,
    };

    let created = state.store.create_event(event).await?;
    info!(
        "Event {} created by organizer {}",
        created.id, created.organizer_id
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "event": EventSummary::from(&created) })),
    ))
}

// GET /events/:id
pub async fn get_event<S>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore,
{
    let event = state.registrations().load(&id).await?;
    let attendance = event.active_record(&user_id).map(AttendanceResponse::from);

    Ok(Json(serde_json::json!({
        "event": EventSummary::from(&event),
        "attendance": attendance
    })))
}

// GET /events/:id/attendees
// Full record history, including cancelled entries. Organizer only.
pub async fn list_attendees<S>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore,
{
    let event = state.registrations().load(&id).await?;

    if event.organizer_id != user_id {
        return Err(AppError::forbidden(
            "Only the organizer can view the attendee list".into(),
        ));
    }

    let attendees: Vec<AttendanceResponse> =
        event.attendees.iter().map(AttendanceResponse::from).collect();

    Ok(Json(serde_json::json!({
        "attendees": attendees,
        "attendeeCount": event.active_count()
    })))
}

// POST /events/:id/attendees/:user_id/check-in
pub async fn check_in_attendee<S>(
    State(state): State<AppState<S>>,
    Path((id, attendee_id)): Path<(String, String)>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore,
{
    let outcome = state
        .registrations()
        .check_in(&id, &user_id, &attendee_id)
        .await?;

    Ok(Json(serde_json::json!({
        "event": EventSummary::from(&outcome.event),
        "attendance": AttendanceResponse::from(&outcome.record)
    })))
}
