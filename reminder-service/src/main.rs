use alumni_shared::models::{AttendanceStatus, Event};
use alumni_shared::push::{Notification, PushClient};
use alumni_shared::store::dynamo::{DynamoEventStore, DynamoPushTokenStore};
use alumni_shared::store::{EventStore, PushTokenStore};
use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use chrono::{DateTime, Utc};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use log::{error, info, warn};
use std::sync::Arc;

/// Reminder lead times in hours before an event starts
const DAY_BEFORE_HOURS: i64 = 24;
const HOUR_BEFORE_HOURS: i64 = 1;

/// Width of each reminder window. Matches the hourly schedule so every
/// attendee gets each reminder exactly once.
const WINDOW_MINUTES: i64 = 60;

#[derive(Debug, PartialEq)]
struct DueReminder {
    event_id: String,
    event_title: String,
    hours_until_start: i64,
    user_ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Reminder Service Lambda");

    let event_store = Arc::new(DynamoEventStore::new().await);
    let push_store = Arc::new(DynamoPushTokenStore::new().await);
    let push_client = PushClient::from_env();

    lambda_runtime::run(service_fn(|event| {
        handler(
            event,
            event_store.clone(),
            push_store.clone(),
            push_client.clone(),
        )
    }))
    .await?;

    Ok(())
}

async fn handler(
    _event: LambdaEvent<CloudWatchEvent>,
    event_store: Arc<DynamoEventStore>,
    push_store: Arc<DynamoPushTokenStore>,
    push_client: PushClient,
) -> Result<(), Error> {
    info!("Reminder service triggered");

    let events = event_store.list_events().await.map_err(|e| {
        error!("Failed to list events: {}", e);
        Error::from(format!("Failed to list events: {}", e))
    })?;

    let due = reminders_due(&events, Utc::now());
    info!("{} of {} events need reminders", due.len(), events.len());

    let mut sent = 0;
    for reminder in &due {
        match send_reminder(push_store.as_ref(), &push_client, reminder).await {
            Ok(count) => sent += count,
            // Continue with the remaining events
            Err(e) => error!("Failed to remind attendees of {}: {}", reminder.event_id, e),
        }
    }

    info!("Reminder service completed. Sent {} reminders", sent);
    Ok(())
}

async fn send_reminder(
    push_store: &dyn PushTokenStore,
    push_client: &PushClient,
    reminder: &DueReminder,
) -> Result<usize, String> {
    let tokens = push_store
        .get_push_tokens(&reminder.user_ids)
        .await
        .map_err(|e| format!("Failed to get push tokens: {}", e))?;

    if tokens.is_empty() {
        warn!(
            "No push tokens for {} attendees of event {}",
            reminder.user_ids.len(),
            reminder.event_id
        );
        return Ok(0);
    }

    let notification = Notification::reminder(
        &reminder.event_title,
        &reminder.event_id,
        reminder.hours_until_start,
    );
    push_client
        .send(&tokens, &notification)
        .await
        .map_err(|e| e.to_string())?;

    info!(
        "Sent {}h reminder for event {} to {} devices",
        reminder.hours_until_start,
        reminder.event_id,
        tokens.len()
    );
    Ok(tokens.len())
}

/// Events whose start falls inside a reminder window, with the attendees
/// still holding an unchecked-in registration.
fn reminders_due(events: &[Event], now: DateTime<Utc>) -> Vec<DueReminder> {
    events
        .iter()
        .filter_map(|event| {
            let minutes_until_start = (event.starts_at - now).num_minutes();
            let hours_until_start = determine_reminder(minutes_until_start)?;

            let user_ids: Vec<String> = event
                .attendees
                .iter()
                .filter(|a| a.status == AttendanceStatus::Registered)
                .map(|a| a.user_id.clone())
                .collect();

            if user_ids.is_empty() {
                return None;
            }

            Some(DueReminder {
                event_id: event.id.clone(),
                event_title: event.title.clone(),
                hours_until_start,
                user_ids,
            })
        })
        .collect()
}

/// Returns the lead time of the reminder to send, or `None` outside every
/// window. Windows are half-open: (lead - 60min, lead].
fn determine_reminder(minutes_until_start: i64) -> Option<i64> {
    [DAY_BEFORE_HOURS, HOUR_BEFORE_HOURS]
        .into_iter()
        .find(|hours| {
            let lead = hours * 60;
            minutes_until_start > lead - WINDOW_MINUTES && minutes_until_start <= lead
        })
}
