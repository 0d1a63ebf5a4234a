use alumni_shared::models::{events, now_str, AttendanceRecord, Event, RegistrationEvent};
use aws_sdk_sns::Client as SnsClient;
use log::{debug, error, info};
use std::collections::HashMap;
use tokio::sync::OnceCell;

use crate::error::{AppError, Result};

// SNS Publishing for registration events
static SNS_CLIENT: OnceCell<SnsClient> = OnceCell::const_new();

/// Builds the message for a committed registration change.
pub fn registration_event(
    event_type: &str,
    event: &Event,
    record: &AttendanceRecord,
) -> RegistrationEvent {
    RegistrationEvent {
        event_type: event_type.to_string(),
        event_id: event.id.clone(),
        event_title: event.title.clone(),
        user_id: record.user_id.clone(),
        attendance_id: record.id.clone(),
        starts_at: event.starts_at.to_rfc3339(),
        timestamp: now_str(),
    }
}

/// Publishes and logs failures. Registration outcomes never depend on SNS.
pub async fn publish_registration_event_logged(
    topic_arn: Option<String>,
    payload: RegistrationEvent,
) {
    if let Err(e) = publish_registration_event(topic_arn.as_deref(), &payload).await {
        error!(
            "Failed to publish {} event for event_id={}: {:?}",
            payload.event_type, payload.event_id, e
        );
    }
}

/// Publishes a registration event to SNS. A missing topic skips publishing.
pub async fn publish_registration_event(
    topic_arn: Option<&str>,
    payload: &RegistrationEvent,
) -> Result<()> {
    let Some(topic_arn) = topic_arn else {
        debug!(
            "No SNS topic configured, skipping {} for event_id={}",
            payload.event_type, payload.event_id
        );
        return Ok(());
    };

    let client = SNS_CLIENT
        .get_or_init(|| async {
            let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .load()
                .await;
            SnsClient::new(&config)
        })
        .await;

    let message = serde_json::to_string(payload).map_err(|e| {
        AppError::internal_server_error(format!("Failed to serialize event payload: {}", e))
    })?;

    // Build message attributes for filtering
    let event_type_attr = aws_sdk_sns::types::MessageAttributeValue::builder()
        .data_type("String")
        .string_value(&payload.event_type)
        .build()
        .map_err(|e| {
            AppError::internal_server_error(format!("Failed to build message attribute: {}", e))
        })?;

    let mut message_attributes = HashMap::new();
    message_attributes.insert("eventType".to_string(), event_type_attr);

    let subject = if payload.event_type == events::REGISTRATION_CONFIRMED {
        "Registration Confirmed"
    } else {
        "Registration Cancelled"
    };

    client
        .publish()
        .topic_arn(topic_arn)
        .message(message)
        .subject(subject)
        .set_message_attributes(Some(message_attributes))
        .send()
        .await
        .map_err(|e| {
            AppError::internal_server_error(format!("Failed to publish to SNS: {}", e))
        })?;

    info!(
        "Published {} event for event_id={}, user_id={}",
        payload.event_type, payload.event_id, payload.user_id
    );
    Ok(())
}
