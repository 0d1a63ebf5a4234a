use alumni_shared::models::events::{REGISTRATION_CANCELLED, REGISTRATION_CONFIRMED};
use alumni_shared::models::{PushToken, RegistrationEvent};
use alumni_shared::push::{Notification, PushClient};
use alumni_shared::store::dynamo::DynamoPushTokenStore;
use alumni_shared::store::PushTokenStore;
use aws_lambda_events::event::sns::SnsEvent;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use log::{error, info, warn};
use std::sync::Arc;

mod errors;

use errors::NotificationError;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Notification Service Lambda");

    let push_store = Arc::new(DynamoPushTokenStore::new().await);
    let push_client = PushClient::from_env();

    lambda_runtime::run(service_fn(|event| {
        handler(event, push_store.clone(), push_client.clone())
    }))
    .await?;
    Ok(())
}

async fn handler(
    event: LambdaEvent<SnsEvent>,
    push_store: Arc<DynamoPushTokenStore>,
    push_client: PushClient,
) -> Result<(), Error> {
    for record in event.payload.records {
        let message = record.sns;
        info!("Processing SNS message: {:?}", message.message_id);

        // One bad record must not block the rest of the batch
        if let Err(e) = notify(push_store.as_ref(), &push_client, &message.message).await {
            error!("Failed to handle message {:?}: {}", message.message_id, e);
        }
    }

    Ok(())
}

/// Parsed message plus the devices to notify. `None` for message types this
/// service ignores.
async fn recipients(
    push_store: &dyn PushTokenStore,
    raw: &str,
) -> Result<Option<(RegistrationEvent, bool, Vec<PushToken>)>, NotificationError> {
    let event: RegistrationEvent =
        serde_json::from_str(raw).map_err(|e| NotificationError::Malformed(e.to_string()))?;

    let confirmed = match event.event_type.as_str() {
        REGISTRATION_CONFIRMED => true,
        REGISTRATION_CANCELLED => false,
        other => {
            warn!("Unexpected event type: {}", other);
            return Ok(None);
        }
    };

    let tokens = push_store
        .get_push_tokens(&[event.user_id.clone()])
        .await
        .map_err(|e| NotificationError::TokenLookupFailed(e.to_string()))?;

    Ok(Some((event, confirmed, tokens)))
}

async fn notify(
    push_store: &dyn PushTokenStore,
    push_client: &PushClient,
    raw: &str,
) -> Result<(), NotificationError> {
    let (event, confirmed, tokens) = match recipients(push_store, raw).await? {
        Some(found) => found,
        None => return Ok(()),
    };

    if tokens.is_empty() {
        info!(
            "No push token for user {}, skipping {} for event {}",
            event.user_id, event.event_type, event.event_id
        );
        return Ok(());
    }

    let notification = Notification::registration(&event.event_title, &event.event_id, confirmed);
    push_client
        .send(&tokens, &notification)
        .await
        .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

    info!(
        "Sent {} notification to user {} for event {}",
        event.event_type, event.user_id, event.event_id
    );
    Ok(())
}
