use alumni_shared::models::{now_str, PushToken};
use alumni_shared::store::EventStore;
use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    Json,
};
use log::info;

use crate::error::{AppError, Result};
use crate::models::RegisterPushTokenRequest;
use crate::state::AppState;

/// PUT /users/push-token
/// Register or update a user's push notification token
pub async fn register_push_token<S>(
    State(state): State<AppState<S>>,
    Extension(user_id): Extension<String>,
    payload: std::result::Result<Json<RegisterPushTokenRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>>
where
    S: EventStore,
{
    let Json(request) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;

    info!(
        "Registering push token for user: {}, platform: {}",
        user_id, request.platform
    );

    if request.platform != "ios" && request.platform != "android" {
        return Err(AppError::bad_request(format!(
            "Invalid platform: {}. Must be 'ios' or 'android'",
            request.platform
        )));
    }

    // Expo push tokens start with "ExponentPushToken["
    if !request.push_token.starts_with("ExponentPushToken[") {
        return Err(AppError::bad_request(
            "Invalid push token format. Expected Expo push token.".to_string(),
        ));
    }

    let token = PushToken {
        user_id: user_id.clone(),
        push_token: request.push_token,
        platform: request.platform,
        updated_at: now_str(),
    };

    state.push_tokens.save_push_token(token).await?;

    Ok(Json(serde_json::json!({
        "message": "Push token registered successfully"
    })))
}
