//! Delivery of notifications through the Expo push API.

use log::{error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use thiserror::Error;

use crate::models::PushToken;

const DEFAULT_EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Failed to send push notifications: {0}")]
    Request(String),
    #[error("Expo push API error: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("Failed to parse push response: {0}")]
    Parse(String),
}

#[derive(Debug, Serialize)]
struct ExpoPushMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a Value,
    sound: &'static str,
}

#[derive(Debug, Deserialize)]
struct ExpoPushResponse {
    data: Vec<ExpoPushTicket>,
}

#[derive(Debug, Deserialize)]
pub struct ExpoPushTicket {
    pub status: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One notification, rendered for every device of its recipients.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: Value,
}

impl Notification {
    /// Confirms a registration or cancellation to the attendee.
    pub fn registration(event_title: &str, event_id: &str, confirmed: bool) -> Self {
        let (title, body, kind) = if confirmed {
            (
                "Registration confirmed",
                format!("You're registered for \"{}\". See you there!", event_title),
                "registration_confirmed",
            )
        } else {
            (
                "Registration cancelled",
                format!("Your registration for \"{}\" was cancelled.", event_title),
                "registration_cancelled",
            )
        };

        Self {
            title: title.to_string(),
            body,
            data: json!({ "type": kind, "eventId": event_id, "eventTitle": event_title }),
        }
    }

    /// Reminds an attendee that an event is coming up.
    pub fn reminder(event_title: &str, event_id: &str, hours_until_start: i64) -> Self {
        let body = if hours_until_start <= 1 {
            format!("\"{}\" starts within the hour.", event_title)
        } else {
            format!("\"{}\" starts in {} hours.", event_title, hours_until_start)
        };

        Self {
            title: "Upcoming event".to_string(),
            body,
            data: json!({ "type": "event_reminder", "eventId": event_id, "eventTitle": event_title }),
        }
    }
}

#[derive(Clone)]
pub struct PushClient {
    client: Client,
    url: String,
}

impl PushClient {
    /// Uses `EXPO_PUSH_URL` when set, otherwise the public Expo endpoint.
    pub fn from_env() -> Self {
        let url = env::var("EXPO_PUSH_URL").unwrap_or_else(|_| DEFAULT_EXPO_PUSH_URL.to_string());
        Self::with_url(url)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    /// Sends `notification` to every token. Tickets the API rejects are logged
    /// and returned; only transport and API-level failures are errors.
    pub async fn send(
        &self,
        tokens: &[PushToken],
        notification: &Notification,
    ) -> Result<Vec<ExpoPushTicket>, PushError> {
        if tokens.is_empty() {
            info!("No push tokens provided, skipping push notification");
            return Ok(Vec::new());
        }

        let messages: Vec<ExpoPushMessage> = tokens
            .iter()
            .map(|token| ExpoPushMessage {
                to: &token.push_token,
                title: &notification.title,
                body: &notification.body,
                data: &notification.data,
                sound: "default",
            })
            .collect();

        info!("Sending {} push notifications to Expo", messages.len());

        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(&messages)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send push notifications: {}", e);
                PushError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Expo push API returned error status {}: {}", status, body);
            return Err(PushError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let tickets = response
            .json::<ExpoPushResponse>()
            .await
            .map_err(|e| PushError::Parse(e.to_string()))?
            .data;

        for (i, ticket) in tickets.iter().enumerate() {
            if ticket.status != "ok" {
                error!(
                    "Push notification {} failed: status={}, message={:?}",
                    i, ticket.status, ticket.message
                );
            }
        }

        Ok(tickets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_str;
    use mockito::Matcher;

    fn token(user_id: &str) -> PushToken {
        PushToken {
            user_id: user_id.to_string(),
            push_token: format!("ExponentPushToken[{}]", user_id),
            platform: "ios".to_string(),
            updated_at: now_str(),
        }
    }

    #[test]
    fn test_reminder_wording() {
        assert_eq!(
            Notification::reminder("Mixer", "e1", 24).body,
            "\"Mixer\" starts in 24 hours."
        );
        assert_eq!(
            Notification::reminder("Mixer", "e1", 1).body,
            "\"Mixer\" starts within the hour."
        );
    }

    #[tokio::test]
    async fn test_send_posts_one_message_per_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/push")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r"ExponentPushToken\[a\]".to_string()),
                Matcher::Regex(r"ExponentPushToken\[b\]".to_string()),
                Matcher::Regex("registration_confirmed".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"status":"ok","id":"t1"},{"status":"error","message":"DeviceNotRegistered"}]}"#)
            .create_async()
            .await;

        let client = PushClient::with_url(format!("{}/push", server.url()));
        let tickets = client
            .send(
                &[token("a"), token("b")],
                &Notification::registration("Mixer", "e1", true),
            )
            .await
            .unwrap();

        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[1].status, "error");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_without_tokens_makes_no_request() {
        let client = PushClient::with_url("http://127.0.0.1:9/push");
        let tickets = client
            .send(&[], &Notification::reminder("Mixer", "e1", 24))
            .await
            .unwrap();
        assert!(tickets.is_empty());
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/push")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = PushClient::with_url(format!("{}/push", server.url()));
        let err = client
            .send(&[token("a")], &Notification::registration("Mixer", "e1", false))
            .await
            .unwrap_err();

        assert!(matches!(err, PushError::Api { status: 429, .. }));
    }
}
