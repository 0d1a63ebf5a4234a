use alumni_shared::models::{AttendanceResponse, EventSummary};
use alumni_shared::registration::RegistrationFailure;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::session::{ClientConfig, Session};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The server refused on a business rule.
    #[error("{message}")]
    Rejected {
        failure: RegistrationFailure,
        message: String,
    },
    /// The request itself was invalid or refused for a reason without a rule code.
    #[error("{message}")]
    Validation {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Not signed in")]
    Unauthorized,
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Request timed out")]
    Timeout,
}

impl ApiError {
    /// Text shown to the user on the event card.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Rejected { failure, .. } => match failure {
                RegistrationFailure::EventNotFound => "This event no longer exists.".into(),
                RegistrationFailure::RegistrationNotRequired => {
                    "This event doesn't need registration, just show up!".into()
                }
                RegistrationFailure::DeadlinePassed => {
                    "Registration for this event has closed.".into()
                }
                RegistrationFailure::CapacityExceeded => "Sorry, this event is full.".into(),
                RegistrationFailure::AlreadyRegistered => {
                    "You're already registered for this event.".into()
                }
                RegistrationFailure::NotRegistered => {
                    "You're not registered for this event.".into()
                }
            },
            ApiError::Validation { message, .. } => message.clone(),
            ApiError::Unauthorized => "Please sign in again.".into(),
            ApiError::Server { .. } => "Something went wrong on our side. Please try again.".into(),
            ApiError::Transport(_) => "Couldn't reach the server. Check your connection.".into(),
            ApiError::Timeout => "The server took too long to respond. Please try again.".into(),
        }
    }

    pub fn failure(&self) -> Option<RegistrationFailure> {
        match self {
            ApiError::Rejected { failure, .. } => Some(*failure),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct EventDetails {
    pub event: EventSummary,
    pub attendance: Option<AttendanceResponse>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RegistrationReceipt {
    pub event: EventSummary,
    pub attendance: AttendanceResponse,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CancellationReceipt {
    pub event: EventSummary,
    pub attendance: AttendanceResponse,
    #[serde(default)]
    pub refund_pending: bool,
    #[serde(default)]
    pub refund_unrecorded: bool,
}

/// The registration endpoints of the event service.
#[async_trait]
pub trait RegistrationApi: Send + Sync {
    async fn fetch_event(&self, session: &Session, event_id: &str) -> Result<EventDetails, ApiError>;

    async fn register(
        &self,
        session: &Session,
        event_id: &str,
    ) -> Result<RegistrationReceipt, ApiError>;

    async fn cancel(
        &self,
        session: &Session,
        event_id: &str,
    ) -> Result<CancellationReceipt, ApiError>;
}

#[async_trait]
impl<T> RegistrationApi for Arc<T>
where
    T: RegistrationApi + ?Sized,
{
    async fn fetch_event(&self, session: &Session, event_id: &str) -> Result<EventDetails, ApiError> {
        (**self).fetch_event(session, event_id).await
    }

    async fn register(
        &self,
        session: &Session,
        event_id: &str,
    ) -> Result<RegistrationReceipt, ApiError> {
        (**self).register(session, event_id).await
    }

    async fn cancel(
        &self,
        session: &Session,
        event_id: &str,
    ) -> Result<CancellationReceipt, ApiError> {
        (**self).cancel(session, event_id).await
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

pub struct HttpRegistrationApi {
    client: Client,
    base_url: Url,
}

impl HttpRegistrationApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ApiError::Transport(format!("Invalid base URL {}: {}", config.base_url, e))
        })?;

        Ok(Self { client, base_url })
    }

    /// Appends percent-encoded path segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("Base URL {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ApiError::Transport(format!("Unexpected response body: {}", e)));
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        debug!("Request failed with {}: {} {}", status, body.error, body.message);

        if let Some(failure) = RegistrationFailure::from_code(&body.error) {
            let message = if body.message.is_empty() {
                failure.to_string()
            } else {
                body.message
            };
            return Err(ApiError::Rejected { failure, message });
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        if status.is_client_error() {
            return Err(ApiError::Validation {
                status: status.as_u16(),
                code: body.error,
                message: body.message,
            });
        }

        warn!("Event service returned {}: {}", status, body.message);
        Err(ApiError::Server {
            status: status.as_u16(),
            message: body.message,
        })
    }
}

fn transport(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(e.to_string())
    }
}

#[async_trait]
impl RegistrationApi for HttpRegistrationApi {
    async fn fetch_event(&self, session: &Session, event_id: &str) -> Result<EventDetails, ApiError> {
        let response = self
            .client
            .get(self.url(&["events", event_id])?)
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(transport)?;

        Self::parse(response).await
    }

    async fn register(
        &self,
        session: &Session,
        event_id: &str,
    ) -> Result<RegistrationReceipt, ApiError> {
        let response = self
            .client
            .post(self.url(&["events", event_id, "register"])?)
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(transport)?;

        Self::parse(response).await
    }

    async fn cancel(
        &self,
        session: &Session,
        event_id: &str,
    ) -> Result<CancellationReceipt, ApiError> {
        let response = self
            .client
            .delete(self.url(&["events", event_id, "register"])?)
            .bearer_auth(&session.token)
            .send()
            .await
            .map_err(transport)?;

        Self::parse(response).await
    }
}
