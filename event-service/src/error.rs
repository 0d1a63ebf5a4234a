use alumni_shared::error::StoreError;
use alumni_shared::registration::RegistrationFailure;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{error, info};
use thiserror::Error;

use crate::payment::PaymentError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Expected, user-facing rule failures. Never logged as server errors.
    #[error(transparent)]
    Registration(#[from] RegistrationFailure),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("This registration has no fee to pay")]
    PaymentNotRequired,

    #[error("This registration is already paid")]
    AlreadyPaid,

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn bad_request(msg: String) -> Self {
        AppError::BadRequest(msg)
    }

    pub fn unauthorized(msg: String) -> Self {
        AppError::Unauthorized(msg)
    }

    pub fn forbidden(msg: String) -> Self {
        AppError::Forbidden(msg)
    }

    pub fn not_found(msg: String) -> Self {
        AppError::NotFound(msg)
    }

    pub fn internal_server_error(msg: String) -> Self {
        AppError::InternalServerError(msg)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Registration(failure) => match failure {
                RegistrationFailure::EventNotFound => StatusCode::NOT_FOUND,
                RegistrationFailure::RegistrationNotRequired => StatusCode::BAD_REQUEST,
                RegistrationFailure::DeadlinePassed => StatusCode::GONE,
                RegistrationFailure::CapacityExceeded
                | RegistrationFailure::AlreadyRegistered
                | RegistrationFailure::NotRegistered => StatusCode::CONFLICT,
            },
            AppError::BadRequest(_) | AppError::PaymentNotRequired => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyPaid => StatusCode::CONFLICT,
            AppError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Conflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason sent in the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Registration(failure) => failure.code(),
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::PaymentNotRequired => "payment_not_required",
            AppError::AlreadyPaid => "already_paid",
            AppError::PaymentDeclined(_) => "payment_declined",
            AppError::PaymentGateway(_) => "payment_gateway_error",
            AppError::Conflict(_) => "conflict",
            AppError::InternalServerError(_) => "internal_error",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::VersionConflict { .. } => AppError::Conflict(err.to_string()),
            StoreError::AlreadyExists(id) => {
                AppError::Conflict(format!("Item {} already exists", id))
            }
            StoreError::Serialization(msg) | StoreError::Database(msg) => {
                AppError::InternalServerError(msg)
            }
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Declined(reason) => AppError::PaymentDeclined(reason),
            PaymentError::Gateway(msg) => AppError::PaymentGateway(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
        } else {
            info!("Request rejected with {} ({}): {}", status, self.code(), self);
        }

        let body = Json(serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
