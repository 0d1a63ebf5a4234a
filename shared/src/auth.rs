use axum::{
    body::Body,
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Secret used to sign tokens in tests. Never used for verification.
const TEST_SIGNING_SECRET: &[u8] = b"alumni-test-signing-secret";

/// Verification key, present only when `JWT_SECRET` is configured. Without it
/// the token was already verified by the API Gateway authorizer and only the
/// claims are read.
static DECODING_KEY: Lazy<Option<DecodingKey>> = Lazy::new(|| {
    env::var("JWT_SECRET")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|secret| DecodingKey::from_secret(secret.as_bytes()))
});

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,
    #[error("Authorization header must use the Bearer scheme")]
    InvalidScheme,
    #[error("Malformed token")]
    Malformed,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Token expired")]
    Expired,
}

/// Decodes the claims of a bearer token. Signature and expiry are verified
/// when `key` is given; otherwise only expiry is checked.
pub fn decode_claims(token: &str, key: Option<&DecodingKey>) -> Result<Claims, AuthError> {
    if let Some(key) = key {
        return jsonwebtoken::decode::<Claims>(token, key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            });
    }

    let payload = token.split('.').nth(1).ok_or(AuthError::Malformed)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| AuthError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)?;

    if claims.exp < Utc::now().timestamp() {
        return Err(AuthError::Expired);
    }

    Ok(claims)
}

fn bearer_token(req: &Request) -> Result<&str, AuthError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::Malformed)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidScheme)
}

/// Resolves the caller from the bearer token and stores the user id as an
/// `Extension<String>` for the handlers.
pub async fn auth_middleware(mut req: Request, next: Next) -> Response {
    let claims = match bearer_token(&req).and_then(|t| decode_claims(t, DECODING_KEY.as_ref())) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Rejecting request to {}: {}", req.uri(), e);
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "unauthorized",
                    "message": e.to_string()
                })),
            )
                .into_response();
        }
    };

    debug!("Authenticated user {}", claims.sub);
    req.extensions_mut().insert(claims.sub);
    next.run(req).await
}

/// Signs a token for `user_id` valid for one hour.
pub fn create_test_token(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: Utc::now().timestamp() + 3600,
        name: None,
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SIGNING_SECRET),
    )
    .unwrap_or_default()
}

/// Builds an authenticated JSON request for router tests.
pub fn create_test_request(
    method: &str,
    path: &str,
    user_id: &str,
    body: Option<serde_json::Value>,
) -> Request {
    let builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", create_test_token(user_id)))
        .header(header::CONTENT_TYPE, "application/json");

    let body = match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    };

    builder.body(body).unwrap_or_else(|_| Request::new(Body::empty()))
}
