use axum::{
    extract::Request,
    middleware,
    routing::{get, post, put},
    Router,
};
use log::{info, warn};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::handlers::{
    event_handlers::{check_in_attendee, create_event, get_event, list_attendees, list_events},
    registration_handlers::{cancel_registration, pay_registration, register_for_event},
    user_handlers::register_push_token,
};
use crate::payment::HttpPaymentGateway;
use crate::state::AppState;
use alumni_shared::auth::auth_middleware;
use alumni_shared::store::dynamo::{DynamoEventStore, DynamoPushTokenStore};
use alumni_shared::store::EventStore;

/// Creates a router backed by DynamoDB and the HTTP payment gateway
pub async fn create_router(config: Config) -> Result<Router, crate::payment::PaymentError> {
    info!("Creating router with DynamoDB stores");

    let payments = HttpPaymentGateway::new(
        config.payment_gateway_url.clone(),
        config.payment_gateway_api_key.clone(),
        config.payment_timeout,
    )?;

    let prefix = config.route_prefix.clone();
    let state = AppState {
        store: Arc::new(DynamoEventStore::new().await),
        push_tokens: Arc::new(DynamoPushTokenStore::new().await),
        payments: Arc::new(payments),
        config: Arc::new(config),
    };

    Ok(create_router_with_state(state, &prefix))
}

/// Creates a router with a given state
pub fn create_router_with_state<S>(state: AppState<S>, prefix: &str) -> Router
where
    S: EventStore + 'static,
{
    info!("Setting up API routes with prefix: '{}'", prefix);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Logging middleware to trace all requests
    async fn logging_middleware(
        req: Request,
        next: axum::middleware::Next,
    ) -> impl axum::response::IntoResponse {
        info!(
            "Router received request: method={}, uri={}",
            req.method(),
            req.uri()
        );
        next.run(req).await
    }

    let api_routes = Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/:id", get(get_event))
        .route(
            "/events/:id/register",
            post(register_for_event).delete(cancel_registration),
        )
        .route("/events/:id/register/payment", post(pay_registration))
        .route("/events/:id/attendees", get(list_attendees))
        .route(
            "/events/:id/attendees/:user_id/check-in",
            post(check_in_attendee),
        )
        .route("/users/push-token", put(register_push_token))
        .layer(middleware::from_fn(auth_middleware))
        .with_state(state);

    let router = if prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(prefix, api_routes)
    };

    router
        .layer(cors)
        .layer(middleware::from_fn(logging_middleware))
        .fallback(|req: Request| async move {
            warn!("No route matched for: {} {}", req.method(), req.uri());
            (
                axum::http::StatusCode::NOT_FOUND,
                axum::Json(serde_json::json!({
                    "error": "not_found",
                    "message": "The requested resource was not found"
                })),
            )
        })
}
