use alumni_shared::store::{EventStore, PushTokenStore};
use std::sync::Arc;

use crate::config::Config;
use crate::payment::PaymentGateway;
use crate::registration_service::RegistrationService;

/// Shared handler state. The event store is generic so tests can swap in
/// the in-memory store without boxing.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub push_tokens: Arc<dyn PushTokenStore>,
    pub payments: Arc<dyn PaymentGateway>,
    pub config: Arc<Config>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            push_tokens: self.push_tokens.clone(),
            payments: self.payments.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> AppState<S>
where
    S: EventStore,
{
    pub fn registrations(&self) -> RegistrationService<'_, S> {
        RegistrationService::new(
            &*self.store,
            &*self.payments,
            self.config.registration_max_attempts,
        )
    }
}
