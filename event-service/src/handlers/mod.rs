pub mod event_handlers;
pub mod registration_handlers;
pub mod user_handlers;
