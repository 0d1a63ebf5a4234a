use serde::{Deserialize, Serialize};

pub const REGISTRATION_CONFIRMED: &str = "registration_confirmed";
pub const REGISTRATION_CANCELLED: &str = "registration_cancelled";

/// SNS message published whenever a registration commits or is cancelled
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RegistrationEvent {
    pub event_type: String,
    pub event_id: String,
    pub event_title: String,
    pub user_id: String,
    pub attendance_id: String,
    pub starts_at: String,
    pub timestamp: String,
}
