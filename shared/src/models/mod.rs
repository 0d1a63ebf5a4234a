use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod events;

pub use events::RegistrationEvent;

/// Current time as an RFC 3339 string.
pub fn now_str() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Registered,
    Attended,
    Cancelled,
}

impl AttendanceStatus {
    /// Registered and checked-in records both hold a seat.
    pub fn is_active(self) -> bool {
        matches!(self, AttendanceStatus::Registered | AttendanceStatus::Attended)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Registered => write!(f, "registered"),
            AttendanceStatus::Attended => write!(f, "attended"),
            AttendanceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// Registration fee in minor currency units.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Fee {
    pub amount: u64,
    pub currency: String,
}

impl Fee {
    pub fn is_free(&self) -> bool {
        self.amount == 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPolicy {
    pub is_required: bool,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fee: Option<Fee>,
}

impl RegistrationPolicy {
    pub fn is_free(&self) -> bool {
        self.fee.as_ref().map_or(true, Fee::is_free)
    }
}

/// One user's registration state for one event. Records are never removed
/// from an event; cancelling only changes the status.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: String,
    pub status: AttendanceStatus,
    pub payment_status: PaymentStatus,
    pub registered_at: DateTime<Utc>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checked_in_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Event document as stored in the events table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    pub organizer_id: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub capacity: Option<u32>,
    pub registration: RegistrationPolicy,
    #[serde(default)]
    pub attendees: Vec<AttendanceRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// Public view of an event. `attendee_count` is always derived from the
/// attendee list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub capacity: Option<u32>,
    pub attendee_count: usize,
    pub registration: RegistrationPolicy,
}

impl From<&Event> for EventSummary {
    fn from(event: &Event) -> Self {
        EventSummary {
            id: event.id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            capacity: event.capacity,
            attendee_count: event.active_count(),
            registration: event.registration.clone(),
        }
    }
}

/// Attendance record as returned over the API.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceResponse {
    pub id: String,
    pub user_id: String,
    pub status: AttendanceStatus,
    pub payment_status: PaymentStatus,
    pub registered_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl From<&AttendanceRecord> for AttendanceResponse {
    fn from(record: &AttendanceRecord) -> Self {
        AttendanceResponse {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            status: record.status,
            payment_status: record.payment_status,
            registered_at: record.registered_at,
            cancelled_at: record.cancelled_at,
            checked_in_at: record.checked_in_at,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PushToken {
    pub user_id: String,
    pub push_token: String,
    pub platform: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageResponse {
    pub message: String,
}
