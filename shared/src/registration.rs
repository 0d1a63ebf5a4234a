//! Registration rules for a single event document.
//!
//! These functions only mutate the in-memory [`Event`]. Callers are
//! responsible for persisting the result with a version-conditioned write so
//! the capacity check stays serializable across concurrent requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AttendanceRecord, AttendanceStatus, Event, PaymentStatus};

/// Business-rule failures. The serialized form is the machine-readable
/// reason code sent to clients.
#[derive(Error, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationFailure {
    #[error("Event not found")]
    EventNotFound,
    #[error("This event does not take registrations")]
    RegistrationNotRequired,
    #[error("The registration deadline has passed")]
    DeadlinePassed,
    #[error("This event is full")]
    CapacityExceeded,
    #[error("You are already registered for this event")]
    AlreadyRegistered,
    #[error("You are not registered for this event")]
    NotRegistered,
}

impl RegistrationFailure {
    pub fn code(self) -> &'static str {
        match self {
            RegistrationFailure::EventNotFound => "event_not_found",
            RegistrationFailure::RegistrationNotRequired => "registration_not_required",
            RegistrationFailure::DeadlinePassed => "deadline_passed",
            RegistrationFailure::CapacityExceeded => "capacity_exceeded",
            RegistrationFailure::AlreadyRegistered => "already_registered",
            RegistrationFailure::NotRegistered => "not_registered",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "event_not_found" => Some(RegistrationFailure::EventNotFound),
            "registration_not_required" => Some(RegistrationFailure::RegistrationNotRequired),
            "deadline_passed" => Some(RegistrationFailure::DeadlinePassed),
            "capacity_exceeded" => Some(RegistrationFailure::CapacityExceeded),
            "already_registered" => Some(RegistrationFailure::AlreadyRegistered),
            "not_registered" => Some(RegistrationFailure::NotRegistered),
            _ => None,
        }
    }
}

impl Event {
    /// Number of records currently holding a seat.
    pub fn active_count(&self) -> usize {
        self.attendees.iter().filter(|a| a.status.is_active()).count()
    }

    pub fn active_record(&self, user_id: &str) -> Option<&AttendanceRecord> {
        self.attendees
            .iter()
            .find(|a| a.user_id == user_id && a.status.is_active())
    }

    pub fn is_full(&self) -> bool {
        self.capacity
            .map_or(false, |capacity| self.active_count() >= capacity as usize)
    }

    /// Runs the registration preconditions in order. The existence check is
    /// the caller's, since it needs the store.
    pub fn check_registration(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RegistrationFailure> {
        if !self.registration.is_required {
            return Err(RegistrationFailure::RegistrationNotRequired);
        }

        if let Some(deadline) = self.registration.deadline {
            if now > deadline {
                return Err(RegistrationFailure::DeadlinePassed);
            }
        }

        if self.is_full() {
            return Err(RegistrationFailure::CapacityExceeded);
        }

        if self.active_record(user_id).is_some() {
            return Err(RegistrationFailure::AlreadyRegistered);
        }

        Ok(())
    }

    /// Appends a new registered record for `user_id`. Earlier cancelled
    /// records for the same user stay in the list as history.
    pub fn register(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<&AttendanceRecord, RegistrationFailure> {
        self.check_registration(user_id, now)?;

        let payment_status = if self.registration.is_free() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Pending
        };

        self.attendees.push(AttendanceRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            status: AttendanceStatus::Registered,
            payment_status,
            registered_at: now,
            cancelled_at: None,
            checked_in_at: None,
            payment_reference: None,
        });
        self.updated_at = now;

        let index = self.attendees.len() - 1;
        Ok(&self.attendees[index])
    }

    /// Marks the user's registered record as cancelled and returns a copy of it.
    pub fn cancel(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, RegistrationFailure> {
        let record = self
            .attendees
            .iter_mut()
            .find(|a| a.user_id == user_id && a.status == AttendanceStatus::Registered)
            .ok_or(RegistrationFailure::NotRegistered)?;

        record.status = AttendanceStatus::Cancelled;
        record.cancelled_at = Some(now);
        let cancelled = record.clone();
        self.updated_at = now;

        Ok(cancelled)
    }

    /// Marks the user's registered record as attended.
    pub fn check_in(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AttendanceRecord, RegistrationFailure> {
        let record = self
            .attendees
            .iter_mut()
            .find(|a| a.user_id == user_id && a.status == AttendanceStatus::Registered)
            .ok_or(RegistrationFailure::NotRegistered)?;

        record.status = AttendanceStatus::Attended;
        record.checked_in_at = Some(now);
        let attended = record.clone();
        self.updated_at = now;

        Ok(attended)
    }
}
