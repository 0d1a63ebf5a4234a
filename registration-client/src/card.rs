use alumni_shared::models::EventSummary;
use std::fmt;
use thiserror::Error;

use crate::api::ApiError;

/// Identifies one optimistic registration issued from a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    NotRegistered,
    Registering,
    Registered,
    Cancelling,
}

/// Transitions the card refuses locally, before any request is made.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardError {
    #[error("Already registered for this event")]
    AlreadyRegistered,
    #[error("Not registered for this event")]
    NotRegistered,
    #[error("A registration is still in flight")]
    RegistrationInFlight,
    #[error("A cancellation is still in flight")]
    CancellationInFlight,
}

/// View state of one event card.
///
/// `attendee_count` is a display cache: the last server count plus one for
/// every optimistic attempt still in `pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventCard {
    pub event_id: String,
    pub title: String,
    pub capacity: Option<u32>,
    pub attendee_count: usize,
    pub registered: bool,
    pub pending: Vec<AttemptId>,
    pub cancelling: bool,
    pub last_error: Option<ApiError>,
}

impl EventCard {
    pub fn from_summary(summary: &EventSummary, registered: bool) -> Self {
        Self {
            event_id: summary.id.clone(),
            title: summary.title.clone(),
            capacity: summary.capacity,
            attendee_count: summary.attendee_count,
            registered,
            pending: Vec::new(),
            cancelling: false,
            last_error: None,
        }
    }

    pub fn state(&self) -> CardState {
        if self.cancelling {
            CardState::Cancelling
        } else if self.registered {
            CardState::Registered
        } else if !self.pending.is_empty() {
            CardState::Registering
        } else {
            CardState::NotRegistered
        }
    }

    /// Message for the most recent failure, if any.
    pub fn error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(ApiError::user_message)
    }

    pub fn begin_register(&mut self, attempt: AttemptId) -> Result<(), CardError> {
        if self.cancelling {
            return Err(CardError::CancellationInFlight);
        }
        if self.registered {
            return Err(CardError::AlreadyRegistered);
        }

        self.pending.push(attempt);
        self.attendee_count += 1;
        self.last_error = None;
        Ok(())
    }

    /// The attempt's seat is now the server's. `server_count` is the count
    /// from the confirmation, which already includes that seat. Returns false
    /// if the attempt was already resolved.
    pub fn confirm_register(&mut self, attempt: AttemptId, server_count: usize) -> bool {
        if !self.take_attempt(attempt) {
            return false;
        }
        self.registered = true;
        self.attendee_count = server_count + self.pending.len();
        true
    }

    /// Undo exactly one attempt. Unknown attempts are ignored.
    pub fn rollback_register(&mut self, attempt: AttemptId, error: ApiError) -> bool {
        if !self.take_attempt(attempt) {
            return false;
        }
        self.attendee_count = self.attendee_count.saturating_sub(1);
        self.last_error = Some(error);
        true
    }

    pub fn begin_cancel(&mut self) -> Result<(), CardError> {
        if self.cancelling {
            return Err(CardError::CancellationInFlight);
        }
        if !self.pending.is_empty() {
            return Err(CardError::RegistrationInFlight);
        }
        if !self.registered {
            return Err(CardError::NotRegistered);
        }

        self.cancelling = true;
        self.last_error = None;
        Ok(())
    }

    pub fn confirm_cancel(&mut self) {
        if !self.cancelling {
            return;
        }
        self.cancelling = false;
        self.registered = false;
        self.attendee_count = self.attendee_count.saturating_sub(1);
    }

    pub fn fail_cancel(&mut self, error: ApiError) {
        self.cancelling = false;
        self.last_error = Some(error);
    }

    /// Replace cached values with an authoritative summary, keeping in-flight
    /// attempts counted.
    pub fn reconcile(&mut self, summary: &EventSummary, registered: bool) {
        self.title = summary.title.clone();
        self.capacity = summary.capacity;
        self.attendee_count = summary.attendee_count + self.pending.len();
        if !self.cancelling {
            self.registered = registered;
        }
    }

    fn take_attempt(&mut self, attempt: AttemptId) -> bool {
        match self.pending.iter().position(|a| *a == attempt) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }
}
