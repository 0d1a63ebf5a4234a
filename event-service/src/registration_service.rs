//! Server-authoritative registration and cancellation.
//!
//! Every mutation follows the same protocol: read the event document, apply
//! the rule in memory, write it back conditioned on the version that was
//! read. A lost race re-reads and re-validates, so the capacity check for the
//! last open seat is serializable without application-level locks.

use alumni_shared::error::StoreError;
use alumni_shared::models::{AttendanceRecord, AttendanceStatus, Event, PaymentStatus};
use alumni_shared::registration::RegistrationFailure;
use alumni_shared::store::EventStore;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::payment::{ChargeRequest, PaymentGateway};

pub struct RegistrationService<'a, S> {
    store: &'a S,
    payments: &'a dyn PaymentGateway,
    max_attempts: u32,
}

/// Outcome of a committed change: the stored event and the affected record.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub event: Event,
    pub record: AttendanceRecord,
    /// A refund is owed but the gateway call failed.
    pub refund_pending: bool,
    /// The gateway refunded the charge but the record could not be marked
    /// `refunded`.
    pub refund_unrecorded: bool,
}

fn record_by_id<'e>(event: &'e mut Event, record_id: &str) -> Result<&'e mut AttendanceRecord> {
    event
        .attendees
        .iter_mut()
        .find(|a| a.id == record_id)
        .ok_or(AppError::Registration(RegistrationFailure::NotRegistered))
}

impl<'a, S> RegistrationService<'a, S>
where
    S: EventStore,
{
    pub fn new(store: &'a S, payments: &'a dyn PaymentGateway, max_attempts: u32) -> Self {
        Self {
            store,
            payments,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn load(&self, event_id: &str) -> Result<Event> {
        match self.store.get_event(event_id).await {
            Ok(event) => Ok(event),
            Err(StoreError::NotFound(_)) => Err(RegistrationFailure::EventNotFound.into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Applies `change` to a fresh copy of the event and commits it with a
    /// version-conditioned write, retrying on conflicts.
    async fn commit<T, F>(&self, event_id: &str, mut change: F) -> Result<(Event, T)>
    where
        F: FnMut(&mut Event, DateTime<Utc>) -> Result<T> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_attempts {
            let mut event = self.load(event_id).await?;
            let value = change(&mut event, Utc::now())?;

            match self.store.update_event(event).await {
                Ok(saved) => return Ok((saved, value)),
                Err(StoreError::VersionConflict { expected, .. }) => {
                    debug!(
                        "Version conflict on event {} at version {} (attempt {}/{})",
                        event_id, expected, attempt, self.max_attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            "Giving up on event {} after {} conflicting writes",
            event_id, self.max_attempts
        );
        Err(AppError::Conflict(format!(
            "Event {} is busy, please try again",
            event_id
        )))
    }

    pub async fn register(&self, event_id: &str, user_id: &str) -> Result<Outcome> {
        let (event, record) = self
            .commit(event_id, |event, now| Ok(event.register(user_id, now)?.clone()))
            .await?;

        info!(
            "User {} registered for event {} ({} of {:?})",
            user_id,
            event_id,
            event.active_count(),
            event.capacity
        );

        Ok(Outcome {
            event,
            record,
            refund_pending: false,
            refund_unrecorded: false,
        })
    }

    pub async fn cancel(&self, event_id: &str, user_id: &str) -> Result<Outcome> {
        let (event, record) = self
            .commit(event_id, |event, now| Ok(event.cancel(user_id, now)?))
            .await?;

        info!("User {} cancelled registration for event {}", user_id, event_id);

        self.refund_if_paid(event, record).await
    }

    /// Charges the event fee for the caller's active registration.
    pub async fn pay(&self, event_id: &str, user_id: &str, payment_token: &str) -> Result<Outcome> {
        let event = self.load(event_id).await?;
        let record = event
            .active_record(user_id)
            .cloned()
            .ok_or(RegistrationFailure::NotRegistered)?;

        let fee = match &event.registration.fee {
            Some(fee) if !fee.is_free() => fee.clone(),
            _ => return Err(AppError::PaymentNotRequired),
        };

        if record.payment_status != PaymentStatus::Pending {
            return Err(AppError::AlreadyPaid);
        }

        let charge = self
            .payments
            .charge(&ChargeRequest {
                idempotency_key: record.id.clone(),
                amount: fee.amount,
                currency: fee.currency.clone(),
                payment_token: payment_token.to_string(),
                description: event.title.clone(),
            })
            .await?;

        let (event, record) = self
            .commit(event_id, |event, _| {
                let stored = record_by_id(event, &record.id)?;
                stored.payment_status = PaymentStatus::Paid;
                stored.payment_reference = Some(charge.reference.clone());
                Ok(stored.clone())
            })
            .await?;

        info!("User {} paid for event {}", user_id, event_id);

        if record.status == AttendanceStatus::Cancelled {
            warn!(
                "Registration {} was cancelled while its payment was in flight, refunding",
                record.id
            );
            return self.refund_if_paid(event, record).await;
        }

        Ok(Outcome {
            event,
            record,
            refund_pending: false,
            refund_unrecorded: false,
        })
    }

    /// Organizer-only: marks the user's registration as attended.
    pub async fn check_in(
        &self,
        event_id: &str,
        organizer_id: &str,
        user_id: &str,
    ) -> Result<Outcome> {
        let (event, record) = self
            .commit(event_id, |event, now| {
                if event.organizer_id != organizer_id {
                    return Err(AppError::forbidden(
                        "Only the organizer can check in attendees".into(),
                    ));
                }
                Ok(event.check_in(user_id, now)?)
            })
            .await?;

        info!("User {} checked in to event {}", user_id, event_id);

        Ok(Outcome {
            event,
            record,
            refund_pending: false,
            refund_unrecorded: false,
        })
    }

    async fn refund_if_paid(&self, event: Event, record: AttendanceRecord) -> Result<Outcome> {
        let owed = match (&record.payment_reference, &event.registration.fee) {
            (Some(reference), Some(fee)) if record.payment_status == PaymentStatus::Paid => {
                Some((reference.clone(), fee.clone()))
            }
            _ => None,
        };

        let Some((reference, fee)) = owed else {
            return Ok(Outcome {
                event,
                record,
                refund_pending: false,
                refund_unrecorded: false,
            });
        };

        if let Err(e) = self.payments.refund(&reference, &fee).await {
            error!(
                "Refund for registration {} (charge {}) failed: {}",
                record.id, reference, e
            );
            return Ok(Outcome {
                event,
                record,
                refund_pending: true,
                refund_unrecorded: false,
            });
        }

        // The cancellation is already committed, so from here on the caller
        // always gets the cancelled record back.
        let recorded = self
            .commit(&event.id, |event, _| {
                let stored = record_by_id(event, &record.id)?;
                stored.payment_status = PaymentStatus::Refunded;
                Ok(stored.clone())
            })
            .await;

        match recorded {
            Ok((event, record)) => Ok(Outcome {
                event,
                record,
                refund_pending: false,
                refund_unrecorded: false,
            }),
            Err(e) => {
                error!(
                    "Charge {} for registration {} was refunded but not recorded: {}",
                    reference, record.id, e
                );
                Ok(Outcome {
                    event,
                    record,
                    refund_pending: false,
                    refund_unrecorded: true,
                })
            }
        }
    }
}
