use log::{debug, info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::api::{ApiError, RegistrationApi};
use crate::card::{AttemptId, CardError, EventCard};
use crate::session::{ClientConfig, Session};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    #[error("Event {0} has not been loaded")]
    NotLoaded(String),
    #[error(transparent)]
    Card(#[from] CardError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Owns the event cards for one signed-in user.
///
/// The card map lock is released before every request so several attempts
/// can be in flight at once.
pub struct RegistrationController<A> {
    api: A,
    session: Session,
    timeout: Duration,
    cards: Mutex<HashMap<String, EventCard>>,
    next_attempt: AtomicU64,
}

impl<A: RegistrationApi> RegistrationController<A> {
    pub fn new(api: A, session: Session, config: &ClientConfig) -> Self {
        Self {
            api,
            session,
            timeout: config.request_timeout,
            cards: Mutex::new(HashMap::new()),
            next_attempt: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        }
    }

    /// Fetch an event and create (or replace) its card.
    pub async fn load(&self, event_id: &str) -> Result<EventCard, ControllerError> {
        let details = self
            .bounded(self.api.fetch_event(&self.session, event_id))
            .await?;
        let registered = details
            .attendance
            .as_ref()
            .map_or(false, |a| a.status.is_active());

        let card = EventCard::from_summary(&details.event, registered);
        self.cards
            .lock()
            .await
            .insert(event_id.to_string(), card.clone());
        Ok(card)
    }

    pub async fn card(&self, event_id: &str) -> Option<EventCard> {
        self.cards.lock().await.get(event_id).cloned()
    }

    /// Reconcile a loaded card with the server's current summary.
    pub async fn refresh(&self, event_id: &str) -> Result<EventCard, ControllerError> {
        let details = self
            .bounded(self.api.fetch_event(&self.session, event_id))
            .await?;
        let registered = details
            .attendance
            .as_ref()
            .map_or(false, |a| a.status.is_active());

        let mut cards = self.cards.lock().await;
        let card = cards
            .get_mut(event_id)
            .ok_or_else(|| ControllerError::NotLoaded(event_id.to_string()))?;
        card.reconcile(&details.event, registered);
        Ok(card.clone())
    }

    /// Register optimistically. The card shows the seat immediately and the
    /// attempt is rolled back if the server rejects it or does not answer
    /// in time.
    pub async fn register(&self, event_id: &str) -> Result<EventCard, ControllerError> {
        let attempt = AttemptId(self.next_attempt.fetch_add(1, Ordering::Relaxed));
        {
            let mut cards = self.cards.lock().await;
            let card = cards
                .get_mut(event_id)
                .ok_or_else(|| ControllerError::NotLoaded(event_id.to_string()))?;
            card.begin_register(attempt)?;
        }
        debug!("Registering for event {} ({})", event_id, attempt);

        let result = self
            .bounded(self.api.register(&self.session, event_id))
            .await;

        let mut cards = self.cards.lock().await;
        let card = cards
            .get_mut(event_id)
            .ok_or_else(|| ControllerError::NotLoaded(event_id.to_string()))?;

        match result {
            Ok(receipt) => {
                card.confirm_register(attempt, receipt.event.attendee_count);
                info!(
                    "Registered for event {} (attendance {})",
                    event_id, receipt.attendance.id
                );
                Ok(card.clone())
            }
            Err(e) => {
                warn!("Rolling back {} for event {}: {}", attempt, event_id, e);
                card.rollback_register(attempt, e.clone());
                Err(ControllerError::Api(e))
            }
        }
    }

    /// Cancel and wait for the server before changing the count.
    pub async fn cancel(&self, event_id: &str) -> Result<EventCard, ControllerError> {
        {
            let mut cards = self.cards.lock().await;
            let card = cards
                .get_mut(event_id)
                .ok_or_else(|| ControllerError::NotLoaded(event_id.to_string()))?;
            card.begin_cancel()?;
        }

        let result = self.bounded(self.api.cancel(&self.session, event_id)).await;

        let mut cards = self.cards.lock().await;
        let card = cards
            .get_mut(event_id)
            .ok_or_else(|| ControllerError::NotLoaded(event_id.to_string()))?;

        match result {
            Ok(receipt) => {
                card.confirm_cancel();
                if receipt.refund_pending {
                    warn!("Refund for event {} is still pending", event_id);
                }
                if receipt.refund_unrecorded {
                    warn!("Refund for event {} went through but is not yet on record", event_id);
                }
                info!("Cancelled registration for event {}", event_id);
                Ok(card.clone())
            }
            Err(e) => {
                warn!("Cancellation for event {} failed: {}", event_id, e);
                card.fail_cancel(e.clone());
                Err(ControllerError::Api(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CancellationReceipt, EventDetails, RegistrationReceipt};
    use crate::card::CardState;
    use alumni_shared::models::{
        AttendanceResponse, AttendanceStatus, EventSummary, PaymentStatus, RegistrationPolicy,
    };
    use alumni_shared::registration::RegistrationFailure;
    use alumni_shared::test_utils::test_logging::init_test_logging;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::oneshot;

    type Reply<T> = oneshot::Receiver<Result<T, ApiError>>;

    /// API whose answers are released by the test through oneshot channels.
    /// Calls with no queued reply never resolve.
    struct ControlledApi {
        count: usize,
        registers: StdMutex<VecDeque<Reply<RegistrationReceipt>>>,
        cancels: StdMutex<VecDeque<Reply<CancellationReceipt>>>,
    }

    impl ControlledApi {
        fn new(count: usize) -> Self {
            Self {
                count,
                registers: StdMutex::new(VecDeque::new()),
                cancels: StdMutex::new(VecDeque::new()),
            }
        }

        fn queue_register(&self) -> oneshot::Sender<Result<RegistrationReceipt, ApiError>> {
            let (tx, rx) = oneshot::channel();
            self.registers.lock().unwrap().push_back(rx);
            tx
        }

        fn queue_cancel(&self) -> oneshot::Sender<Result<CancellationReceipt, ApiError>> {
            let (tx, rx) = oneshot::channel();
            self.cancels.lock().unwrap().push_back(rx);
            tx
        }
    }

    async fn wait<T>(reply: Option<Reply<T>>) -> Result<T, ApiError> {
        match reply {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ApiError::Transport("dropped".to_string()))),
            None => std::future::pending().await,
        }
    }

    #[async_trait]
    impl RegistrationApi for ControlledApi {
        async fn fetch_event(&self, _: &Session, _: &str) -> Result<EventDetails, ApiError> {
            Ok(EventDetails {
                event: summary(self.count),
                attendance: None,
            })
        }

        async fn register(&self, _: &Session, _: &str) -> Result<RegistrationReceipt, ApiError> {
            let reply = self.registers.lock().unwrap().pop_front();
            wait(reply).await
        }

        async fn cancel(&self, _: &Session, _: &str) -> Result<CancellationReceipt, ApiError> {
            let reply = self.cancels.lock().unwrap().pop_front();
            wait(reply).await
        }
    }

    fn summary(count: usize) -> EventSummary {
        let starts_at = Utc::now() + chrono::Duration::days(7);
        EventSummary {
            id: "event-1".to_string(),
            title: "Alumni Mixer".to_string(),
            description: String::new(),
            location: None,
            starts_at,
            ends_at: starts_at + chrono::Duration::hours(2),
            capacity: Some(10),
            attendee_count: count,
            registration: RegistrationPolicy {
                is_required: true,
                deadline: None,
                fee: None,
            },
        }
    }

    fn attendance(status: AttendanceStatus) -> AttendanceResponse {
        AttendanceResponse {
            id: "att-1".to_string(),
            user_id: "user-a".to_string(),
            status,
            payment_status: PaymentStatus::Paid,
            registered_at: Utc::now(),
            cancelled_at: None,
            checked_in_at: None,
        }
    }

    fn receipt(count: usize) -> RegistrationReceipt {
        RegistrationReceipt {
            event: summary(count),
            attendance: attendance(AttendanceStatus::Registered),
        }
    }

    async fn controller(count: usize) -> RegistrationController<std::sync::Arc<ControlledApi>> {
        init_test_logging();
        let api = std::sync::Arc::new(ControlledApi::new(count));
        let controller = RegistrationController::new(
            api,
            Session::new("user-a", "token-a"),
            &ClientConfig::new("http://localhost"),
        );
        controller.load("event-1").await.unwrap();
        controller
    }

    #[tokio::test]
    async fn test_register_success_keeps_count() {
        let c = controller(3).await;
        let tx = c.api.queue_register();
        tx.send(Ok(receipt(4))).unwrap();

        let card = c.register("event-1").await.unwrap();

        assert_eq!(card.state(), CardState::Registered);
        assert_eq!(card.attendee_count, 4);
    }

    #[tokio::test]
    async fn test_rejected_register_restores_count() {
        let c = controller(3).await;
        let tx = c.api.queue_register();
        tx.send(Err(ApiError::Rejected {
            failure: RegistrationFailure::DeadlinePassed,
            message: "The registration deadline has passed".to_string(),
        }))
        .unwrap();

        let err = c.register("event-1").await.unwrap_err();
        assert!(matches!(err, ControllerError::Api(ApiError::Rejected { .. })));

        let card = c.card("event-1").await.unwrap();
        assert_eq!(card.state(), CardState::NotRegistered);
        assert_eq!(card.attendee_count, 3);
        assert_eq!(
            card.error_message().unwrap(),
            "Registration for this event has closed."
        );
    }

    #[tokio::test]
    async fn test_rollback_of_second_attempt_leaves_first() {
        let c = controller(3).await;
        let first = c.api.queue_register();
        let second = c.api.queue_register();

        let (a, b, ()) = tokio::join!(c.register("event-1"), c.register("event-1"), async {
            let card = c.card("event-1").await.unwrap();
            assert_eq!(card.attendee_count, 5);
            assert_eq!(card.pending.len(), 2);

            first.send(Ok(receipt(4))).unwrap();
            second
                .send(Err(ApiError::Rejected {
                    failure: RegistrationFailure::AlreadyRegistered,
                    message: "You are already registered for this event".to_string(),
                }))
                .unwrap();
        });

        assert!(a.is_ok());
        assert!(b.is_err());

        let card = c.card("event-1").await.unwrap();
        assert_eq!(card.state(), CardState::Registered);
        assert_eq!(card.attendee_count, 4);
        assert!(card.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back() {
        let c = controller(3).await;

        let err = c.register("event-1").await.unwrap_err();

        assert_eq!(err, ControllerError::Api(ApiError::Timeout));
        let card = c.card("event-1").await.unwrap();
        assert_eq!(card.state(), CardState::NotRegistered);
        assert_eq!(card.attendee_count, 3);
    }

    #[tokio::test]
    async fn test_cancel_waits_for_server() {
        let c = controller(3).await;
        c.api.queue_register().send(Ok(receipt(4))).unwrap();
        c.register("event-1").await.unwrap();

        let tx = c.api.queue_cancel();
        let (result, ()) = tokio::join!(c.cancel("event-1"), async {
            let card = c.card("event-1").await.unwrap();
            assert_eq!(card.state(), CardState::Cancelling);
            assert_eq!(card.attendee_count, 4);

            tx.send(Ok(CancellationReceipt {
                event: summary(3),
                attendance: attendance(AttendanceStatus::Cancelled),
                refund_pending: false,
                refund_unrecorded: false,
            }))
            .unwrap();
        });

        let card = result.unwrap();
        assert_eq!(card.state(), CardState::NotRegistered);
        assert_eq!(card.attendee_count, 3);
    }

    #[tokio::test]
    async fn test_failed_cancel_stays_registered() {
        let c = controller(3).await;
        c.api.queue_register().send(Ok(receipt(4))).unwrap();
        c.register("event-1").await.unwrap();

        c.api
            .queue_cancel()
            .send(Err(ApiError::Server {
                status: 500,
                message: "boom".to_string(),
            }))
            .unwrap();

        assert!(c.cancel("event-1").await.is_err());

        let card = c.card("event-1").await.unwrap();
        assert_eq!(card.state(), CardState::Registered);
        assert_eq!(card.attendee_count, 4);
        assert!(card.last_error.is_some());
    }

    #[tokio::test]
    async fn test_unloaded_card() {
        init_test_logging();
        let c = RegistrationController::new(
            ControlledApi::new(0),
            Session::new("user-a", "token-a"),
            &ClientConfig::new("http://localhost"),
        );

        assert_eq!(
            c.register("event-9").await.unwrap_err(),
            ControllerError::NotLoaded("event-9".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_counts_server_and_in_flight() {
        let c = controller(3).await;
        let tx = c.api.queue_register();

        let (result, ()) = tokio::join!(c.register("event-1"), async {
            // fetch_event reports the count the card was loaded with
            let card = c.refresh("event-1").await.unwrap();
            assert_eq!(card.attendee_count, 4);
            assert_eq!(card.state(), CardState::Registering);
            tx.send(Ok(receipt(4))).unwrap();
        });

        assert!(result.is_ok());
    }
}
