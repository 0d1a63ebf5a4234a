mod registration_handlers_test;

use alumni_shared::models::{Event, Fee, RegistrationPolicy};
use alumni_shared::store::dynamo::DynamoEventStore;
use alumni_shared::store::EventStore;
use alumni_shared::test_utils::dynamo_test_utils::{
    clear_dynamo_table, create_dynamo_client, create_events_table, use_dynamodb,
};
use alumni_shared::test_utils::mock_event_store::MockEventStore;
use alumni_shared::test_utils::mock_push_token_store::MockPushTokenStore;
use alumni_shared::test_utils::test_logging::init_test_logging;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::routes::create_router_with_state;
use crate::state::AppState;
use simulated_gateway::SimulatedPaymentGateway;

// Constants for DynamoDB tests
const TEST_TABLE_NAME: &str = "events-test-table";

pub enum TestStore {
    Mock(Arc<MockEventStore>),
    DynamoDB(Arc<DynamoEventStore>),
}

impl TestStore {
    pub async fn create_event(&self, event: Event) -> Event {
        match self {
            TestStore::Mock(mock) => mock.create_event(event).await.unwrap(),
            TestStore::DynamoDB(dynamo) => dynamo.create_event(event).await.unwrap(),
        }
    }

    pub async fn get_event(&self, id: &str) -> Event {
        match self {
            TestStore::Mock(mock) => mock.get_event(id).await.unwrap(),
            TestStore::DynamoDB(dynamo) => dynamo.get_event(id).await.unwrap(),
        }
    }
}

pub struct TestApp {
    pub app: Router,
    pub store: TestStore,
    pub payments: Arc<SimulatedPaymentGateway>,
}

fn build_app<S>(store: Arc<S>, payments: Arc<SimulatedPaymentGateway>) -> Router
where
    S: EventStore + 'static,
{
    let state = AppState {
        store,
        push_tokens: Arc::new(MockPushTokenStore::new()),
        payments,
        config: Arc::new(Config::local()),
    };
    create_router_with_state(state, "")
}

// Helper to set up test application with the appropriate store based on environment
pub async fn create_test_app() -> TestApp {
    init_test_logging();
    let payments = Arc::new(SimulatedPaymentGateway::new());

    if use_dynamodb() {
        info!("Using DynamoDB for event tests");
        let client = create_dynamo_client().await;

        match create_events_table(&client, TEST_TABLE_NAME).await {
            Ok(_) => info!("Test table created successfully"),
            Err(e) => {
                if !e.to_string().contains("ResourceInUseException") {
                    error!("Error creating table: {}", e);
                } else {
                    info!("Table already exists, continuing");
                }
            }
        }

        if let Err(e) = clear_dynamo_table(&client, TEST_TABLE_NAME).await {
            error!("Failed to clear table: {}", e);
        }

        let store = Arc::new(DynamoEventStore::with_client_and_table(
            client,
            TEST_TABLE_NAME.to_string(),
        ));
        let app = build_app(store.clone(), payments.clone());
        TestApp {
            app,
            store: TestStore::DynamoDB(store),
            payments,
        }
    } else {
        debug!("Using mock store for event tests");
        let store = Arc::new(MockEventStore::new());
        let app = build_app(store.clone(), payments.clone());
        TestApp {
            app,
            store: TestStore::Mock(store),
            payments,
        }
    }
}

/// An upcoming event taking free registrations, no capacity, no deadline.
pub fn test_event(organizer_id: &str) -> Event {
    let now = Utc::now();
    let starts_at = now + Duration::days(14);
    Event {
        id: Uuid::new_v4().to_string(),
        title: "Alumni Mixer".to_string(),
        description: "Drinks with the class of 2015".to_string(),
        location: Some("Main Hall".to_string()),
        organizer_id: organizer_id.to_string(),
        starts_at,
        ends_at: starts_at + Duration::hours(3),
        capacity: None,
        registration: RegistrationPolicy {
            is_required: true,
            deadline: None,
            fee: None,
        },
        attendees: vec![],
        created_at: now,
        updated_at: now,
        version: 0,
    }
}

pub fn with_capacity(mut event: Event, capacity: u32) -> Event {
    event.capacity = Some(capacity);
    event
}

pub fn with_deadline(mut event: Event, deadline: DateTime<Utc>) -> Event {
    event.registration.deadline = Some(deadline);
    event
}

pub fn with_fee(mut event: Event, amount: u64) -> Event {
    event.registration.fee = Some(Fee {
        amount,
        currency: "USD".to_string(),
    });
    event
}
