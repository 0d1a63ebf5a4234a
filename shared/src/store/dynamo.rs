use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use log::{debug, info, warn};
use serde_dynamo::{from_item, to_item};
use std::collections::HashMap;
use std::env;

use super::{EventStore, PushTokenStore};
use crate::error::{Result, StoreError};
use crate::models::{Event, PushToken};

const DEFAULT_EVENTS_TABLE: &str = "alumni-events";
const DEFAULT_PUSH_TOKENS_TABLE: &str = "alumni-push-tokens";

async fn load_client() -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    Client::new(&config)
}

fn table_from_env(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| {
        warn!("{} not set, using default table '{}'", var, default);
        default.to_string()
    })
}

/// DynamoDB-backed event store. One item per event, attendee list embedded.
#[derive(Clone)]
pub struct DynamoEventStore {
    client: Client,
    table_name: String,
}

impl DynamoEventStore {
    pub async fn new() -> Self {
        let table_name = table_from_env("EVENTS_TABLE", DEFAULT_EVENTS_TABLE);
        info!("Using DynamoDB events table '{}'", table_name);
        Self::with_client_and_table(load_client().await, table_name)
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl EventStore for DynamoEventStore {
    async fn get_event(&self, id: &str) -> Result<Event> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to get event {}: {}", id, e)))?;

        let item = output
            .item
            .ok_or_else(|| StoreError::NotFound(format!("Event {} not found", id)))?;

        Ok(from_item(item)?)
    }

    async fn create_event(&self, event: Event) -> Result<Event> {
        let item: HashMap<String, AttributeValue> = to_item(&event)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    StoreError::AlreadyExists(event.id.clone())
                } else {
                    StoreError::Database(format!("Failed to create event: {}", service_error))
                }
            })?;

        debug!("Created event {}", event.id);
        Ok(event)
    }

    async fn list_events(&self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| StoreError::Database(format!("Failed to scan events: {}", e)))?;

            for item in output.items.unwrap_or_default() {
                events.push(from_item(item)?);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        debug!("Scanned {} events", events.len());
        Ok(events)
    }

    async fn update_event(&self, mut event: Event) -> Result<Event> {
        let expected = event.version;
        event.version = expected + 1;
        let item: HashMap<String, AttributeValue> = to_item(&event)?;

        // Documents written before versioning have no attribute at all.
        let condition = if expected == 0 {
            "attribute_exists(id) AND (attribute_not_exists(#version) OR #version = :expected)"
        } else {
            "attribute_exists(id) AND #version = :expected"
        };

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression(condition)
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", AttributeValue::N(expected.to_string()))
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    StoreError::VersionConflict {
                        id: event.id.clone(),
                        expected,
                    }
                } else {
                    StoreError::Database(format!(
                        "Failed to update event {}: {}",
                        event.id, service_error
                    ))
                }
            })?;

        debug!("Updated event {} to version {}", event.id, event.version);
        Ok(event)
    }
}

#[derive(Clone)]
pub struct DynamoPushTokenStore {
    client: Client,
    table_name: String,
}

impl DynamoPushTokenStore {
    pub async fn new() -> Self {
        let table_name = table_from_env("PUSH_TOKENS_TABLE", DEFAULT_PUSH_TOKENS_TABLE);
        Self::with_client_and_table(load_client().await, table_name)
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl PushTokenStore for DynamoPushTokenStore {
    async fn save_push_token(&self, token: PushToken) -> Result<()> {
        let item: HashMap<String, AttributeValue> = to_item(&token)?;

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to save push token: {}", e)))?;

        Ok(())
    }

    async fn get_push_tokens(&self, user_ids: &[String]) -> Result<Vec<PushToken>> {
        let mut tokens = Vec::with_capacity(user_ids.len());

        for user_id in user_ids {
            let output = self
                .client
                .get_item()
                .table_name(&self.table_name)
                .key("user_id", AttributeValue::S(user_id.clone()))
                .send()
                .await
                .map_err(|e| {
                    StoreError::Database(format!("Failed to get push token for {}: {}", user_id, e))
                })?;

            match output.item {
                Some(item) => tokens.push(from_item(item)?),
                None => debug!("No push token registered for user {}", user_id),
            }
        }

        Ok(tokens)
    }
}
