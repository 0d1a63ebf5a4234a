use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;
use log::debug;
use std::env;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Tests run against DynamoDB Local only when `USE_DYNAMODB=true`.
pub fn use_dynamodb() -> bool {
    env::var("USE_DYNAMODB")
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

pub async fn create_dynamo_client() -> Client {
    let endpoint =
        env::var("DYNAMODB_ENDPOINT").unwrap_or_else(|_| "http://localhost:8000".to_string());
    debug!("Connecting to DynamoDB Local at {}", endpoint);

    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("test", "test", None, None, "test"))
        .endpoint_url(endpoint)
        .load()
        .await;

    Client::new(&config)
}

async fn create_table_with_key(client: &Client, table_name: &str, key: &str) -> Result<(), BoxError> {
    client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(key)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(key)
                .key_type(KeyType::Hash)
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await
        .map_err(|e| -> BoxError { format!("{:?}", e.into_service_error()).into() })?;

    Ok(())
}

pub async fn create_events_table(client: &Client, table_name: &str) -> Result<(), BoxError> {
    create_table_with_key(client, table_name, "id").await
}

pub async fn create_push_tokens_table(client: &Client, table_name: &str) -> Result<(), BoxError> {
    create_table_with_key(client, table_name, "user_id").await
}

/// Deletes every item in a table keyed by `id`.
pub async fn clear_dynamo_table(client: &Client, table_name: &str) -> Result<(), BoxError> {
    let output = client
        .scan()
        .table_name(table_name)
        .send()
        .await
        .map_err(|e| -> BoxError { format!("{:?}", e.into_service_error()).into() })?;

    for item in output.items.unwrap_or_default() {
        if let Some(AttributeValue::S(id)) = item.get("id") {
            client
                .delete_item()
                .table_name(table_name)
                .key("id", AttributeValue::S(id.clone()))
                .send()
                .await
                .map_err(|e| -> BoxError { format!("{:?}", e.into_service_error()).into() })?;
        }
    }

    Ok(())
}
