use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Event, PushToken};

pub mod dynamo;

/// Persistence for event documents.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get_event(&self, id: &str) -> Result<Event>;

    /// Fails with `AlreadyExists` if an event with the same id is stored.
    async fn create_event(&self, event: Event) -> Result<Event>;

    async fn list_events(&self) -> Result<Vec<Event>>;

    /// Writes `event` only if the stored document still has `event.version`.
    /// Returns the written document with its version incremented, or
    /// `StoreError::VersionConflict` when another writer got there first.
    async fn update_event(&self, event: Event) -> Result<Event>;
}

#[async_trait]
pub trait PushTokenStore: Send + Sync {
    async fn save_push_token(&self, token: PushToken) -> Result<()>;

    /// Users without a registered token are skipped.
    async fn get_push_tokens(&self, user_ids: &[String]) -> Result<Vec<PushToken>>;
}
