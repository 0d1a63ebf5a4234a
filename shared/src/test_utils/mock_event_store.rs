use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::models::Event;
use crate::store::EventStore;

/// In-memory event store with the same version-conditioned write semantics
/// as the DynamoDB store.
#[derive(Default)]
pub struct MockEventStore {
    events: Mutex<HashMap<String, Event>>,
    injected_conflicts: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `update_event` fail with a version
    /// conflict, as if another writer had committed first.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn get_event(&self, id: &str) -> Result<Event> {
        let events = self.events.lock().await;
        events
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Event {} not found", id)))
    }

    async fn create_event(&self, event: Event) -> Result<Event> {
        let mut events = self.events.lock().await;
        if events.contains_key(&event.id) {
            return Err(StoreError::AlreadyExists(event.id));
        }
        events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    async fn list_events(&self) -> Result<Vec<Event>> {
        let events = self.events.lock().await;
        Ok(events.values().cloned().collect())
    }

    async fn update_event(&self, mut event: Event) -> Result<Event> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let expected = event.version;

        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::VersionConflict {
                id: event.id,
                expected,
            });
        }

        let mut events = self.events.lock().await;
        let stored = events
            .get(&event.id)
            .ok_or_else(|| StoreError::NotFound(format!("Event {} not found", event.id)))?;

        if stored.version != expected {
            return Err(StoreError::VersionConflict {
                id: event.id,
                expected,
            });
        }

        event.version = expected + 1;
        events.insert(event.id.clone(), event.clone());
        Ok(event)
    }
}
