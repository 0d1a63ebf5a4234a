use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::PushToken;
use crate::store::PushTokenStore;

#[derive(Default)]
pub struct MockPushTokenStore {
    tokens: Mutex<HashMap<String, PushToken>>,
}

impl MockPushTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushTokenStore for MockPushTokenStore {
    async fn save_push_token(&self, token: PushToken) -> Result<()> {
        self.tokens
            .lock()
            .await
            .insert(token.user_id.clone(), token);
        Ok(())
    }

    async fn get_push_tokens(&self, user_ids: &[String]) -> Result<Vec<PushToken>> {
        let tokens = self.tokens.lock().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| tokens.get(id).cloned())
            .collect())
    }
}
