//! In-memory user state store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::UserRecord;
use crate::domain::ports::UserStateRepository;

/// Process-local `UserStateRepository` with the same versioning rules as the
/// SQLite adapter.
#[derive(Debug, Default)]
pub struct InMemoryUserStateRepository {
    records: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl UserStateRepository for InMemoryUserStateRepository {
    async fn load(&self, user_id: &str) -> DomainResult<Option<UserRecord>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn save(&self, record: &UserRecord) -> DomainResult<u64> {
        let mut records = self.records.write().await;
        let stored_version = records.get(&record.user_id).map_or(0, |r| r.version);
        if stored_version != record.version {
            return Err(DomainError::ConcurrencyConflict {
                entity: "user_state".to_string(),
                id: record.user_id.clone(),
            });
        }

        let mut stored = record.clone();
        stored.version = record.version + 1;
        let version = stored.version;
        records.insert(stored.user_id.clone(), stored);
        Ok(version)
    }

    async fn delete(&self, user_id: &str) -> DomainResult<()> {
        self.records.write().await.remove(user_id);
        Ok(())
    }
}
