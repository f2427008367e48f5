//! Repository port for per-user state.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::UserRecord;

/// Storage for `UserRecord`s, addressed by user id.
///
/// Implementations must make `save` a single conditional write: the record is
/// stored only if the persisted version equals `record.version` (0 meaning "no
/// row yet"), and the stored version becomes `record.version + 1`. A mismatch
/// is reported as `DomainError::ConcurrencyConflict`.
#[async_trait]
pub trait UserStateRepository: Send + Sync {
    /// Load a user's record. `Ok(None)` for a user that was never written.
    ///
    /// Unreadable rows are reported as `DomainError::SerializationError`.
    async fn load(&self, user_id: &str) -> DomainResult<Option<UserRecord>>;

    /// Conditionally write `record`, returning the new version.
    async fn save(&self, record: &UserRecord) -> DomainResult<u64>;

    /// Remove a user's record.
    async fn delete(&self, user_id: &str) -> DomainResult<()>;
}
