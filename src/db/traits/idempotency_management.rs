use chrono::Duration;

use crate::{db::traits::StorageError, db_types::IdempotencyRecord};

/// The (scope, key) -> cached-response store backing idempotent endpoints. Within a scope, the
/// first committed write for a key wins; every later write observes the stored record unchanged.
#[allow(async_fn_in_trait)]
pub trait IdempotencyManagement {
    /// Fetches the record for (scope, key), ignoring expired entries.
    async fn idempotency_get(&self, scope: &str, key: &str) -> Result<Option<IdempotencyRecord>, StorageError>;

    /// Inserts the record if no live record exists for (scope, key). The insert is the atomic
    /// commit point: under a race, exactly one caller's response is stored, and everyone gets the
    /// stored record back.
    async fn idempotency_save_if_absent(
        &self,
        scope: &str,
        key: &str,
        fingerprint: &str,
        response: &str,
        ttl: Duration,
    ) -> Result<IdempotencyRecord, StorageError>;

    /// Garbage-collects expired records. Returns the number of rows removed.
    async fn idempotency_cleanup_expired(&self) -> Result<u64, StorageError>;
}
