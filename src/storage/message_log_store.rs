//! MessageLogStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{ListFilter, MessageLog, MessageLogPage, MessageStatus};
use crate::uid::Uid;

/// Interface for message log persistence.
///
/// Every operation takes the tenant `namespace` as its first parameter. A
/// namespace never sees records of another namespace, whatever the backend
/// stores physically.
///
/// Implementations:
/// - `SqliteMessageLogStore`: SQLite, one table per namespace per ISO week
/// - `PostgresMessageLogStore`: PostgreSQL, same layout as SQLite
/// - `FileMessageLogStore`: one JSON-lines file per day
#[async_trait]
pub trait MessageLogStore: Send + Sync {
    /// Persist a new record.
    ///
    /// Returns the stored record with `id`, `created_at` and `updated_at`
    /// populated by the backend. A record with an empty namespace is stamped
    /// with `namespace`; a different non-empty namespace is rejected.
    async fn create(&self, namespace: &str, log: MessageLog) -> Result<MessageLog>;

    /// Fetch a record by UID. Missing records (or missing shards) are
    /// `StorageError::NotFound`.
    async fn get(&self, namespace: &str, uid: Uid) -> Result<MessageLog>;

    /// Fetch a record by UID inside its own transaction, taking an exclusive
    /// row lock for the duration of the read where the backend supports one
    /// (`FOR UPDATE` on PostgreSQL).
    ///
    /// The lock is released before this returns. Callers that must act on
    /// the record exclusively go through [`update_status_if`](Self::update_status_if),
    /// which is the only claim primitive.
    async fn get_with_lock(&self, namespace: &str, uid: Uid) -> Result<MessageLog>;

    /// List records whose `send_at` falls in the filter window, newest
    /// `created_at` first.
    ///
    /// `total` counts every match when a page size was requested; otherwise it
    /// equals the number of returned items.
    async fn list(&self, namespace: &str, filter: &ListFilter) -> Result<MessageLogPage>;

    /// Move `uid` from `old` to `new` only if its current status is `old`.
    ///
    /// Returns `Ok(false)` when the record is not in `old` (someone else moved
    /// it first) or does not exist. An edge that the state machine forbids is
    /// `StorageError::InvalidTransition` regardless of the current status.
    async fn update_status_if(
        &self,
        namespace: &str,
        uid: Uid,
        old: MessageStatus,
        new: MessageStatus,
    ) -> Result<bool>;

    /// Record a delivery attempt: increment `retry_total` and replace
    /// `last_error`. Returns the updated record.
    async fn record_attempt(
        &self,
        namespace: &str,
        uid: Uid,
        last_error: Option<&str>,
    ) -> Result<MessageLog>;

    /// Claim a pending message for delivery.
    ///
    /// `false` means another worker already claimed it (or it was cancelled)
    /// and the caller must not send.
    async fn claim(&self, namespace: &str, uid: Uid) -> Result<bool> {
        self.update_status_if(namespace, uid, MessageStatus::Pending, MessageStatus::Sending)
            .await
    }
}
