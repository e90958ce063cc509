//! Shared storage helper functions.
//!
//! Record preparation, ordering and pagination used by every backend so
//! that both implementations honor the same contract.

use chrono::{DateTime, SubsecRound, Utc};

use super::{Result, StorageError};
use crate::model::{ListFilter, MessageLog, MessageLogPage};
use crate::shard::validate_namespace;

/// Validate and stamp a record about to be created.
///
/// Sets the namespace (when empty) and the audit timestamps. `created_at`
/// is never earlier than the instant embedded in the UID. All timestamps are
/// cut to the persisted millisecond precision, so what `create` returns is
/// what a later read returns on every backend.
pub fn prepare_new(namespace: &str, mut log: MessageLog, now: DateTime<Utc>) -> Result<MessageLog> {
    validate_namespace(namespace)?;

    if log.namespace.is_empty() {
        log.namespace = namespace.to_string();
    } else if log.namespace != namespace {
        return Err(StorageError::NamespaceMismatch {
            expected: namespace.to_string(),
            actual: log.namespace,
        });
    }

    let created_at = truncate_millis(now).max(log.uid.timestamp());
    log.send_at = truncate_millis(log.send_at);
    log.created_at = created_at;
    log.updated_at = created_at;
    Ok(log)
}

/// Newest `created_at` first; UID breaks ties.
pub fn sort_newest_first(items: &mut [MessageLog]) {
    items.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.uid.cmp(&a.uid))
    });
}

/// Sort and slice an in-memory result set.
pub fn paginate(mut items: Vec<MessageLog>, filter: &ListFilter) -> MessageLogPage {
    sort_newest_first(&mut items);
    let total = items.len() as i64;

    let items = match filter.limit_offset() {
        Some((limit, offset)) => items
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect(),
        None => items,
    };

    MessageLogPage { items, total }
}

/// Drop sub-millisecond precision.
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Current time at persisted precision.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Persisted timestamp representation (Unix milliseconds).
pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
