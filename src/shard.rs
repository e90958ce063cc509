//! Shard naming.
//!
//! Pure functions mapping `(namespace, instant)` to physical partitions:
//! - SQL backends: one table per namespace per ISO week,
//!   `messagelogs__{namespace}__{MondayYYYYMMDD}`.
//! - File backend: one file per calendar day shared by all namespaces,
//!   `message_{YYYYMMDD}.log`.
//!
//! All calendar arithmetic is done in UTC.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};

use crate::storage::{Result, StorageError};

/// Prefix of every SQL shard table.
pub const DB_SHARD_PREFIX: &str = "messagelogs";
/// Prefix of every day file.
pub const FILE_SHARD_PREFIX: &str = "message_";
/// Extension of every day file.
pub const FILE_SHARD_EXTENSION: &str = ".log";

/// Longest namespace accepted. Keeps shard table names within the 63 byte
/// identifier limit of PostgreSQL.
pub const MAX_NAMESPACE_LEN: usize = 30;

const DATE_FORMAT: &str = "%Y%m%d";

/// Check that a namespace is safe to embed in a table name.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let valid = !namespace.is_empty()
        && namespace.len() <= MAX_NAMESPACE_LEN
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidNamespace(namespace.to_string()))
    }
}

/// Monday on or before the given instant.
pub fn week_start(at: DateTime<Utc>) -> NaiveDate {
    let date = at.date_naive();
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

/// SQL shard table for a namespace and instant.
pub fn db_shard_name(namespace: &str, at: DateTime<Utc>) -> String {
    db_shard_name_for_week(namespace, week_start(at))
}

fn db_shard_name_for_week(namespace: &str, monday: NaiveDate) -> String {
    format!(
        "{}__{}__{}",
        DB_SHARD_PREFIX,
        namespace,
        monday.format(DATE_FORMAT)
    )
}

/// Day file name for an instant.
pub fn file_shard_name(at: DateTime<Utc>) -> String {
    file_shard_name_for_day(at.date_naive())
}

pub fn file_shard_name_for_day(day: NaiveDate) -> String {
    format!(
        "{}{}{}",
        FILE_SHARD_PREFIX,
        day.format(DATE_FORMAT),
        FILE_SHARD_EXTENSION
    )
}

/// Recover the day from a day file name; `None` for anything else.
pub fn parse_file_shard(name: &str) -> Option<NaiveDate> {
    let digits = name
        .strip_prefix(FILE_SHARD_PREFIX)?
        .strip_suffix(FILE_SHARD_EXTENSION)?;
    if digits.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(digits, DATE_FORMAT).ok()
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// SQL shard tables whose week intersects `[start, end)`, oldest first.
pub fn db_shards_in_range(
    namespace: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<String> {
    let mut shards = Vec::new();
    if end <= start {
        return shards;
    }
    let mut monday = week_start(start);
    while start_of(monday) < end {
        shards.push(db_shard_name_for_week(namespace, monday));
        match monday.checked_add_days(Days::new(7)) {
            Some(next) => monday = next,
            None => break,
        }
    }
    shards
}

/// SQL shard tables to probe for a UID created at `created`, in probe order.
///
/// Its own week first, then the week before (a `send_at` taken just before
/// the UID was minted can fall on the other side of Monday midnight), then
/// the following `horizon_weeks` weeks for sends scheduled later.
pub fn db_shards_for_lookup(
    namespace: &str,
    created: DateTime<Utc>,
    horizon_weeks: u32,
) -> Vec<String> {
    let mut monday = week_start(created);
    let mut shards = vec![db_shard_name_for_week(namespace, monday)];
    if let Some(previous) = monday.checked_sub_days(Days::new(7)) {
        shards.push(db_shard_name_for_week(namespace, previous));
    }
    for _ in 0..horizon_weeks {
        match monday.checked_add_days(Days::new(7)) {
            Some(next) => {
                monday = next;
                shards.push(db_shard_name_for_week(namespace, monday));
            }
            None => break,
        }
    }
    shards
}

/// Days (and their file names) intersecting `[start, end)`, oldest first.
pub fn file_shards_in_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(NaiveDate, String)> {
    let mut shards = Vec::new();
    if end <= start {
        return shards;
    }
    let mut day = start.date_naive();
    while start_of(day) < end {
        shards.push((day, file_shard_name_for_day(day)));
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    shards
}
