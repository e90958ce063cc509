//! Flat-file message log storage.
//!
//! Stores records as JSON lines in one file per calendar day of `send_at`,
//! shared by all namespaces:
//! ```text
//! {dir}/
//!   message_20240108.log
//!   message_20240109.log
//! ```
//!
//! A UID → (day, line) index is rebuilt at startup, newest day first, and
//! maintained on every write. Updates rewrite the whole day file into a
//! temporary sibling and rename it over the original.
//!
//! Only one process may use a directory at a time.

mod index;

pub use index::{Location, LocationIndex};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::helpers::{now_millis, paginate, prepare_new};
use super::{MessageLogStore, Result, StorageError};
use crate::codec::{decode_line, encode_line, peek_keys};
use crate::config::ShardingConfig;
use crate::model::{validate_transition, ListFilter, MessageLog, MessageLogPage, MessageStatus};
use crate::shard::{file_shard_name_for_day, file_shards_in_range, parse_file_shard, validate_namespace};
use crate::uid::Uid;

/// File-backed implementation of [`MessageLogStore`].
pub struct FileMessageLogStore {
    dir: PathBuf,
    sharding: ShardingConfig,
    index: LocationIndex,
    /// Write guard for appends and rewrites; read guard for lookups and
    /// scans, so no reader sees a file mid-rewrite.
    lock: RwLock<()>,
}

impl FileMessageLogStore {
    /// Open (creating if needed) a log directory and index its day files.
    ///
    /// Failing to enumerate or read the directory is fatal; malformed lines
    /// are skipped.
    pub async fn open(dir: impl AsRef<Path>, sharding: ShardingConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let store = Self {
            dir,
            sharding,
            index: LocationIndex::new(),
            lock: RwLock::new(()),
        };
        store.rebuild_index().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for_day(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(file_shard_name_for_day(day))
    }

    async fn rebuild_index(&self) -> Result<()> {
        let mut days = Vec::new();
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?
        {
            if let Some(day) = entry.file_name().to_str().and_then(parse_file_shard) {
                days.push(day);
            }
        }
        days.sort_unstable_by(|a, b| b.cmp(a));

        for &day in &days {
            let path = self.path_for_day(day);
            let lines = read_lines(&path).await?.unwrap_or_default();
            for (i, line) in lines.iter().enumerate() {
                match peek_keys(line) {
                    Ok(keys) => {
                        self.index.observe(keys.uid, Location::new(day, i + 1));
                        self.index.observe_id(day, keys.id);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), line = i + 1, error = %e, "Skipping malformed record")
                    }
                }
            }
        }

        info!(
            dir = %self.dir.display(),
            files = days.len(),
            records = self.index.len(),
            "Indexed message log files"
        );
        Ok(())
    }

    /// Read the record for `uid` at `location` together with all lines of
    /// its file.
    ///
    /// `None` when the file or line is gone, the line holds another record,
    /// or the record belongs to another namespace.
    async fn read_record(
        &self,
        namespace: &str,
        uid: Uid,
        location: Location,
    ) -> Result<Option<(Vec<String>, MessageLog)>> {
        let path = self.path_for_day(location.day);
        let Some(lines) = read_lines(&path).await? else {
            return Ok(None);
        };
        let Some(line) = location.line.checked_sub(1).and_then(|i| lines.get(i)) else {
            warn!(path = %path.display(), line = location.line, "Index points past end of file");
            return Ok(None);
        };

        let log = decode_line(line).map_err(|source| StorageError::Codec {
            path: path.clone(),
            line: location.line,
            source,
        })?;
        if log.uid != uid {
            warn!(path = %path.display(), line = location.line, uid = %uid, found = %log.uid, "Index points at another record");
            return Ok(None);
        }
        if log.namespace != namespace {
            return Ok(None);
        }
        Ok(Some((lines, log)))
    }

    /// Locate and read a record under a guard already held by the caller.
    async fn load(&self, namespace: &str, uid: Uid) -> Result<Option<(Location, Vec<String>, MessageLog)>> {
        validate_namespace(namespace)?;
        let Some(location) = self.index.get(uid) else {
            return Ok(None);
        };
        Ok(self
            .read_record(namespace, uid, location)
            .await?
            .map(|(lines, log)| (location, lines, log)))
    }

    /// Write `log` back over its line and re-point the index.
    async fn store_updated(
        &self,
        location: Location,
        lines: Vec<String>,
        log: &MessageLog,
    ) -> Result<()> {
        let path = self.path_for_day(location.day);
        let encoded = encode_line(log).map_err(|source| StorageError::Codec {
            path: path.clone(),
            line: location.line,
            source,
        })?;
        let line = replace_line(&path, lines, location.line, encoded).await?;
        self.index.set(log.uid, Location::new(location.day, line));
        Ok(())
    }
}

/// Raw file content; `None` when it does not exist.
async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

/// Non-empty lines. Invalid UTF-8 is replaced rather than failing the whole
/// file.
fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Non-empty lines of a file; `None` when it does not exist.
pub(crate) async fn read_lines(path: &Path) -> Result<Option<Vec<String>>> {
    Ok(read_bytes(path).await?.map(|bytes| split_lines(&bytes)))
}

/// Append one line, returning its 1-based line number.
pub(crate) async fn append_line(path: &Path, line: &str) -> Result<usize> {
    let existing = read_bytes(path).await?.unwrap_or_default();
    let count = split_lines(&existing).len();

    let mut buf = String::with_capacity(line.len() + 2);
    // A torn final line must not swallow the new record.
    if existing.last().is_some_and(|b| *b != b'\n') {
        buf.push('\n');
    }
    buf.push_str(line);
    buf.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.write_all(buf.as_bytes())
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.flush().await.map_err(|e| StorageError::io(path, e))?;

    Ok(count + 1)
}

/// Replace line `target` (1-based) of a file whose current content is
/// `lines`, rewriting the whole file through a temporary sibling.
///
/// When `target` is past the end the line is appended instead. Returns the
/// line number the record ended up on.
pub(crate) async fn replace_line(
    path: &Path,
    mut lines: Vec<String>,
    target: usize,
    line: String,
) -> Result<usize> {
    if target == 0 || target > lines.len() {
        debug!(path = %path.display(), target, "Stale line reference, appending");
        return append_line(path, &line).await;
    }
    lines[target - 1] = line;

    let mut content = lines.join("\n");
    content.push('\n');

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content)
        .await
        .map_err(|e| StorageError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    Ok(target)
}

#[async_trait]
impl MessageLogStore for FileMessageLogStore {
    async fn create(&self, namespace: &str, log: MessageLog) -> Result<MessageLog> {
        let mut log = prepare_new(namespace, log, Utc::now())?;

        let _guard = self.lock.write().await;
        if self.index.contains(log.uid) {
            return Err(StorageError::AlreadyExists {
                namespace: namespace.to_string(),
                uid: log.uid,
            });
        }

        let day = log.send_at.date_naive();
        let path = self.path_for_day(day);
        log.id = self.index.next_id(day);
        let encoded = encode_line(&log).map_err(|source| StorageError::Codec {
            path: path.clone(),
            line: 0,
            source,
        })?;

        let line = append_line(&path, &encoded).await?;
        self.index.set(log.uid, Location::new(day, line));

        debug!(namespace, uid = %log.uid, path = %path.display(), line, id = log.id, "Appended message log");
        Ok(log)
    }

    async fn get(&self, namespace: &str, uid: Uid) -> Result<MessageLog> {
        let _guard = self.lock.read().await;
        match self.load(namespace, uid).await? {
            Some((_, _, log)) => Ok(log),
            None => Err(StorageError::not_found(namespace, uid)),
        }
    }

    /// Same as [`get`](Self::get): a single writer process is assumed and
    /// the read guard already excludes concurrent rewrites.
    async fn get_with_lock(&self, namespace: &str, uid: Uid) -> Result<MessageLog> {
        self.get(namespace, uid).await
    }

    async fn list(&self, namespace: &str, filter: &ListFilter) -> Result<MessageLogPage> {
        validate_namespace(namespace)?;
        let (start, end) = filter.window(self.sharding.list_window_days, Utc::now());

        let _guard = self.lock.read().await;
        let mut items = Vec::new();
        for (day, _) in file_shards_in_range(start, end) {
            let path = self.path_for_day(day);
            let Some(lines) = read_lines(&path).await? else {
                continue;
            };
            for (i, line) in lines.iter().enumerate() {
                match decode_line(line) {
                    Ok(log) if filter.matches(&log, namespace, start, end) => items.push(log),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(path = %path.display(), line = i + 1, error = %e, "Skipping malformed record")
                    }
                }
            }
        }

        Ok(paginate(items, filter))
    }

    async fn update_status_if(
        &self,
        namespace: &str,
        uid: Uid,
        old: MessageStatus,
        new: MessageStatus,
    ) -> Result<bool> {
        validate_transition(old, new)?;

        let _guard = self.lock.write().await;
        let Some((location, lines, mut log)) = self.load(namespace, uid).await? else {
            return Ok(false);
        };
        if log.status != old {
            return Ok(false);
        }

        log.status = new;
        log.updated_at = now_millis();
        self.store_updated(location, lines, &log).await?;

        debug!(namespace, uid = %uid, %old, %new, "Message log status updated");
        Ok(true)
    }

    async fn record_attempt(
        &self,
        namespace: &str,
        uid: Uid,
        last_error: Option<&str>,
    ) -> Result<MessageLog> {
        let _guard = self.lock.write().await;
        let Some((location, lines, mut log)) = self.load(namespace, uid).await? else {
            return Err(StorageError::not_found(namespace, uid));
        };

        log.retry_total += 1;
        log.last_error = last_error.map(str::to_string);
        log.updated_at = now_millis();
        self.store_updated(location, lines, &log).await?;
        Ok(log)
    }
}
