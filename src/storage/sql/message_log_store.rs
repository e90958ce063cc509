//! Unified SQL MessageLogStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;
use std::sync::Arc;

use super::{ShardManager, SqlDatabase};
use crate::config::ShardingConfig;

/// SQL-based implementation of MessageLogStore.
///
/// Writes go to the shard of the record's `send_at` week, creating it on
/// demand. Reads by UID probe the UID's creation week and the following
/// `lookup_horizon_weeks` weeks, skipping shards that do not exist.
pub struct SqlMessageLogStore<DB: SqlDatabase> {
    pool: DB::Pool,
    shards: Arc<dyn ShardManager>,
    sharding: ShardingConfig,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlMessageLogStore<DB> {
    /// Create a new SQL message log store.
    pub fn new(pool: DB::Pool, shards: Arc<dyn ShardManager>, sharding: ShardingConfig) -> Self {
        Self {
            pool,
            shards,
            sharding,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }

    /// Existing shards that may hold `uid`, in probe order.
    async fn lookup_shards(
        &self,
        namespace: &str,
        uid: crate::uid::Uid,
    ) -> crate::storage::Result<Vec<String>> {
        crate::shard::validate_namespace(namespace)?;

        let mut existing = Vec::new();
        for shard in crate::shard::db_shards_for_lookup(
            namespace,
            uid.timestamp(),
            self.sharding.lookup_horizon_weeks,
        ) {
            if self.shards.shard_exists(&shard).await? {
                existing.push(shard);
            }
        }
        Ok(existing)
    }
}

fn parse_column<T: std::str::FromStr>(
    shard: &str,
    column: &'static str,
    value: String,
) -> crate::storage::Result<T> {
    value
        .parse()
        .map_err(|_| crate::storage::StorageError::CorruptColumn {
            shard: shard.to_string(),
            column,
            value,
        })
}

/// Macro to implement MessageLogStore for a specific SQL backend.
macro_rules! impl_message_log_store {
    ($db_type:ty, $row_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlMessageLogStore<$db_type> {
            fn decode_row(
                shard: &str,
                row: &$row_type,
            ) -> crate::storage::Result<crate::model::MessageLog> {
                use sqlx::Row;

                use crate::storage::helpers::from_millis;
                use crate::storage::StorageError;

                let db = |e| StorageError::database(shard, e);

                Ok(crate::model::MessageLog {
                    id: row.try_get("id").map_err(db)?,
                    uid: crate::uid::Uid::from_raw(row.try_get("uid").map_err(db)?),
                    namespace: row.try_get("namespace").map_err(db)?,
                    send_at: from_millis(row.try_get("send_at").map_err(db)?),
                    message: row.try_get("message").map_err(db)?,
                    config: row.try_get("config").map_err(db)?,
                    message_type: parse_column(shard, "type", row.try_get("type").map_err(db)?)?,
                    status: parse_column(shard, "status", row.try_get("status").map_err(db)?)?,
                    retry_total: row.try_get("retry_total").map_err(db)?,
                    last_error: row.try_get("last_error").map_err(db)?,
                    created_at: from_millis(row.try_get("created_at").map_err(db)?),
                    updated_at: from_millis(row.try_get("updated_at").map_err(db)?),
                })
            }

            async fn fetch_by_uid(
                &self,
                shard: &str,
                namespace: &str,
                uid: crate::uid::Uid,
            ) -> crate::storage::Result<Option<crate::model::MessageLog>> {
                let sql = <$db_type as SqlDatabase>::build_select(super::statements::select_by_uid(
                    shard, namespace, uid, false,
                ));
                let row = sqlx::query(&sql)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| crate::storage::StorageError::database(shard, e))?;
                row.map(|row| Self::decode_row(shard, &row)).transpose()
            }

            async fn fetch_locked(
                &self,
                shard: &str,
                namespace: &str,
                uid: crate::uid::Uid,
            ) -> crate::storage::Result<Option<crate::model::MessageLog>> {
                use crate::storage::StorageError;

                let sql = <$db_type as SqlDatabase>::build_select(super::statements::select_by_uid(
                    shard, namespace, uid, true,
                ));

                // Dropping the transaction on any early return rolls it back.
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| StorageError::database(shard, e))?;
                let row = sqlx::query(&sql)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| StorageError::database(shard, e))?;
                let log = row.map(|row| Self::decode_row(shard, &row)).transpose()?;
                tx.commit()
                    .await
                    .map_err(|e| StorageError::database(shard, e))?;
                Ok(log)
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::MessageLogStore for SqlMessageLogStore<$db_type> {
            async fn create(
                &self,
                namespace: &str,
                log: crate::model::MessageLog,
            ) -> crate::storage::Result<crate::model::MessageLog> {
                use sqlx::Row;

                use crate::storage::StorageError;

                let mut log = crate::storage::helpers::prepare_new(namespace, log, chrono::Utc::now())?;
                let shard = crate::shard::db_shard_name(namespace, log.send_at);
                self.shards.ensure_shard(&shard).await?;

                let sql = <$db_type as SqlDatabase>::build_insert(super::statements::insert_log(&shard, &log));
                let row = sqlx::query(&sql)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| match &e {
                        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                            StorageError::AlreadyExists {
                                namespace: namespace.to_string(),
                                uid: log.uid,
                            }
                        }
                        _ => StorageError::database(&shard, e),
                    })?;
                log.id = row
                    .try_get("id")
                    .map_err(|e| StorageError::database(&shard, e))?;

                tracing::debug!(namespace, uid = %log.uid, shard = %shard, id = log.id, "Created message log");
                Ok(log)
            }

            async fn get(
                &self,
                namespace: &str,
                uid: crate::uid::Uid,
            ) -> crate::storage::Result<crate::model::MessageLog> {
                for shard in self.lookup_shards(namespace, uid).await? {
                    if let Some(log) = self.fetch_by_uid(&shard, namespace, uid).await? {
                        return Ok(log);
                    }
                }
                Err(crate::storage::StorageError::not_found(namespace, uid))
            }

            async fn get_with_lock(
                &self,
                namespace: &str,
                uid: crate::uid::Uid,
            ) -> crate::storage::Result<crate::model::MessageLog> {
                for shard in self.lookup_shards(namespace, uid).await? {
                    if let Some(log) = self.fetch_locked(&shard, namespace, uid).await? {
                        return Ok(log);
                    }
                }
                Err(crate::storage::StorageError::not_found(namespace, uid))
            }

            async fn list(
                &self,
                namespace: &str,
                filter: &crate::model::ListFilter,
            ) -> crate::storage::Result<crate::model::MessageLogPage> {
                use sqlx::Row;

                use crate::storage::StorageError;

                crate::shard::validate_namespace(namespace)?;
                let (start, end) = filter.window(self.sharding.list_window_days, chrono::Utc::now());

                let mut shards = Vec::new();
                for shard in crate::shard::db_shards_in_range(namespace, start, end) {
                    if self.shards.shard_exists(&shard).await? {
                        shards.push(shard);
                    }
                }

                let Some((page_sql, count_sql)) =
                    super::statements::list(&shards, namespace, filter, start, end).map(
                        |(page, count)| {
                            (
                                <$db_type as SqlDatabase>::build_select(page),
                                count.map(<$db_type as SqlDatabase>::build_select),
                            )
                        },
                    )
                else {
                    return Ok(crate::model::MessageLogPage::default());
                };
                let shard_label = shards.join(",");

                let rows = sqlx::query(&page_sql)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StorageError::database(&shard_label, e))?;

                let mut items = Vec::with_capacity(rows.len());
                for row in &rows {
                    items.push(Self::decode_row(&shard_label, row)?);
                }

                let total = match count_sql {
                    Some(sql) => {
                        let row = sqlx::query(&sql)
                            .fetch_one(&self.pool)
                            .await
                            .map_err(|e| StorageError::database(&shard_label, e))?;
                        row.try_get::<i64, _>(0)
                            .map_err(|e| StorageError::database(&shard_label, e))?
                    }
                    None => items.len() as i64,
                };

                Ok(crate::model::MessageLogPage { items, total })
            }

            async fn update_status_if(
                &self,
                namespace: &str,
                uid: crate::uid::Uid,
                old: crate::model::MessageStatus,
                new: crate::model::MessageStatus,
            ) -> crate::storage::Result<bool> {
                crate::model::validate_transition(old, new)?;

                for shard in self.lookup_shards(namespace, uid).await? {
                    let sql = <$db_type as SqlDatabase>::build_update(
                        super::statements::update_status_if(
                            &shard,
                            namespace,
                            uid,
                            old,
                            new,
                            crate::storage::helpers::now_millis(),
                        ),
                    );
                    let result = sqlx::query(&sql)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| crate::storage::StorageError::database(&shard, e))?;
                    if result.rows_affected() > 0 {
                        tracing::debug!(namespace, uid = %uid, %old, %new, "Message log status updated");
                        return Ok(true);
                    }
                }
                Ok(false)
            }

            async fn record_attempt(
                &self,
                namespace: &str,
                uid: crate::uid::Uid,
                last_error: Option<&str>,
            ) -> crate::storage::Result<crate::model::MessageLog> {
                for shard in self.lookup_shards(namespace, uid).await? {
                    let sql = <$db_type as SqlDatabase>::build_update(
                        super::statements::record_attempt(
                            &shard,
                            namespace,
                            uid,
                            last_error,
                            crate::storage::helpers::now_millis(),
                        ),
                    );
                    let result = sqlx::query(&sql)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| crate::storage::StorageError::database(&shard, e))?;
                    if result.rows_affected() > 0 {
                        if let Some(log) = self.fetch_by_uid(&shard, namespace, uid).await? {
                            return Ok(log);
                        }
                    }
                }
                Err(crate::storage::StorageError::not_found(namespace, uid))
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_message_log_store!(super::postgres::Postgres, sqlx::postgres::PgRow, "postgres");
impl_message_log_store!(super::sqlite::Sqlite, sqlx::sqlite::SqliteRow, "sqlite");
