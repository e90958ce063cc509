//! Shard table lifecycle.
//!
//! Shard tables are created lazily on first write. Existence is remembered in
//! a process-wide cache so the catalog is consulted at most once per shard
//! that exists; shards found missing are re-checked on every call, since
//! another process may create them at any time.

use std::marker::PhantomData;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::sync::Mutex;

use super::SqlDatabase;
use crate::storage::Result;

/// Existence checks and on-demand creation of shard tables.
#[async_trait]
pub trait ShardManager: Send + Sync {
    /// Whether the shard table exists. Never creates it.
    async fn shard_exists(&self, shard: &str) -> Result<bool>;

    /// Make sure the shard table and its indexes exist.
    ///
    /// The first shard ever created takes over the legacy unsharded table,
    /// when one is configured and present, by renaming it.
    async fn ensure_shard(&self, shard: &str) -> Result<()>;
}

/// SQL-backed [`ShardManager`].
pub struct SqlShardManager<DB: SqlDatabase> {
    pool: DB::Pool,
    legacy_table: Option<String>,
    known: DashSet<String>,
    create_lock: Mutex<()>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlShardManager<DB> {
    /// Create a shard manager. `legacy_table` names the pre-sharding table to
    /// migrate, if any.
    pub fn new(pool: DB::Pool, legacy_table: Option<String>) -> Self {
        Self {
            pool,
            legacy_table,
            known: DashSet::new(),
            create_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }

    /// Whether the shard is already known to exist, without touching the
    /// database.
    pub fn is_cached(&self, shard: &str) -> bool {
        self.known.contains(shard)
    }
}

/// Macro to implement ShardManager for a specific SQL backend.
macro_rules! impl_shard_manager {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlShardManager<$db_type> {
            async fn table_exists(&self, table: &str) -> Result<bool> {
                let row = sqlx::query(<$db_type as SqlDatabase>::TABLE_EXISTS_SQL)
                    .bind(table)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| crate::storage::StorageError::database(table, e))?;
                Ok(row.is_some())
            }

            /// Run a DDL statement. A failure is tolerated when the shard
            /// turns out to exist anyway, which is how a concurrent creator
            /// in another process shows up.
            async fn execute_ddl(&self, shard: &str, sql: &str) -> Result<()> {
                match sqlx::query(sql).execute(&self.pool).await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        if self.table_exists(shard).await? {
                            tracing::debug!(shard, error = %e, "Shard created concurrently");
                            Ok(())
                        } else {
                            Err(crate::storage::StorageError::database(shard, e))
                        }
                    }
                }
            }

            async fn create_indexes(&self, shard: &str) {
                let statements: Vec<String> = crate::storage::schema::create_shard_indexes(shard)
                    .into_iter()
                    .map(<$db_type as SqlDatabase>::build_index_create)
                    .collect();
                for sql in statements {
                    if let Err(e) = sqlx::query(&sql).execute(&self.pool).await {
                        tracing::warn!(shard, error = %e, "Failed to create shard index");
                    }
                }
            }

            /// Rename the legacy table into `shard`. `false` when there is
            /// nothing to migrate.
            async fn adopt_legacy(&self, shard: &str) -> Result<bool> {
                let Some(legacy) = self.legacy_table.as_deref() else {
                    return Ok(false);
                };
                if legacy == shard || !self.table_exists(legacy).await? {
                    return Ok(false);
                }

                let sql = <$db_type as SqlDatabase>::build_table_rename(
                    crate::storage::schema::rename_legacy_table(legacy, shard),
                );
                self.execute_ddl(shard, &sql).await?;
                tracing::info!(legacy, shard, "Migrated legacy message log table");
                Ok(true)
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait]
        impl ShardManager for SqlShardManager<$db_type> {
            async fn shard_exists(&self, shard: &str) -> Result<bool> {
                if self.known.contains(shard) {
                    return Ok(true);
                }
                let exists = self.table_exists(shard).await?;
                if exists {
                    self.known.insert(shard.to_string());
                }
                Ok(exists)
            }

            async fn ensure_shard(&self, shard: &str) -> Result<()> {
                if self.known.contains(shard) {
                    return Ok(());
                }

                let _guard = self.create_lock.lock().await;
                if self.known.contains(shard) {
                    return Ok(());
                }

                if !self.table_exists(shard).await? && !self.adopt_legacy(shard).await? {
                    let sql = <$db_type as SqlDatabase>::build_table_create(
                        crate::storage::schema::create_shard_table(shard),
                    );
                    self.execute_ddl(shard, &sql).await?;
                    tracing::info!(shard, "Created message log shard");
                }
                self.create_indexes(shard).await;

                self.known.insert(shard.to_string());
                Ok(())
            }
        }
    };
}

impl_shard_manager!(super::postgres::Postgres, "postgres");
impl_shard_manager!(super::sqlite::Sqlite, "sqlite");
