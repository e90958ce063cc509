//! Message log storage.
//!
//! One repository contract ([`MessageLogStore`]) with two independent
//! implementations:
//!
//! - [`sql`]: per-namespace, per-ISO-week tables in SQLite or PostgreSQL,
//!   created on demand and queried with `UNION ALL` across weeks.
//! - [`file`]: per-day JSON-lines files with an in-memory UID location index.
//!
//! The backend is chosen once at startup by [`init_storage`].

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::model::MessageStatus;
use crate::uid::Uid;

pub mod file;
pub(crate) mod helpers;
mod message_log_store;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub(crate) mod schema;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use file::FileMessageLogStore;
pub use message_log_store::MessageLogStore;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use sql::{ShardManager, SqlMessageLogStore, SqlShardManager};
#[cfg(feature = "postgres")]
pub use sql::postgres::{PostgresMessageLogStore, PostgresShardManager};
#[cfg(feature = "sqlite")]
pub use sql::sqlite::{SqliteMessageLogStore, SqliteShardManager};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// A conditional status update that does not apply is not an error; see
/// [`MessageLogStore::update_status_if`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Message log not found: namespace={namespace}, uid={uid}")]
    NotFound { namespace: String, uid: Uid },

    #[error("Message log already exists: namespace={namespace}, uid={uid}")]
    AlreadyExists { namespace: String, uid: Uid },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: MessageStatus,
        to: MessageStatus,
    },

    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),

    #[error("Namespace mismatch: call is scoped to {expected}, record carries {actual}")]
    NamespaceMismatch { expected: String, actual: String },

    #[error("Invalid snowflake node id: {0}")]
    InvalidNodeId(u16),

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Database error in shard {shard}: {source}")]
    Database {
        shard: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record in {}:{line}: {source}", path.display())]
    Codec {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corrupt column {column} in shard {shard}: {value:?}")]
    CorruptColumn {
        shard: String,
        column: &'static str,
        value: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub(crate) fn not_found(namespace: &str, uid: Uid) -> Self {
        StorageError::NotFound {
            namespace: namespace.to_string(),
            uid,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    pub(crate) fn database(shard: impl Into<String>, source: sqlx::Error) -> Self {
        StorageError::Database {
            shard: shard.into(),
            source,
        }
    }
}

/// Initialize storage based on configuration.
///
/// Returns the [`MessageLogStore`] implementation selected by
/// `config.storage_type`. Failing to reach the database or to enumerate the
/// log directory is fatal here.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn MessageLogStore>, Box<dyn std::error::Error + Send + Sync>> {
    info!(storage_type = ?config.storage_type, "Initializing message log storage");

    match config.storage_type {
        StorageType::File => {
            let store = FileMessageLogStore::open(&config.file.dir, config.sharding.clone()).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            use std::str::FromStr;

            if let Some(parent) = std::path::Path::new(&config.sqlite.path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let options = sqlx::sqlite::SqliteConnectOptions::from_str(&format!(
                "sqlite:{}",
                config.sqlite.path
            ))?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(config.sqlite.busy_timeout_secs));
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(config.sqlite.max_connections)
                .connect_with(options)
                .await?;

            let shards = Arc::new(SqliteShardManager::new(
                pool.clone(),
                config.sharding.legacy_table.clone(),
            ));
            Ok(Arc::new(SqliteMessageLogStore::new(
                pool,
                shards,
                config.sharding.clone(),
            )))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.postgres.max_connections)
                .connect(&config.postgres.uri)
                .await?;

            let shards = Arc::new(PostgresShardManager::new(
                pool.clone(),
                config.sharding.legacy_table.clone(),
            ));
            Ok(Arc::new(PostgresMessageLogStore::new(
                pool,
                shards,
                config.sharding.clone(),
            )))
        }
        #[cfg(not(feature = "postgres"))]
        StorageType::Postgres => {
            tracing::error!("PostgreSQL storage requested but 'postgres' feature is not enabled");
            Err("PostgreSQL feature not enabled".into())
        }
    }
}
