//! Storage configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Postgres,
    File,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
    /// Flat-file backend configuration.
    pub file: FileConfig,
    /// Sharding behavior shared by all backends.
    pub sharding: ShardingConfig,
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path.
    pub path: String,
    /// Connection pool size.
    pub max_connections: u32,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_secs: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "./data/herald.db".to_string(),
            max_connections: 8,
            busy_timeout_secs: 5,
        }
    }
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// PostgreSQL connection URI.
    pub uri: String,
    /// Connection pool size.
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/herald".to_string(),
            max_connections: 16,
        }
    }
}

/// Flat-file backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Directory holding the `message_YYYYMMDD.log` day files.
    pub dir: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            dir: "./data/messagelogs".to_string(),
        }
    }
}

/// Shard layout and lookup tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Pre-sharding table renamed into the first shard created, if present.
    /// `None` disables the migration.
    pub legacy_table: Option<String>,
    /// Window used by list requests that give no start/end.
    pub list_window_days: i64,
    /// Weeks after a UID's creation week that a lookup by UID also probes,
    /// for messages scheduled into a later week.
    pub lookup_horizon_weeks: u32,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            legacy_table: Some("messagelogs".to_string()),
            list_window_days: 7,
            lookup_horizon_weeks: 4,
        }
    }
}
