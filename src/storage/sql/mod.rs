//! Unified SQL storage implementations.
//!
//! Records live in one table per namespace per ISO week. The implementations
//! are parameterized by database type using the `SqlDatabase` trait and
//! share one set of statement builders; dialect differences are confined to
//! the marker types below.

mod message_log_store;
mod query;
mod shard_manager;
mod statements;

pub use message_log_store::SqlMessageLogStore;
pub use query::SqlDatabase;
pub use shard_manager::{ShardManager, SqlShardManager};

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sqlx::PgPool;

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;

        const TABLE_EXISTS_SQL: &'static str = "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1";

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_table_create(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_index_create(stmt: sea_query::IndexCreateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_table_rename(stmt: sea_query::TableRenameStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }
    }

    /// PostgreSQL shard manager.
    pub type PostgresShardManager = super::SqlShardManager<Postgres>;

    /// PostgreSQL message log store.
    pub type PostgresMessageLogStore = super::SqlMessageLogStore<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;
    use sqlx::SqlitePool;

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;

        const TABLE_EXISTS_SQL: &'static str =
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?";

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_table_create(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_index_create(stmt: sea_query::IndexCreateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_table_rename(stmt: sea_query::TableRenameStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }
    }

    /// SQLite shard manager.
    pub type SqliteShardManager = super::SqlShardManager<Sqlite>;

    /// SQLite message log store.
    pub type SqliteMessageLogStore = super::SqlMessageLogStore<Sqlite>;
}
