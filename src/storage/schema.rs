//! Database schema definitions using sea-query.
//!
//! Every shard table shares one layout; only the table name varies, so the
//! statements here take the shard name and are rendered per dialect by
//! [`SqlDatabase`](super::sql::SqlDatabase).

use sea_query::{
    Alias, ColumnDef, Iden, Index, IndexCreateStatement, Table, TableCreateStatement,
    TableRenameStatement,
};

/// Columns of a message log shard table.
#[derive(Iden, Clone, Copy)]
pub enum MessageLogs {
    #[iden = "id"]
    Id,
    #[iden = "uid"]
    Uid,
    #[iden = "namespace"]
    Namespace,
    #[iden = "send_at"]
    SendAt,
    #[iden = "message"]
    Message,
    #[iden = "config"]
    Config,
    #[iden = "type"]
    Type,
    #[iden = "status"]
    Status,
    #[iden = "retry_total"]
    RetryTotal,
    #[iden = "last_error"]
    LastError,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

impl MessageLogs {
    /// Every column, in row decoding order.
    pub const ALL: [MessageLogs; 12] = [
        MessageLogs::Id,
        MessageLogs::Uid,
        MessageLogs::Namespace,
        MessageLogs::SendAt,
        MessageLogs::Message,
        MessageLogs::Config,
        MessageLogs::Type,
        MessageLogs::Status,
        MessageLogs::RetryTotal,
        MessageLogs::LastError,
        MessageLogs::CreatedAt,
        MessageLogs::UpdatedAt,
    ];
}

/// Alias of the `UNION ALL` derived table used by list queries.
pub const UNION_ALIAS: &str = "messagelogs";

/// `CREATE TABLE IF NOT EXISTS` for one shard.
pub fn create_shard_table(shard: &str) -> TableCreateStatement {
    Table::create()
        .table(Alias::new(shard))
        .if_not_exists()
        .col(
            ColumnDef::new(MessageLogs::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(MessageLogs::Uid)
                .big_integer()
                .not_null()
                .unique_key(),
        )
        .col(ColumnDef::new(MessageLogs::Namespace).string_len(64).not_null())
        .col(ColumnDef::new(MessageLogs::SendAt).big_integer().not_null())
        .col(ColumnDef::new(MessageLogs::Message).blob().not_null())
        .col(ColumnDef::new(MessageLogs::Config).blob().not_null())
        .col(ColumnDef::new(MessageLogs::Type).string_len(16).not_null())
        .col(ColumnDef::new(MessageLogs::Status).string_len(16).not_null())
        .col(
            ColumnDef::new(MessageLogs::RetryTotal)
                .big_integer()
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(MessageLogs::LastError).text().null())
        .col(ColumnDef::new(MessageLogs::CreatedAt).big_integer().not_null())
        .col(ColumnDef::new(MessageLogs::UpdatedAt).big_integer().not_null())
        .to_owned()
}

/// Secondary indexes for one shard: `(namespace, status)` and `created_at`.
///
/// Index names derive from the shard name, so they are unique per database.
pub fn create_shard_indexes(shard: &str) -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .if_not_exists()
            .name(format!("{shard}_ns_status"))
            .table(Alias::new(shard))
            .col(MessageLogs::Namespace)
            .col(MessageLogs::Status)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name(format!("{shard}_created"))
            .table(Alias::new(shard))
            .col(MessageLogs::CreatedAt)
            .to_owned(),
    ]
}

/// `ALTER TABLE {legacy} RENAME TO {shard}`.
pub fn rename_legacy_table(legacy: &str, shard: &str) -> TableRenameStatement {
    Table::rename()
        .table(Alias::new(legacy), Alias::new(shard))
        .to_owned()
}
