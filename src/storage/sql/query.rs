//! SQL database abstraction trait.

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the pool type, the dialect-specific statements that
/// sea-query cannot express, and the query building methods.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// Catalog probe taking one bind parameter, the table name. Returns a
    /// row when the table exists.
    const TABLE_EXISTS_SQL: &'static str;

    /// Build a SQL query string from a sea-query SELECT statement.
    fn build_select(stmt: sea_query::SelectStatement) -> String;

    /// Build a SQL query string from a sea-query INSERT statement.
    fn build_insert(stmt: sea_query::InsertStatement) -> String;

    /// Build a SQL query string from a sea-query UPDATE statement.
    fn build_update(stmt: sea_query::UpdateStatement) -> String;

    fn build_table_create(stmt: sea_query::TableCreateStatement) -> String;

    fn build_index_create(stmt: sea_query::IndexCreateStatement) -> String;

    fn build_table_rename(stmt: sea_query::TableRenameStatement) -> String;
}
