//! The `Database` capability (§6 closing paragraph, §9 "the relational
//! backend itself is external; the core depends only on a small `Database`
//! capability"). Everything in `catena-executive` and `catena-ledger` talks
//! to this trait, never to `sqlx` directly, so a different backend could be
//! substituted without touching either crate.

mod error;
mod metadata;
mod sqlite;
mod value;

pub use error::{DbError, DbResult};
pub use metadata::{DATABASES_TABLE, GRANTS_TABLE, INFO_TABLE, MIGRATIONS, RESERVED_TABLES, USERS_TABLE};
pub use sqlite::SqliteDatabase;
pub use value::{QueryResult, Row, Value};

use async_trait::async_trait;

/// A minimal relational-backend capability: execute/query raw SQL text
/// (already fully rewritten and literal-bound by `catena-sql`'s backend
/// visitor — this trait never sees a bound parameter or variable), nested
/// savepoints, and enough schema introspection for the static verifier and
/// `DESCRIBE`/`SHOW` (§4.4, §4.5).
#[async_trait]
pub trait Database: Send + Sync {
    /// Runs a mutating statement and reports rows affected / last rowid.
    async fn execute(&self, sql: &str) -> DbResult<QueryResult>;

    /// Runs a read statement and returns its rows.
    async fn query(&self, sql: &str) -> DbResult<Vec<Row>>;

    /// `SAVEPOINT <name>`. Savepoints nest — the block-level savepoint wraps
    /// one per transaction (§4.6).
    async fn savepoint(&self, name: &str) -> DbResult<()>;

    /// `RELEASE SAVEPOINT <name>` — commits everything since the matching
    /// `savepoint` call into the enclosing scope.
    async fn release_savepoint(&self, name: &str) -> DbResult<()>;

    /// `ROLLBACK TO SAVEPOINT <name>` — undoes everything since the
    /// matching `savepoint` call, without releasing it (so the scope can
    /// still be released or re-used per SQLite's savepoint semantics).
    async fn rollback_to_savepoint(&self, name: &str) -> DbResult<()>;

    /// Whether a physical (already backend-renamed) table exists.
    async fn table_exists(&self, backend_table: &str) -> DbResult<bool>;

    /// The columns of a physical table, in declaration order.
    async fn table_columns(&self, backend_table: &str) -> DbResult<Vec<ColumnInfo>>;

    /// Every physical table name currently defined, used by `SHOW TABLES`
    /// and the replay queue's fresh-database bootstrap.
    async fn list_tables(&self) -> DbResult<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub type_name: String,
    pub primary_key: bool,
}
