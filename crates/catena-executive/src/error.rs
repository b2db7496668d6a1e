//! The executive's share of the error taxonomy in spec §7: authorization,
//! schema, and dispatch failures. `Parse`/`Inconsistent*` (parameter) kinds
//! already live on `catena_sql::SqlError`; `Fatal`/I/O on `catena_db::DbError`
//! — both are folded in here via `#[from]` so a caller only ever matches on
//! one error type per statement execution.

use catena_db::DbError;
use catena_sql::SqlError;

#[derive(Debug, thiserror::Error)]
pub enum ExecutiveError {
    #[error("statement requires a database context")]
    RequiresDatabaseContext,

    #[error("invoker lacks a required privilege")]
    PrivilegeRequired,

    #[error("table `{0}` does not exist")]
    TableDoesNotExist(String),

    #[error("table `{0}` already exists")]
    TableAlreadyExists(String),

    #[error("database `{0}` does not exist")]
    DatabaseDoesNotExist(String),

    #[error("database `{0}` already exists")]
    DatabaseAlreadyExists(String),

    #[error("column `{0}` does not exist")]
    ColumnDoesNotExist(String),

    #[error("duplicate column `{0}` in column list")]
    DuplicateColumn(String),

    #[error("database `{0}` is not empty")]
    DatabaseNotEmpty(String),

    #[error("column reference outside any table context")]
    ColumnOutsideTableContext,

    #[error("statement still contains an unresolved variable or parameter after backend rewriting")]
    ResidualReference,

    #[error("FAIL")]
    ExecutionFailed,

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub type ExecutiveResult<T> = Result<T, ExecutiveError>;
