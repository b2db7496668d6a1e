#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database I/O or open failure: {0}")]
    Fatal(#[from] sqlx::Error),

    #[error("savepoint `{0}` is not open")]
    UnknownSavepoint(String),
}

pub type DbResult<T> = Result<T, DbError>;
