/// Errors produced while constructing or validating a [`crate::Transaction`].
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("transaction signature does not verify against the invoker's public key")]
    SignatureError,

    #[error("database name must be non-empty, lowercase, and alphanumeric/underscore: {0:?}")]
    InvalidDatabaseName(String),

    #[error(transparent)]
    Sql(#[from] catena_sql::SqlError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type TxResult<T> = Result<T, TxError>;
