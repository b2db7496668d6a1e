//! Errors surfaced while loading CLI arguments or the node database.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("node database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed persisted identity: {0}")]
    Crypto(#[from] catena_crypto::CryptoError),

    #[error("malformed node uuid: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Process exit codes per the CLI surface: `0` success/help, `64` usage
/// error (matches the BSD `sysexits.h` convention the teacher's own
/// tooling follows), non-zero on fatal init failure.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_USAGE: i32 = 64;
pub const EXIT_FATAL: i32 = 1;
