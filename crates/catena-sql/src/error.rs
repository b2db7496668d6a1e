/// Errors produced while parsing, rewriting, or rendering a statement.
///
/// Mirrors the `Parse` / `Inconsistent*` rows of the error taxonomy table —
/// this crate only ever surfaces these two kinds; privilege and schema
/// errors belong to `catena-executive`, which runs after this crate has
/// already produced a valid AST.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SqlError {
    #[error("syntax error at position {position}: {message}")]
    Parse { message: String, position: usize },

    #[error("expression or statement nesting exceeds the maximum depth of {max}")]
    NestingTooDeep { max: usize },

    #[error("unbound parameter `{0}`")]
    UnboundParameter(String),

    #[error("parameter `{0}` was bound to inconsistent values")]
    InconsistentParameter(String),

    #[error("duplicate column `{0}` in column list")]
    DuplicateColumn(String),

    #[error("unknown function `{0}`; only LENGTH and ABS may be used")]
    UnknownFunction(String),
}

pub type SqlResult<T> = Result<T, SqlError>;
