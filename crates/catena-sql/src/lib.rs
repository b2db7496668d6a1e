//! Catena's restricted SQL dialect: lexer, recursive-descent parser, AST,
//! the frontend/backend rewriting visitors, canonical dual-dialect
//! rendering, and template hashing.
//!
//! This crate has no notion of privileges, schemas, or execution — it only
//! ever turns text into a validated AST and back into text. Everything
//! downstream of "is this statement allowed to run" lives in
//! `catena-executive` and `catena-grants`.

mod ast;
mod dialect;
mod error;
mod lexer;
mod parser;
mod template;
mod visitor;

pub use ast::{
    ColumnDef, ColumnType, CreateDatabase, CreateIndex, CreateTable, Delete, Describe, DropDatabase,
    DropTable, Expr, Grant, GrantPrivilegeKind, GrantTemplate, If, IfBranch, Insert, JoinClause,
    OrderByItem, Revoke, RevokeTemplate, Select, SelectItem, Show, Statement, TableRef, Update,
};
pub use dialect::{render_statement, Dialect};
pub use error::{SqlError, SqlResult};
pub use parser::parse_statement;
pub use template::template_hash;
pub use visitor::{BackendVisitor, FrontendVisitor};
