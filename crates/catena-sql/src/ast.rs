//! The AST produced by the parser (§4.1). Identifiers are always stored
//! lowercased — case-folding happens once, at parse time, so every later
//! pass (visitor, verifier, renderer) can compare strings directly.

use catena_types::{Hash, OrderedMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Int,
    Blob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Concat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    LiteralInt(i64),
    LiteralString(String),
    LiteralBlob(Vec<u8>),
    Null,
    /// `table` is `Some` only for qualified references (`t.col`).
    Column { table: Option<String>, name: String },
    AllColumns { table: Option<String> },
    /// `$name` — resolved by the backend visitor from the execution context.
    Variable(String),
    /// `?name` — must be replaced before execution; surviving to the
    /// verifier is an `UnboundParameter` error.
    UnboundParameter(String),
    /// `?name:value` — the literal the backend visitor substitutes for
    /// every occurrence of `?name` in the same statement.
    BoundParameter { name: String, value: Box<Expr> },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    IsNull(Box<Expr>),
    Call { name: String, args: Vec<Expr> },
    /// `CASE WHEN c1 THEN e1 ... [ELSE e] END`
    Case {
        branches: Vec<(Expr, Expr)>,
        else_branch: Option<Box<Expr>>,
    },
    Exists(Box<Select>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub table: TableRef,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    All,
    AllOf(String),
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub distinct: bool,
    pub columns: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub or_replace: bool,
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub table: String,
    pub assignments: OrderedMap<String, Expr>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub table: String,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub ty: ColumnType,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub table: String,
    pub columns: OrderedMap<String, ColumnDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTable {
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDatabase {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropDatabase {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantPrivilegeKind {
    Create,
    Delete,
    Drop,
    Insert,
    Update,
    Grant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub privilege: GrantPrivilegeKind,
    pub table: Option<String>,
    /// `None` means the NULL user — "any invoker."
    pub user: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revoke {
    pub privilege: GrantPrivilegeKind,
    pub table: Option<String>,
    pub user: Option<Vec<u8>>,
}

/// `GRANT TEMPLATE X'<hash>' TO ...` — grants the template-hash privilege
/// kind from §4.3 (the "stored procedure" extension point from §9), not
/// expressible through the literal `Privilege` keyword list in §6 since a
/// template hash is a 32-byte value, not one of the fixed privilege words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantTemplate {
    pub hash: Hash,
    pub user: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokeTemplate {
    pub hash: Hash,
    pub user: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Show {
    Tables,
    Databases { for_user: Option<Vec<u8>> },
    Grants,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Describe {
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBranch {
    pub condition: Expr,
    pub then_branch: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct If {
    pub branches: Vec<IfBranch>,
    pub else_branch: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    CreateTable(CreateTable),
    DropTable(DropTable),
    CreateIndex(CreateIndex),
    CreateDatabase(CreateDatabase),
    DropDatabase(DropDatabase),
    Grant(Grant),
    Revoke(Revoke),
    GrantTemplate(GrantTemplate),
    RevokeTemplate(RevokeTemplate),
    Show(Show),
    Describe(Describe),
    If(If),
    /// `DO s1; s2; ... END`
    Block(Vec<Statement>),
    Fail,
}

impl Statement {
    /// Statements that mutate state (as opposed to `SELECT`/`SHOW`/`DESCRIBE`)
    /// — used by the executive's no-privileges-declared fallback (§4.4 step 4)
    /// and to enforce that `IF` branches must themselves be mutating (§4.4).
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Statement::Select(_) | Statement::Show(_) | Statement::Describe(_)
        )
    }

    /// `true` for statements that require a non-empty database context
    /// (everything except database-level DDL and introspection, §4.4 step 1).
    pub fn requires_database_context(&self) -> bool {
        !matches!(
            self,
            Statement::CreateDatabase(_)
                | Statement::DropDatabase(_)
                | Statement::Show(Show::Databases { .. })
                | Statement::Show(Show::All)
                | Statement::Fail
        )
    }
}
