//! Static verification (§4.5), run after the backend visitor so every table
//! and column name here is already the physical, `<db>$`-scoped name the
//! backend connection actually has.

use std::collections::HashSet;

use catena_sql::{Expr, Select, SelectItem, Statement};
use futures::future::{BoxFuture, FutureExt};

use crate::error::{ExecutiveError, ExecutiveResult};
use catena_db::Database;

/// The set of columns an expression may bare-reference, if any. `None` means
/// there is no table context at all — e.g. a `SELECT` with no `FROM` — and
/// every bare column reference is an error. `INSERT`/`UPDATE`/`DELETE` always
/// carry `Some` here: their own target table stands in as an implicit single-
/// table context even though they have no `FROM` clause, which is the
/// "creating mode" §4.5 calls out as the exception to "reject column
/// references outside a table context."
type ColumnContext = Option<HashSet<String>>;

/// The backend visitor renames the `rowid`/`oid` pseudo-columns to
/// `$rowid`/`$oid` (§4.2) so a user table can never shadow them. Neither
/// name is ever a physical schema column, so the table/column-existence
/// check below must treat them as always valid wherever a table context
/// exists, the same way SQLite always has an implicit rowid alias.
fn is_rowid_alias(name: &str) -> bool {
    matches!(name, "$rowid" | "$oid")
}

async fn table_columns(db: &dyn Database, table: &str) -> ExecutiveResult<HashSet<String>> {
    if !db.table_exists(table).await? {
        return Err(ExecutiveError::TableDoesNotExist(table.to_string()));
    }
    Ok(db
        .table_columns(table)
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect())
}

/// Verifies `stmt` is safe to hand to the backend connection as-is (§4.5).
pub async fn verify(stmt: &Statement, db: &dyn Database) -> ExecutiveResult<()> {
    match stmt {
        Statement::Select(s) => verify_select(s, db).await,
        Statement::Insert(i) => {
            let columns = table_columns(db, &i.table).await?;
            let mut seen = HashSet::new();
            for name in &i.columns {
                if !seen.insert(name) {
                    return Err(ExecutiveError::DuplicateColumn(name.clone()));
                }
                if !columns.contains(name) {
                    return Err(ExecutiveError::ColumnDoesNotExist(name.clone()));
                }
            }
            for row in &i.values {
                for expr in row {
                    verify_expr(expr, &Some(columns.clone()), db).await?;
                }
            }
            Ok(())
        }
        Statement::Update(u) => {
            let columns = table_columns(db, &u.table).await?;
            for (name, expr) in u.assignments.iter() {
                if !columns.contains(name) {
                    return Err(ExecutiveError::ColumnDoesNotExist(name.clone()));
                }
                verify_expr(expr, &Some(columns.clone()), db).await?;
            }
            if let Some(where_clause) = &u.where_clause {
                verify_expr(where_clause, &Some(columns), db).await?;
            }
            Ok(())
        }
        Statement::Delete(d) => {
            let columns = table_columns(db, &d.table).await?;
            if let Some(where_clause) = &d.where_clause {
                verify_expr(where_clause, &Some(columns), db).await?;
            }
            Ok(())
        }
        Statement::CreateTable(c) => {
            if db.table_exists(&c.table).await? {
                return Err(ExecutiveError::TableAlreadyExists(c.table.clone()));
            }
            Ok(())
        }
        Statement::DropTable(t) => {
            if !db.table_exists(&t.table).await? {
                return Err(ExecutiveError::TableDoesNotExist(t.table.clone()));
            }
            Ok(())
        }
        Statement::CreateIndex(c) => {
            let columns = table_columns(db, &c.table).await?;
            for name in &c.columns {
                if !columns.contains(name) {
                    return Err(ExecutiveError::ColumnDoesNotExist(name.clone()));
                }
            }
            Ok(())
        }
        // Everything else is handled directly by the executive's dispatch
        // and never reaches the static verifier (§4.4).
        _ => Ok(()),
    }
}

fn verify_select<'a>(s: &'a Select, db: &'a dyn Database) -> BoxFuture<'a, ExecutiveResult<()>> {
    async move {
        let mut context: ColumnContext = None;
        if let Some(from) = &s.from {
            let mut cols = table_columns(db, &from.name).await?;
            for join in &s.joins {
                cols.extend(table_columns(db, &join.table.name).await?);
            }
            context = Some(cols);
        }
        for col in &s.columns {
            if let SelectItem::Expr { expr, .. } = col {
                verify_expr(expr, &context, db).await?;
            }
        }
        for join in &s.joins {
            verify_expr(&join.on, &context, db).await?;
        }
        if let Some(where_clause) = &s.where_clause {
            verify_expr(where_clause, &context, db).await?;
        }
        for item in &s.order_by {
            verify_expr(&item.expr, &context, db).await?;
        }
        Ok(())
    }
    .boxed()
}

fn verify_expr<'a>(
    expr: &'a Expr,
    context: &'a ColumnContext,
    db: &'a dyn Database,
) -> BoxFuture<'a, ExecutiveResult<()>> {
    async move {
        match expr {
            Expr::LiteralInt(_) | Expr::LiteralString(_) | Expr::LiteralBlob(_) | Expr::Null => Ok(()),
            Expr::Column { name, .. } => match context {
                Some(columns) if columns.contains(name) || is_rowid_alias(name) => Ok(()),
                Some(_) => Err(ExecutiveError::ColumnDoesNotExist(name.clone())),
                None => Err(ExecutiveError::ColumnOutsideTableContext),
            },
            Expr::AllColumns { .. } => Ok(()),
            Expr::Variable(_) | Expr::UnboundParameter(_) | Expr::BoundParameter { .. } => {
                Err(ExecutiveError::ResidualReference)
            }
            Expr::Unary(_, inner) | Expr::IsNull(inner) => verify_expr(inner, context, db).await,
            Expr::Binary(_, lhs, rhs) => {
                verify_expr(lhs, context, db).await?;
                verify_expr(rhs, context, db).await
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    verify_expr(arg, context, db).await?;
                }
                Ok(())
            }
            Expr::Case {
                branches,
                else_branch,
            } => {
                for (cond, value) in branches {
                    verify_expr(cond, context, db).await?;
                    verify_expr(value, context, db).await?;
                }
                if let Some(e) = else_branch {
                    verify_expr(e, context, db).await?;
                }
                Ok(())
            }
            Expr::Exists(select) => verify_select(select, db).await,
        }
    }
    .boxed()
}
