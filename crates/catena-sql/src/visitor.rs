//! Statement rewriting. Two visitors share one recursive walk:
//!
//! - [`FrontendVisitor`] runs client-side, before a transaction is signed —
//!   it only resolves `$variable` references the client already knows
//!   (e.g. `$invoker`), leaving everything else untouched so the signed
//!   template still matches what the backend will later re-derive.
//! - [`BackendVisitor`] runs node-side, after authorization — it resolves
//!   every remaining variable and bound parameter, rejects any function
//!   outside the whitelist, and renames identifiers so the statement is
//!   safe to hand to the physical SQLite connection.

use std::collections::HashMap;

use crate::ast::*;
use crate::error::{SqlError, SqlResult};

const ALLOWED_FUNCTIONS: &[&str] = &["length", "abs"];

/// SQLite reserves this prefix for its own internal tables (`sqlite_master`,
/// …); a user `CREATE TABLE sqlite_x (...)` must still round-trip through
/// our `<db>$table` scoping without ever literally starting with
/// `sqlite_` once scoped, or it could alias something SQLite treats
/// specially. We break the prefix before scoping, not after.
const RESERVED_TABLE_PREFIX: &str = "sqlite_";
const RESERVED_TABLE_ESCAPE: &str = "sqlite$_";

fn escape_reserved_prefix(name: &str) -> String {
    match name.strip_prefix(RESERVED_TABLE_PREFIX) {
        Some(rest) => format!("{}{}", RESERVED_TABLE_ESCAPE, rest),
        None => name.to_string(),
    }
}

/// Walks every expression and table reference in `stmt` in place.
trait Rewrite {
    fn rewrite_expr(&mut self, expr: Expr) -> SqlResult<Expr>;

    /// Renames a table name at the point it is declared or referenced.
    /// Identity by default; `BackendVisitor` overrides it.
    fn rewrite_table_name(&mut self, name: String) -> SqlResult<String> {
        Ok(name)
    }

    /// Renames a bare column name. Identity by default.
    fn rewrite_column_name(&mut self, name: String) -> SqlResult<String> {
        Ok(name)
    }
}

fn walk_statement<R: Rewrite>(r: &mut R, stmt: Statement) -> SqlResult<Statement> {
    Ok(match stmt {
        Statement::Select(s) => Statement::Select(walk_select(r, s)?),
        Statement::Insert(i) => Statement::Insert(walk_insert(r, i)?),
        Statement::Update(u) => Statement::Update(walk_update(r, u)?),
        Statement::Delete(d) => Statement::Delete(walk_delete(r, d)?),
        Statement::CreateTable(mut c) => {
            c.table = r.rewrite_table_name(c.table)?;
            Statement::CreateTable(c)
        }
        Statement::DropTable(mut t) => {
            t.table = r.rewrite_table_name(t.table)?;
            Statement::DropTable(t)
        }
        Statement::CreateIndex(mut c) => {
            c.table = r.rewrite_table_name(c.table)?;
            Statement::CreateIndex(c)
        }
        Statement::CreateDatabase(c) => Statement::CreateDatabase(c),
        Statement::DropDatabase(d) => Statement::DropDatabase(d),
        Statement::Grant(g) => Statement::Grant(g),
        Statement::Revoke(rv) => Statement::Revoke(rv),
        Statement::GrantTemplate(g) => Statement::GrantTemplate(g),
        Statement::RevokeTemplate(rv) => Statement::RevokeTemplate(rv),
        Statement::Show(s) => Statement::Show(s),
        Statement::Describe(d) => Statement::Describe(d),
        Statement::If(if_stmt) => Statement::If(walk_if(r, if_stmt)?),
        Statement::Block(stmts) => {
            let mut out = Vec::with_capacity(stmts.len());
            for s in stmts {
                out.push(walk_statement(r, s)?);
            }
            Statement::Block(out)
        }
        Statement::Fail => Statement::Fail,
    })
}

fn walk_if<R: Rewrite>(r: &mut R, if_stmt: If) -> SqlResult<If> {
    let mut branches = Vec::with_capacity(if_stmt.branches.len());
    for branch in if_stmt.branches {
        branches.push(IfBranch {
            condition: r.rewrite_expr(branch.condition)?,
            then_branch: Box::new(walk_statement(r, *branch.then_branch)?),
        });
    }
    let else_branch = match if_stmt.else_branch {
        Some(e) => Some(Box::new(walk_statement(r, *e)?)),
        None => None,
    };
    Ok(If {
        branches,
        else_branch,
    })
}

fn walk_table_ref<R: Rewrite>(r: &mut R, t: TableRef) -> SqlResult<TableRef> {
    Ok(TableRef {
        name: r.rewrite_table_name(t.name)?,
        alias: t.alias,
    })
}

fn walk_select<R: Rewrite>(r: &mut R, s: Select) -> SqlResult<Select> {
    let mut columns = Vec::with_capacity(s.columns.len());
    for col in s.columns {
        columns.push(match col {
            SelectItem::All => SelectItem::All,
            SelectItem::AllOf(t) => SelectItem::AllOf(t),
            SelectItem::Expr { expr, alias } => SelectItem::Expr {
                expr: r.rewrite_expr(expr)?,
                alias,
            },
        });
    }
    let from = match s.from {
        Some(t) => Some(walk_table_ref(r, t)?),
        None => None,
    };
    let mut joins = Vec::with_capacity(s.joins.len());
    for j in s.joins {
        joins.push(JoinClause {
            table: walk_table_ref(r, j.table)?,
            on: r.rewrite_expr(j.on)?,
        });
    }
    let where_clause = match s.where_clause {
        Some(e) => Some(r.rewrite_expr(e)?),
        None => None,
    };
    let mut order_by = Vec::with_capacity(s.order_by.len());
    for item in s.order_by {
        order_by.push(OrderByItem {
            expr: r.rewrite_expr(item.expr)?,
            desc: item.desc,
        });
    }
    Ok(Select {
        distinct: s.distinct,
        columns,
        from,
        joins,
        where_clause,
        order_by,
        limit: s.limit,
    })
}

fn walk_insert<R: Rewrite>(r: &mut R, i: Insert) -> SqlResult<Insert> {
    let table = r.rewrite_table_name(i.table)?;
    let mut values = Vec::with_capacity(i.values.len());
    for row in i.values {
        let mut new_row = Vec::with_capacity(row.len());
        for expr in row {
            new_row.push(r.rewrite_expr(expr)?);
        }
        values.push(new_row);
    }
    Ok(Insert {
        or_replace: i.or_replace,
        table,
        columns: i.columns,
        values,
    })
}

fn walk_update<R: Rewrite>(r: &mut R, u: Update) -> SqlResult<Update> {
    let table = r.rewrite_table_name(u.table)?;
    let mut assignments = catena_types::OrderedMap::new();
    for (name, expr) in u.assignments {
        assignments.insert(name, r.rewrite_expr(expr)?);
    }
    let where_clause = match u.where_clause {
        Some(e) => Some(r.rewrite_expr(e)?),
        None => None,
    };
    Ok(Update {
        table,
        assignments,
        where_clause,
    })
}

fn walk_delete<R: Rewrite>(r: &mut R, d: Delete) -> SqlResult<Delete> {
    let table = r.rewrite_table_name(d.table)?;
    let where_clause = match d.where_clause {
        Some(e) => Some(r.rewrite_expr(e)?),
        None => None,
    };
    Ok(Delete { table, where_clause })
}

fn walk_expr_generic<R: Rewrite>(r: &mut R, expr: Expr) -> SqlResult<Expr> {
    Ok(match expr {
        Expr::Column { table, name } => Expr::Column {
            table,
            name: r.rewrite_column_name(name)?,
        },
        Expr::Unary(op, inner) => Expr::Unary(op, Box::new(r.rewrite_expr(*inner)?)),
        Expr::Binary(op, l, rhs) => Expr::Binary(
            op,
            Box::new(r.rewrite_expr(*l)?),
            Box::new(r.rewrite_expr(*rhs)?),
        ),
        Expr::IsNull(inner) => Expr::IsNull(Box::new(r.rewrite_expr(*inner)?)),
        Expr::Call { name, args } => {
            let mut new_args = Vec::with_capacity(args.len());
            for a in args {
                new_args.push(r.rewrite_expr(a)?);
            }
            Expr::Call {
                name,
                args: new_args,
            }
        }
        Expr::Case {
            branches,
            else_branch,
        } => {
            let mut new_branches = Vec::with_capacity(branches.len());
            for (cond, value) in branches {
                new_branches.push((r.rewrite_expr(cond)?, r.rewrite_expr(value)?));
            }
            let else_branch = match else_branch {
                Some(e) => Some(Box::new(r.rewrite_expr(*e)?)),
                None => None,
            };
            Expr::Case {
                branches: new_branches,
                else_branch,
            }
        }
        Expr::Exists(select) => Expr::Exists(Box::new(walk_select(r, *select)?)),
        Expr::BoundParameter { name, value } => Expr::BoundParameter {
            name,
            value: Box::new(r.rewrite_expr(*value)?),
        },
        other => other,
    })
}

/// Resolves `$variable` references a client already has values for (e.g.
/// `$invoker`, filled in from the signing identity). Any variable not in
/// `bindings` is left untouched for the backend to resolve later.
pub struct FrontendVisitor {
    pub bindings: HashMap<String, Expr>,
}

impl FrontendVisitor {
    pub fn new(bindings: HashMap<String, Expr>) -> Self {
        Self { bindings }
    }

    pub fn visit(&mut self, stmt: Statement) -> SqlResult<Statement> {
        walk_statement(self, stmt)
    }
}

impl Rewrite for FrontendVisitor {
    fn rewrite_expr(&mut self, expr: Expr) -> SqlResult<Expr> {
        if let Expr::Variable(name) = &expr {
            if let Some(value) = self.bindings.get(name) {
                return Ok(value.clone());
            }
            return Ok(expr);
        }
        walk_expr_generic(self, expr)
    }
}

/// Resolves every remaining `$variable` and `?parameter`, rejects functions
/// outside the whitelist, and renames identifiers for the physical backend:
/// `T` becomes `<db>$T` so tables from distinct logical databases sharing
/// one physical SQLite file cannot collide, and the reserved `rowid`/`oid`
/// column names become `$rowid`/`$oid` so user tables can never shadow them.
pub struct BackendVisitor<'a> {
    database: &'a str,
    variables: HashMap<String, Expr>,
    parameters: HashMap<String, Expr>,
}

impl<'a> BackendVisitor<'a> {
    pub fn new(
        database: &'a str,
        variables: HashMap<String, Expr>,
        parameters: HashMap<String, Expr>,
    ) -> Self {
        Self {
            database,
            variables,
            parameters,
        }
    }

    pub fn visit(&mut self, stmt: Statement) -> SqlResult<Statement> {
        walk_statement(self, stmt)
    }
}

impl<'a> Rewrite for BackendVisitor<'a> {
    fn rewrite_expr(&mut self, expr: Expr) -> SqlResult<Expr> {
        match expr {
            Expr::Variable(name) => self
                .variables
                .get(&name)
                .cloned()
                .ok_or(SqlError::UnboundParameter(name)),
            Expr::UnboundParameter(name) => self
                .parameters
                .get(&name)
                .cloned()
                .ok_or_else(|| SqlError::UnboundParameter(name.clone())),
            Expr::BoundParameter { name, value } => {
                let resolved = self.rewrite_expr(*value)?;
                match self.parameters.get(&name) {
                    Some(existing) if existing != &resolved => {
                        Err(SqlError::InconsistentParameter(name))
                    }
                    Some(_) => Ok(resolved),
                    None => {
                        self.parameters.insert(name, resolved.clone());
                        Ok(resolved)
                    }
                }
            }
            Expr::Call { name, args } => {
                if !ALLOWED_FUNCTIONS.contains(&name.as_str()) {
                    return Err(SqlError::UnknownFunction(name));
                }
                let mut new_args = Vec::with_capacity(args.len());
                for a in args {
                    new_args.push(self.rewrite_expr(a)?);
                }
                Ok(Expr::Call {
                    name,
                    args: new_args,
                })
            }
            other => walk_expr_generic(self, other),
        }
    }

    fn rewrite_table_name(&mut self, name: String) -> SqlResult<String> {
        Ok(format!("{}${}", self.database, escape_reserved_prefix(&name)))
    }

    fn rewrite_column_name(&mut self, name: String) -> SqlResult<String> {
        Ok(match name.as_str() {
            "rowid" => "$rowid".to_string(),
            "oid" => "$oid".to_string(),
            _ => name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;

    #[test]
    fn frontend_visitor_resolves_known_variable_only() {
        let stmt = parse_statement("SELECT * FROM t WHERE owner = $invoker AND x = $other").unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("invoker".to_string(), Expr::LiteralString("abc".into()));
        let mut visitor = FrontendVisitor::new(bindings);
        let rewritten = visitor.visit(stmt).unwrap();
        let rendered = crate::dialect::render_statement(&rewritten, crate::dialect::Dialect::Standard);
        assert!(rendered.contains("'abc'"));
        assert!(rendered.contains("$other"));
    }

    #[test]
    fn backend_visitor_renames_table_and_reserved_columns() {
        let stmt = parse_statement("SELECT rowid FROM accounts").unwrap();
        let mut visitor = BackendVisitor::new("mydb", HashMap::new(), HashMap::new());
        let rewritten = visitor.visit(stmt).unwrap();
        match rewritten {
            Statement::Select(s) => {
                assert_eq!(s.from.unwrap().name, "mydb$accounts");
                match &s.columns[0] {
                    SelectItem::Expr { expr, .. } => {
                        assert_eq!(
                            expr,
                            &Expr::Column {
                                table: None,
                                name: "$rowid".into()
                            }
                        );
                    }
                    _ => panic!("expected expr column"),
                }
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn backend_visitor_rejects_disallowed_function() {
        let stmt = parse_statement("SELECT UPPER(name) FROM t").unwrap();
        let mut visitor = BackendVisitor::new("db", HashMap::new(), HashMap::new());
        let err = visitor.visit(stmt).unwrap_err();
        assert!(matches!(err, SqlError::UnknownFunction(_)));
    }

    #[test]
    fn backend_visitor_resolves_consistent_bound_parameter() {
        let stmt =
            parse_statement("SELECT * FROM t WHERE a = ?id:1 AND b = ?id:1").unwrap();
        let mut visitor = BackendVisitor::new("db", HashMap::new(), HashMap::new());
        let rewritten = visitor.visit(stmt).unwrap();
        let rendered =
            crate::dialect::render_statement(&rewritten, crate::dialect::Dialect::Backend);
        assert!(!rendered.contains('?'));
    }

    #[test]
    fn backend_visitor_rejects_inconsistent_bound_parameter() {
        let stmt =
            parse_statement("SELECT * FROM t WHERE a = ?id:1 AND b = ?id:2").unwrap();
        let mut visitor = BackendVisitor::new("db", HashMap::new(), HashMap::new());
        let err = visitor.visit(stmt).unwrap_err();
        assert!(matches!(err, SqlError::InconsistentParameter(_)));
    }

    #[test]
    fn backend_visitor_escapes_reserved_sqlite_prefix() {
        let stmt = parse_statement("SELECT * FROM sqlite_stat1").unwrap();
        let mut visitor = BackendVisitor::new("db", HashMap::new(), HashMap::new());
        let rewritten = visitor.visit(stmt).unwrap();
        match rewritten {
            Statement::Select(s) => {
                assert_eq!(s.from.unwrap().name, "db$sqlite$_stat1");
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn backend_visitor_errors_on_unbound_variable() {
        let stmt = parse_statement("SELECT * FROM t WHERE owner = $invoker").unwrap();
        let mut visitor = BackendVisitor::new("db", HashMap::new(), HashMap::new());
        let err = visitor.visit(stmt).unwrap_err();
        assert!(matches!(err, SqlError::UnboundParameter(_)));
    }
}
