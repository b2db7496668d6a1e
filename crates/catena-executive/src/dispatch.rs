//! Authorization (§4.4 steps 1-4) and dispatch (§4.4 "Dispatch") — the
//! executive proper. Everything else in this crate (context, metadata,
//! verify, result) is plumbing this module ties together.

use catena_db::Value;
use catena_grants::{check, check_template, required_privileges};
use catena_sql::{
    render_statement, template_hash, BackendVisitor, Dialect, Expr, GrantPrivilegeKind, Select,
    SelectItem, Show, Statement,
};
use futures::future::{BoxFuture, FutureExt};

use crate::context::ExecutionContext;
use crate::error::{ExecutiveError, ExecutiveResult};
use crate::metadata::{database_owner, delete_grant, hex_literal, insert_grant, load_grants};
use crate::result::{unmangle_rows, ExecutionOutcome};
use crate::verify;

fn sql_string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn to_grant_kind(p: GrantPrivilegeKind) -> catena_grants::PrivilegeKind {
    p.into()
}

/// Runs the full authorize-then-dispatch pipeline for one statement (§4.4).
/// `template_granted` starts `false` at the top of a transaction and is
/// threaded (once it becomes `true`) down into every `IF`/`DO` sub-statement
/// so a single outer grant covers the whole nested shape (§4.3, §4.4, §9).
pub fn execute<'a>(
    ctx: &'a ExecutionContext<'a>,
    stmt: &'a Statement,
    template_granted: bool,
) -> BoxFuture<'a, ExecutiveResult<ExecutionOutcome>> {
    async move {
        let template_granted = authorize(ctx, stmt, template_granted).await?;
        dispatch(ctx, stmt, template_granted).await
    }
    .boxed()
}

/// §4.4 steps 1-4.
async fn authorize(
    ctx: &ExecutionContext<'_>,
    stmt: &Statement,
    template_granted: bool,
) -> ExecutiveResult<bool> {
    if stmt.requires_database_context() && ctx.database.is_empty() {
        return Err(ExecutiveError::RequiresDatabaseContext);
    }

    let mut template_granted = template_granted;
    if !template_granted {
        let hash = template_hash(stmt);
        let grants = load_grants(ctx.db, &ctx.database).await?;
        template_granted = check_template(&grants, hash, ctx.invoker, &ctx.database);
    }
    if template_granted {
        return Ok(true);
    }

    let privileges = required_privileges(stmt);
    if !privileges.is_empty() {
        let grants = load_grants(ctx.db, &ctx.database).await?;
        if !check(&grants, &privileges, ctx.invoker, &ctx.database) {
            return Err(ExecutiveError::PrivilegeRequired);
        }
        return Ok(false);
    }

    // No privileges declared (§4.4 step 4). Read statements and
    // database-scoped `IF`/`DO` pass straight through; `FAIL` is always
    // allowed to run (it only ever fails); `CREATE/DROP DATABASE` defer
    // their ownership checks to dispatch, which is where the `databases`
    // metadata row actually lives.
    if stmt.is_mutating() && ctx.database.is_empty() {
        match stmt {
            Statement::CreateDatabase(_) | Statement::DropDatabase(_) | Statement::Fail => {}
            _ => return Err(ExecutiveError::PrivilegeRequired),
        }
    }
    Ok(false)
}

fn dispatch<'a>(
    ctx: &'a ExecutionContext<'a>,
    stmt: &'a Statement,
    template_granted: bool,
) -> BoxFuture<'a, ExecutiveResult<ExecutionOutcome>> {
    async move {
        match stmt {
            Statement::Fail => Err(ExecutiveError::ExecutionFailed),
            Statement::If(if_stmt) => {
                for branch in &if_stmt.branches {
                    if !branch.then_branch.is_mutating() {
                        return Err(ExecutiveError::ExecutionFailed);
                    }
                    if eval_condition(ctx, &branch.condition).await? {
                        return execute(ctx, &branch.then_branch, template_granted).await;
                    }
                }
                match &if_stmt.else_branch {
                    Some(else_branch) => execute(ctx, else_branch, template_granted).await,
                    None => Err(ExecutiveError::ExecutionFailed),
                }
            }
            Statement::Block(stmts) => {
                let mut last = None;
                for s in stmts {
                    last = Some(execute(ctx, s, template_granted).await?);
                }
                last.ok_or(ExecutiveError::ExecutionFailed)
            }
            Statement::CreateDatabase(c) => {
                if database_owner(ctx.db, &c.name).await?.is_some() {
                    return Err(ExecutiveError::DatabaseAlreadyExists(c.name.clone()));
                }
                let sql = format!(
                    "INSERT INTO databases (name, owner) VALUES ({}, {})",
                    sql_string_literal(&c.name),
                    hex_literal(ctx.invoker.as_bytes()),
                );
                Ok(ctx.db.execute(&sql).await?.into())
            }
            Statement::DropDatabase(d) => {
                let owner = database_owner(ctx.db, &d.name)
                    .await?
                    .ok_or_else(|| ExecutiveError::DatabaseDoesNotExist(d.name.clone()))?;
                if owner != ctx.invoker {
                    return Err(ExecutiveError::PrivilegeRequired);
                }
                let prefix = format!("{}$", d.name);
                let remaining = ctx
                    .db
                    .list_tables()
                    .await?
                    .into_iter()
                    .any(|t| t.starts_with(&prefix));
                if remaining {
                    return Err(ExecutiveError::DatabaseNotEmpty(d.name.clone()));
                }
                let sql = format!("DELETE FROM databases WHERE name = {}", sql_string_literal(&d.name));
                Ok(ctx.db.execute(&sql).await?.into())
            }
            Statement::Grant(g) => {
                insert_grant(
                    ctx.db,
                    g.user.as_deref(),
                    &to_grant_kind(g.privilege),
                    g.table.as_deref(),
                    &ctx.database,
                )
                .await?;
                Ok(ExecutionOutcome::Affected {
                    rows_affected: 1,
                    last_insert_rowid: 0,
                })
            }
            Statement::Revoke(r) => {
                delete_grant(
                    ctx.db,
                    r.user.as_deref(),
                    &to_grant_kind(r.privilege),
                    r.table.as_deref(),
                    &ctx.database,
                )
                .await?;
                Ok(ExecutionOutcome::Affected {
                    rows_affected: 1,
                    last_insert_rowid: 0,
                })
            }
            Statement::GrantTemplate(g) => {
                insert_grant(
                    ctx.db,
                    g.user.as_deref(),
                    &catena_grants::PrivilegeKind::Template(g.hash),
                    None,
                    &ctx.database,
                )
                .await?;
                Ok(ExecutionOutcome::Affected {
                    rows_affected: 1,
                    last_insert_rowid: 0,
                })
            }
            Statement::RevokeTemplate(r) => {
                delete_grant(
                    ctx.db,
                    r.user.as_deref(),
                    &catena_grants::PrivilegeKind::Template(r.hash),
                    None,
                    &ctx.database,
                )
                .await?;
                Ok(ExecutionOutcome::Affected {
                    rows_affected: 1,
                    last_insert_rowid: 0,
                })
            }
            Statement::Show(show) => dispatch_show(ctx, show).await,
            Statement::Describe(d) => dispatch_describe(ctx, &d.table).await,
            _ => run_backend_statement(ctx, stmt).await,
        }
    }
    .boxed()
}

/// The default path (§4.4 closing bullet): backend-visit, statically
/// verify, render to backend SQL, execute.
async fn run_backend_statement(
    ctx: &ExecutionContext<'_>,
    stmt: &Statement,
) -> ExecutiveResult<ExecutionOutcome> {
    let variables = ctx.builtin_variables();
    let mut visitor = BackendVisitor::new(&ctx.database, variables, ctx.parameter_values.clone());
    let rewritten = visitor.visit(stmt.clone())?;
    verify::verify(&rewritten, ctx.db).await?;
    let sql = render_statement(&rewritten, Dialect::Backend);
    match &rewritten {
        Statement::Select(_) => {
            let rows = ctx.db.query(&sql).await?;
            Ok(ExecutionOutcome::Rows(unmangle_rows(rows)))
        }
        _ => Ok(ctx.db.execute(&sql).await?.into()),
    }
}

/// Evaluates an `IF` branch's condition as `SELECT CASE WHEN <cond> THEN 1
/// ELSE 0 END` using the backend visitor (§4.4 "Dispatch").
async fn eval_condition(ctx: &ExecutionContext<'_>, condition: &Expr) -> ExecutiveResult<bool> {
    let select = Statement::Select(Select {
        distinct: false,
        columns: vec![SelectItem::Expr {
            expr: Expr::Case {
                branches: vec![(condition.clone(), Expr::LiteralInt(1))],
                else_branch: Some(Box::new(Expr::LiteralInt(0))),
            },
            alias: None,
        }],
        from: None,
        joins: Vec::new(),
        where_clause: None,
        order_by: Vec::new(),
        limit: None,
    });
    let variables = ctx.builtin_variables();
    let mut visitor = BackendVisitor::new(&ctx.database, variables, ctx.parameter_values.clone());
    let rewritten = visitor.visit(select)?;
    let sql = render_statement(&rewritten, Dialect::Backend);
    let rows = ctx.db.query(&sql).await?;
    let truthy = rows
        .first()
        .and_then(|r| r.values.first())
        .map(|v| matches!(v, Value::Int(1)))
        .unwrap_or(false);
    Ok(truthy)
}

/// `DESCRIBE t` (§4.4): the physical, backend-scoped column layout of a
/// user table, reported back under its frontend (unscoped) column names.
async fn dispatch_describe(ctx: &ExecutionContext<'_>, table: &str) -> ExecutiveResult<ExecutionOutcome> {
    let backend_table = format!("{}${}", ctx.database, table);
    if !ctx.db.table_exists(&backend_table).await? {
        return Err(ExecutiveError::TableDoesNotExist(table.to_string()));
    }
    let columns = ctx.db.table_columns(&backend_table).await?;
    let rows = columns
        .into_iter()
        .map(|c| catena_db::Row {
            columns: vec!["name".to_string(), "type".to_string(), "primary_key".to_string()],
            values: vec![
                Value::Text(match c.name.as_str() {
                    "$rowid" => "rowid".to_string(),
                    "$oid" => "oid".to_string(),
                    _ => c.name,
                }),
                Value::Text(c.type_name),
                Value::Int(c.primary_key as i64),
            ],
        })
        .collect();
    Ok(ExecutionOutcome::Rows(rows))
}

/// `SHOW {TABLES|DATABASES|GRANTS|ALL}` (§4.4, §6) — backed by metadata
/// tables or backend schema introspection; column layout fixed per-variant.
async fn dispatch_show(ctx: &ExecutionContext<'_>, show: &Show) -> ExecutiveResult<ExecutionOutcome> {
    match show {
        Show::Tables => {
            let prefix = format!("{}$", ctx.database);
            let rows = ctx
                .db
                .list_tables()
                .await?
                .into_iter()
                .filter_map(|t| t.strip_prefix(&prefix).map(str::to_string))
                .map(|name| catena_db::Row {
                    columns: vec!["name".to_string()],
                    values: vec![Value::Text(name)],
                })
                .collect();
            Ok(ExecutionOutcome::Rows(rows))
        }
        Show::Databases { for_user } => {
            let sql = match for_user {
                Some(u) => format!("SELECT name, owner FROM databases WHERE owner = {}", hex_literal(u)),
                None => "SELECT name, owner FROM databases".to_string(),
            };
            let rows = ctx.db.query(&sql).await?;
            Ok(ExecutionOutcome::Rows(rows))
        }
        Show::Grants => {
            let grants = load_grants(ctx.db, &ctx.database).await?;
            let rows = grants
                .into_iter()
                .map(|g| catena_db::Row {
                    columns: vec![
                        "user".to_string(),
                        "kind".to_string(),
                        "table".to_string(),
                        "database".to_string(),
                    ],
                    values: vec![
                        g.user
                            .map(|h| Value::Blob(h.as_bytes().to_vec()))
                            .unwrap_or(Value::Null),
                        Value::Text(format!("{:?}", g.kind)),
                        g.table.map(Value::Text).unwrap_or(Value::Null),
                        Value::Text(g.database),
                    ],
                })
                .collect();
            Ok(ExecutionOutcome::Rows(rows))
        }
        Show::All => {
            let rows = ctx.db.query("SELECT name, owner FROM databases").await?;
            Ok(ExecutionOutcome::Rows(rows))
        }
    }
}
