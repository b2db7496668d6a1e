//! Canonical rendering. The same AST renders differently depending on
//! `Dialect`: `Standard` is the dialect used for template hashing (§4.2) —
//! always unbound, always from the pre-rewrite AST — while `Backend` is
//! what actually reaches the `Database` capability after the backend
//! visitor has substituted variables and renamed identifiers.

use std::fmt::Write as _;

use crate::ast::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Standard,
    Backend,
}

/// Renders a statement to its canonical text form. Deterministic: same AST,
/// same dialect, same string, every time — this is the property the
/// template hash in §4.2 depends on.
pub fn render_statement(stmt: &Statement, dialect: Dialect) -> String {
    let mut out = String::new();
    write_statement(&mut out, stmt, dialect);
    out
}

/// `BackendVisitor` mangles the rowid/oid pseudo-columns to `$rowid`/`$oid`
/// (§4.2) so user tables can never shadow them, but no physical column by
/// that name exists — SQLite's own rowid alias is spelled `rowid`/`oid`.
/// Undo the mangling at render time so the text we hand the backend
/// connection refers to something that actually exists.
fn physical_column_name(name: &str) -> &str {
    match name {
        "$rowid" => "rowid",
        "$oid" => "oid",
        other => other,
    }
}

/// Writes one identifier (table or column name). `<db>$table` and the
/// rowid/oid pseudo-columns only ever appear in the `Backend` dialect, and
/// `$` isn't a valid bare-identifier character to SQLite's own tokenizer —
/// it reads as the start of a bind parameter — so every identifier is
/// double-quoted there. `Standard` never carries a mangled name (it always
/// renders the pre-rewrite AST), so it's left bare, matching the existing
/// round-trip-through-reparse tests.
fn write_ident(out: &mut String, name: &str, d: Dialect) {
    let name = physical_column_name(name);
    match d {
        Dialect::Backend => {
            out.push('"');
            for ch in name.chars() {
                if ch == '"' {
                    out.push('"');
                }
                out.push(ch);
            }
            out.push('"');
        }
        Dialect::Standard => out.push_str(name),
    }
}

fn write_statement(out: &mut String, stmt: &Statement, d: Dialect) {
    match stmt {
        Statement::Select(s) => write_select(out, s, d),
        Statement::Insert(i) => write_insert(out, i, d),
        Statement::Update(u) => write_update(out, u, d),
        Statement::Delete(del) => write_delete(out, del, d),
        Statement::CreateTable(c) => write_create_table(out, c, d),
        Statement::DropTable(t) => {
            out.push_str("DROP TABLE ");
            write_ident(out, &t.table, d);
        }
        Statement::CreateIndex(c) => {
            write!(out, "CREATE INDEX {} ON ", c.name).ok();
            write_ident(out, &c.table, d);
            out.push_str(" (");
            for (i, col) in c.columns.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_ident(out, col, d);
            }
            out.push(')');
        }
        Statement::CreateDatabase(c) => {
            write!(out, "CREATE DATABASE {}", c.name).ok();
        }
        Statement::DropDatabase(c) => {
            write!(out, "DROP DATABASE {}", c.name).ok();
        }
        Statement::Grant(g) => write_grant_like(out, "GRANT", g.privilege, &g.table, &g.user),
        Statement::Revoke(r) => write_grant_like(out, "REVOKE", r.privilege, &r.table, &r.user),
        Statement::GrantTemplate(g) => write_grant_template(out, "GRANT", &g.hash, &g.user),
        Statement::RevokeTemplate(r) => write_grant_template(out, "REVOKE", &r.hash, &r.user),
        Statement::Show(s) => write_show(out, s),
        Statement::Describe(desc) => {
            write!(out, "DESCRIBE {}", desc.table).ok();
        }
        Statement::If(if_stmt) => write_if(out, if_stmt, d),
        Statement::Block(stmts) => {
            out.push_str("DO ");
            for s in stmts {
                write_statement(out, s, d);
                out.push_str("; ");
            }
            out.push_str("END");
        }
        Statement::Fail => out.push_str("FAIL"),
    }
}

fn privilege_name(p: GrantPrivilegeKind) -> &'static str {
    match p {
        GrantPrivilegeKind::Create => "CREATE",
        GrantPrivilegeKind::Delete => "DELETE",
        GrantPrivilegeKind::Drop => "DROP",
        GrantPrivilegeKind::Insert => "INSERT",
        GrantPrivilegeKind::Update => "UPDATE",
        GrantPrivilegeKind::Grant => "GRANT",
    }
}

fn write_grant_like(
    out: &mut String,
    verb: &str,
    privilege: GrantPrivilegeKind,
    table: &Option<String>,
    user: &Option<Vec<u8>>,
) {
    write!(out, "{} {}", verb, privilege_name(privilege)).ok();
    if let Some(t) = table {
        write!(out, " ON {}", t).ok();
    }
    write_user_clause(out, verb, user);
}

fn write_grant_template(out: &mut String, verb: &str, hash: &catena_types::Hash, user: &Option<Vec<u8>>) {
    write!(out, "{} TEMPLATE X'{}'", verb, hash.to_hex()).ok();
    write_user_clause(out, verb, user);
}

/// `TO`/`FROM X'hex'|PUBLIC` — always quoted as an `X'...'` blob literal so
/// the rendering round-trips back through the lexer (a bare hex string would
/// tokenize as an identifier or number, not the `Blob` the parser expects).
fn write_user_clause(out: &mut String, verb: &str, user: &Option<Vec<u8>>) {
    match user {
        Some(u) => {
            write!(out, " {} X'{}'", if verb == "GRANT" { "TO" } else { "FROM" }, hex::encode(u)).ok();
        }
        None => {
            write!(out, " {} PUBLIC", if verb == "GRANT" { "TO" } else { "FROM" }).ok();
        }
    };
}

fn write_show(out: &mut String, show: &Show) {
    match show {
        Show::Tables => out.push_str("SHOW TABLES"),
        Show::Databases { for_user } => {
            out.push_str("SHOW DATABASES");
            match for_user {
                Some(u) => {
                    write!(out, " TO X'{}'", hex::encode(u)).ok();
                }
                None => out.push_str(" TO PUBLIC"),
            };
        }
        Show::Grants => out.push_str("SHOW GRANTS"),
        Show::All => out.push_str("SHOW ALL"),
    }
}

fn write_if(out: &mut String, if_stmt: &If, d: Dialect) {
    for (i, branch) in if_stmt.branches.iter().enumerate() {
        write!(out, "{} ", if i == 0 { "IF" } else { "ELSEIF" }).ok();
        write_expr(out, &branch.condition, d);
        out.push_str(" THEN ");
        write_statement(out, &branch.then_branch, d);
        out.push(' ');
    }
    if let Some(else_branch) = &if_stmt.else_branch {
        out.push_str("ELSE ");
        write_statement(out, else_branch, d);
        out.push(' ');
    }
    out.push_str("END");
}

fn write_create_table(out: &mut String, c: &CreateTable, d: Dialect) {
    out.push_str("CREATE TABLE ");
    write_ident(out, &c.table, d);
    out.push_str(" (");
    let mut first = true;
    for (name, def) in c.columns.iter() {
        if !first {
            out.push_str(", ");
        }
        first = false;
        let ty = match def.ty {
            ColumnType::Text => "TEXT",
            ColumnType::Int => "INT",
            ColumnType::Blob => "BLOB",
        };
        write_ident(out, name, d);
        write!(out, " {}", ty).ok();
        if def.primary_key {
            out.push_str(" PRIMARY KEY");
        }
    }
    out.push(')');
}

fn write_table_ref(out: &mut String, t: &TableRef, d: Dialect) {
    write_ident(out, &t.name, d);
    if let Some(alias) = &t.alias {
        write!(out, " {}", alias).ok();
    }
}

fn write_select(out: &mut String, s: &Select, d: Dialect) {
    out.push_str("SELECT ");
    if s.distinct {
        out.push_str("DISTINCT ");
    }
    for (i, col) in s.columns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match col {
            SelectItem::All => out.push('*'),
            SelectItem::AllOf(t) => {
                write!(out, "{}.*", t).ok();
            }
            SelectItem::Expr { expr, alias } => {
                write_expr(out, expr, d);
                if let Some(a) = alias {
                    write!(out, " AS {}", a).ok();
                }
            }
        }
    }
    if let Some(from) = &s.from {
        out.push_str(" FROM ");
        write_table_ref(out, from, d);
    }
    for join in &s.joins {
        out.push_str(" LEFT JOIN ");
        write_table_ref(out, &join.table, d);
        out.push_str(" ON ");
        write_expr(out, &join.on, d);
    }
    if let Some(w) = &s.where_clause {
        out.push_str(" WHERE ");
        write_expr(out, w, d);
    }
    if !s.order_by.is_empty() {
        out.push_str(" ORDER BY ");
        for (i, item) in s.order_by.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write_expr(out, &item.expr, d);
            if item.desc {
                out.push_str(" DESC");
            }
        }
    }
    if let Some(limit) = s.limit {
        write!(out, " LIMIT {}", limit).ok();
    }
}

fn write_insert(out: &mut String, i: &Insert, d: Dialect) {
    out.push_str(if i.or_replace {
        "INSERT OR REPLACE INTO "
    } else {
        "INSERT INTO "
    });
    write_ident(out, &i.table, d);
    if !i.columns.is_empty() {
        out.push_str(" (");
        for (idx, col) in i.columns.iter().enumerate() {
            if idx > 0 {
                out.push_str(", ");
            }
            write_ident(out, col, d);
        }
        out.push(')');
    }
    out.push_str(" VALUES ");
    for (row_idx, row) in i.values.iter().enumerate() {
        if row_idx > 0 {
            out.push_str(", ");
        }
        out.push('(');
        for (j, expr) in row.iter().enumerate() {
            if j > 0 {
                out.push_str(", ");
            }
            write_expr(out, expr, d);
        }
        out.push(')');
    }
}

fn write_update(out: &mut String, u: &Update, d: Dialect) {
    out.push_str("UPDATE ");
    write_ident(out, &u.table, d);
    out.push_str(" SET ");
    for (i, (name, expr)) in u.assignments.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_ident(out, name, d);
        out.push_str(" = ");
        write_expr(out, expr, d);
    }
    if let Some(w) = &u.where_clause {
        out.push_str(" WHERE ");
        write_expr(out, w, d);
    }
}

fn write_delete(out: &mut String, del: &Delete, d: Dialect) {
    out.push_str("DELETE FROM ");
    write_ident(out, &del.table, d);
    if let Some(w) = &del.where_clause {
        out.push_str(" WHERE ");
        write_expr(out, w, d);
    }
}

fn write_expr(out: &mut String, expr: &Expr, d: Dialect) {
    match expr {
        Expr::LiteralInt(n) => {
            write!(out, "{}", n).ok();
        }
        Expr::LiteralString(s) => {
            write!(out, "'{}'", s.replace('\'', "''")).ok();
        }
        Expr::LiteralBlob(b) => {
            write!(out, "x'{}'", hex::encode(b)).ok();
        }
        Expr::Null => out.push_str("NULL"),
        Expr::Column { table, name } => {
            if let Some(t) = table {
                write!(out, "{}.", t).ok();
            }
            write_ident(out, name, d);
        }
        Expr::AllColumns { table } => match table {
            Some(t) => {
                write!(out, "{}.*", t).ok();
            }
            None => out.push('*'),
        },
        Expr::Variable(name) => {
            write!(out, "${}", name).ok();
        }
        Expr::UnboundParameter(name) => {
            write!(out, "?{}", name).ok();
        }
        // Bound parameters only ever reach the renderer pre-rewrite (the
        // backend visitor replaces them with literals before anything is
        // rendered for execution), so the standard-dialect text always
        // shows the unbound shape — this is what makes two statements that
        // differ only in bound values share a template hash (§4.2, §9).
        Expr::BoundParameter { name, .. } => {
            write!(out, "?{}", name).ok();
        }
        Expr::Unary(op, inner) => {
            match op {
                UnaryOp::Neg => out.push('-'),
                UnaryOp::Not => out.push_str("NOT "),
            }
            write_expr(out, inner, d);
        }
        Expr::Binary(op, l, r) => {
            out.push('(');
            write_expr(out, l, d);
            write!(out, " {} ", binary_op_text(*op)).ok();
            write_expr(out, r, d);
            out.push(')');
        }
        Expr::IsNull(inner) => {
            write_expr(out, inner, d);
            out.push_str(" IS NULL");
        }
        Expr::Call { name, args } => {
            write!(out, "{}(", name.to_uppercase()).ok();
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, a, d);
            }
            out.push(')');
        }
        Expr::Case {
            branches,
            else_branch,
        } => {
            out.push_str("CASE ");
            for (cond, value) in branches {
                out.push_str("WHEN ");
                write_expr(out, cond, d);
                out.push_str(" THEN ");
                write_expr(out, value, d);
                out.push(' ');
            }
            if let Some(e) = else_branch {
                out.push_str("ELSE ");
                write_expr(out, e, d);
                out.push(' ');
            }
            out.push_str("END");
        }
        Expr::Exists(select) => {
            out.push_str("EXISTS (");
            write_select(out, select, d);
            out.push(')');
        }
    }
}

fn binary_op_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Concat => "||",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_statement;

    #[test]
    fn render_is_deterministic() {
        let stmt = parse_statement("SELECT a, b FROM t WHERE a = 1").unwrap();
        let first = render_statement(&stmt, Dialect::Standard);
        let second = render_statement(&stmt, Dialect::Standard);
        assert_eq!(first, second);
    }

    #[test]
    fn render_round_trips_through_reparse() {
        let stmt = parse_statement("SELECT * FROM accounts WHERE balance > 0 AND owner = $invoker")
            .unwrap();
        let rendered = render_statement(&stmt, Dialect::Standard);
        let reparsed = parse_statement(&rendered).unwrap();
        assert_eq!(stmt, reparsed);
    }

    #[test]
    fn unbound_parameter_renders_with_question_mark() {
        let stmt = parse_statement("SELECT * FROM t WHERE id = ?id").unwrap();
        let rendered = render_statement(&stmt, Dialect::Standard);
        assert!(rendered.contains("?id"));
    }

    #[test]
    fn grant_template_round_trips_through_reparse() {
        let hash = "44".repeat(32);
        let stmt =
            parse_statement(&format!("GRANT TEMPLATE X'{}' TO PUBLIC", hash)).unwrap();
        let rendered = render_statement(&stmt, Dialect::Standard);
        let reparsed = parse_statement(&rendered).unwrap();
        assert_eq!(stmt, reparsed);
    }

    #[test]
    fn grant_to_specific_user_round_trips_through_reparse() {
        let user = "66".repeat(32);
        let stmt =
            parse_statement(&format!("GRANT INSERT ON accounts TO X'{}'", user)).unwrap();
        let rendered = render_statement(&stmt, Dialect::Standard);
        let reparsed = parse_statement(&rendered).unwrap();
        assert_eq!(stmt, reparsed);
    }

    #[test]
    fn revoke_template_round_trips_through_reparse() {
        let hash = "55".repeat(32);
        let stmt =
            parse_statement(&format!("REVOKE TEMPLATE X'{}' FROM PUBLIC", hash)).unwrap();
        let rendered = render_statement(&stmt, Dialect::Standard);
        let reparsed = parse_statement(&rendered).unwrap();
        assert_eq!(stmt, reparsed);
    }

    #[test]
    fn backend_dialect_quotes_scoped_table_and_rowid_alias() {
        use crate::visitor::BackendVisitor;
        use std::collections::HashMap;

        let stmt = parse_statement("SELECT rowid, oid FROM accounts").unwrap();
        let mut visitor = BackendVisitor::new("mydb", HashMap::new(), HashMap::new());
        let rewritten = visitor.visit(stmt).unwrap();
        let rendered = render_statement(&rewritten, Dialect::Backend);

        assert!(rendered.contains("\"mydb$accounts\""));
        assert!(rendered.contains("\"rowid\""));
        assert!(rendered.contains("\"oid\""));
        assert!(!rendered.contains('$'), "rendered SQL must not carry a bare '$', which SQLite's tokenizer reads as a bind parameter: {rendered}");
    }

    #[test]
    fn backend_dialect_leaves_standard_rendering_bare() {
        let stmt = parse_statement("SELECT a FROM t").unwrap();
        let rendered = render_statement(&stmt, Dialect::Standard);
        assert!(rendered.contains("FROM t"));
        assert!(!rendered.contains('"'));
    }
}
