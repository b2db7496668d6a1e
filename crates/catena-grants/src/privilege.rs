use catena_types::Hash;
use catena_sql::{GrantPrivilegeKind, Statement};

/// `Kind ∈ {create, delete, drop, insert, update, grant, template(hash),
/// never}` (§4.3). `Never` is emitted for operations that must never be
/// user-executable regardless of any grant — currently only `CREATE INDEX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeKind {
    Create,
    Delete,
    Drop,
    Insert,
    Update,
    Grant,
    Template(Hash),
    Never,
}

impl From<GrantPrivilegeKind> for PrivilegeKind {
    fn from(kind: GrantPrivilegeKind) -> Self {
        match kind {
            GrantPrivilegeKind::Create => PrivilegeKind::Create,
            GrantPrivilegeKind::Delete => PrivilegeKind::Delete,
            GrantPrivilegeKind::Drop => PrivilegeKind::Drop,
            GrantPrivilegeKind::Insert => PrivilegeKind::Insert,
            GrantPrivilegeKind::Update => PrivilegeKind::Update,
            GrantPrivilegeKind::Grant => PrivilegeKind::Grant,
        }
    }
}

/// A single authorization token a statement requires to execute (§4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Privilege {
    pub kind: PrivilegeKind,
    pub table: Option<String>,
}

/// A row of the on-chain `grants` metadata table (§3). `user = None` is the
/// stored `NULL` meaning "any user."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRow {
    pub user: Option<Hash>,
    pub kind: PrivilegeKind,
    pub table: Option<String>,
    pub database: String,
}

/// The privileges a statement statically requires, read straight off its
/// shape (§4.3). Read statements (`SELECT`, `SHOW`, `DESCRIBE`) declare
/// none. `IF`/`DO`/`FAIL` also declare none at this level — their nested
/// statements are re-authorized individually as the executive recurses into
/// them (§4.4), rather than being flattened into one privilege set here.
/// `CREATE DATABASE`/`DROP DATABASE` and `GRANT`/`REVOKE` are handled by the
/// executive's ownership/self-service rules rather than grants-table
/// privileges, except that `GRANT`/`REVOKE` themselves require the `grant`
/// privilege on the table (if any) they target.
pub fn required_privileges(stmt: &Statement) -> Vec<Privilege> {
    match stmt {
        Statement::Select(_) | Statement::Show(_) | Statement::Describe(_) => Vec::new(),
        Statement::Insert(i) => vec![Privilege {
            kind: PrivilegeKind::Insert,
            table: Some(i.table.clone()),
        }],
        Statement::Update(u) => vec![Privilege {
            kind: PrivilegeKind::Update,
            table: Some(u.table.clone()),
        }],
        Statement::Delete(d) => vec![Privilege {
            kind: PrivilegeKind::Delete,
            table: Some(d.table.clone()),
        }],
        Statement::CreateTable(_) => vec![Privilege {
            kind: PrivilegeKind::Create,
            table: None,
        }],
        Statement::DropTable(t) => vec![Privilege {
            kind: PrivilegeKind::Drop,
            table: Some(t.table.clone()),
        }],
        // Index creation must never be satisfiable by a grant (§4.3).
        Statement::CreateIndex(c) => vec![Privilege {
            kind: PrivilegeKind::Never,
            table: Some(c.table.clone()),
        }],
        Statement::Grant(g) => vec![Privilege {
            kind: PrivilegeKind::Grant,
            table: g.table.clone(),
        }],
        Statement::Revoke(r) => vec![Privilege {
            kind: PrivilegeKind::Grant,
            table: r.table.clone(),
        }],
        Statement::GrantTemplate(_) | Statement::RevokeTemplate(_) => vec![Privilege {
            kind: PrivilegeKind::Grant,
            table: None,
        }],
        Statement::CreateDatabase(_)
        | Statement::DropDatabase(_)
        | Statement::If(_)
        | Statement::Block(_)
        | Statement::Fail => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_sql::parse_statement;

    #[test]
    fn insert_requires_insert_privilege_on_its_table() {
        let stmt = parse_statement("INSERT INTO accounts (id) VALUES (1)").unwrap();
        let privileges = required_privileges(&stmt);
        assert_eq!(
            privileges,
            vec![Privilege {
                kind: PrivilegeKind::Insert,
                table: Some("accounts".to_string())
            }]
        );
    }

    #[test]
    fn select_requires_nothing() {
        let stmt = parse_statement("SELECT * FROM accounts").unwrap();
        assert!(required_privileges(&stmt).is_empty());
    }

    #[test]
    fn create_index_requires_the_never_privilege() {
        let stmt = parse_statement("CREATE INDEX idx ON accounts (id)").unwrap();
        let privileges = required_privileges(&stmt);
        assert_eq!(privileges[0].kind, PrivilegeKind::Never);
    }
}
