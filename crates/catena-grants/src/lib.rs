//! Static privilege analysis of a statement, and the matching rule used to
//! look it up in the on-chain `grants` table (§4.3).
//!
//! This crate has no notion of a database connection: [`GrantRow`] is a
//! plain value the caller (`catena-executive`, backed by `catena-db`) fetches
//! however it likes, and [`check`] is a pure function over the rows that
//! happen to match `(invoker, database)` already fetched by the caller.

mod privilege;

pub use privilege::{required_privileges, GrantRow, Privilege, PrivilegeKind};

use catena_types::Hash;

/// Every privilege in `required` must be satisfied by at least one row in
/// `candidates` (§4.3). `candidates` is expected to already be filtered to
/// `database = database` by the caller's query — this function only applies
/// the user/kind/table matching rule on top, since that part does not
/// require revisiting the backend per privilege.
pub fn check(candidates: &[GrantRow], required: &[Privilege], invoker: Hash, database: &str) -> bool {
    required
        .iter()
        .all(|privilege| satisfied_by_any(candidates, privilege, invoker, database))
}

fn satisfied_by_any(candidates: &[GrantRow], privilege: &Privilege, invoker: Hash, database: &str) -> bool {
    if matches!(privilege.kind, PrivilegeKind::Never) {
        return false;
    }
    candidates.iter().any(|row| row_matches(row, privilege, invoker, database))
}

fn row_matches(row: &GrantRow, privilege: &Privilege, invoker: Hash, database: &str) -> bool {
    if row.database != database {
        return false;
    }
    let user_matches = match row.user {
        Some(granted_user) => granted_user == invoker,
        None => true, // a NULL user is a public grant
    };
    if !user_matches {
        return false;
    }
    if row.kind != privilege.kind {
        return false;
    }
    match (&row.table, &privilege.table) {
        (Some(row_table), Some(priv_table)) => row_table == priv_table,
        (None, None) => true,
        _ => false,
    }
}

/// Looks up whether `database`'s statement template (already computed by the
/// caller via `catena_sql::template_hash`) was granted to `invoker` — the
/// short-circuit described in §4.3/§4.4/§9: a template grant authorizes the
/// whole statement (and, per §4.4, everything nested inside an `IF`/`DO`
/// whose outermost template was granted) without revisiting the statement's
/// own declared privileges.
pub fn check_template(
    candidates: &[GrantRow],
    template_hash: Hash,
    invoker: Hash,
    database: &str,
) -> bool {
    let privilege = Privilege {
        kind: PrivilegeKind::Template(template_hash),
        table: None,
    };
    satisfied_by_any(candidates, &privilege, invoker, database)
}
