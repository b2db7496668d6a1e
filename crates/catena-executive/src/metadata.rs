//! Reads and writes of the `grants`/`databases` metadata tables (§3), and the
//! string encoding of [`PrivilegeKind`] used to store rows in them. The
//! `grants` table has no dedicated column for a template hash, so a
//! `Template(hash)` row is stored with `kind = 'template'` and the hash's hex
//! encoding placed in the `table` column — the two are never ambiguous
//! because `kind` always disambiguates which meaning `table` carries.

use catena_db::{Database, Value};
use catena_grants::{GrantRow, PrivilegeKind};
use catena_types::Hash;

use crate::error::{ExecutiveError, ExecutiveResult};

/// Formats `bytes` as a `X'...'` blob literal — safe to splice into SQL text
/// directly since hex digits can never break out of the literal.
pub fn hex_literal(bytes: &[u8]) -> String {
    format!("X'{}'", hex::encode(bytes))
}

fn sql_string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn kind_to_storage(kind: &PrivilegeKind) -> ExecutiveResult<(&'static str, Option<String>)> {
    Ok(match kind {
        PrivilegeKind::Create => ("create", None),
        PrivilegeKind::Delete => ("delete", None),
        PrivilegeKind::Drop => ("drop", None),
        PrivilegeKind::Insert => ("insert", None),
        PrivilegeKind::Update => ("update", None),
        PrivilegeKind::Grant => ("grant", None),
        PrivilegeKind::Never => ("never", None),
        PrivilegeKind::Template(hash) => ("template", Some(hash.to_hex())),
    })
}

fn kind_from_storage(kind: &str, table: Option<&str>) -> ExecutiveResult<(PrivilegeKind, Option<String>)> {
    Ok(match kind {
        "create" => (PrivilegeKind::Create, table.map(str::to_string)),
        "delete" => (PrivilegeKind::Delete, table.map(str::to_string)),
        "drop" => (PrivilegeKind::Drop, table.map(str::to_string)),
        "insert" => (PrivilegeKind::Insert, table.map(str::to_string)),
        "update" => (PrivilegeKind::Update, table.map(str::to_string)),
        "grant" => (PrivilegeKind::Grant, table.map(str::to_string)),
        "never" => (PrivilegeKind::Never, table.map(str::to_string)),
        "template" => {
            let hex = table.ok_or_else(|| ExecutiveError::ColumnDoesNotExist("table".to_string()))?;
            let hash: Hash = hex
                .parse()
                .map_err(|_| ExecutiveError::ColumnDoesNotExist("table".to_string()))?;
            (PrivilegeKind::Template(hash), None)
        }
        other => return Err(ExecutiveError::ColumnDoesNotExist(other.to_string())),
    })
}

/// Inserts a grant row. `user = None` stores the SQL `NULL` that means "any
/// invoker" (§3, §4.3).
pub async fn insert_grant(
    db: &dyn Database,
    user: Option<&[u8]>,
    kind: &PrivilegeKind,
    table: Option<&str>,
    database: &str,
) -> ExecutiveResult<()> {
    let (kind_str, kind_table_override) = kind_to_storage(kind)?;
    let table_value = kind_table_override.as_deref().or(table);
    let user_sql = user.map(hex_literal).unwrap_or_else(|| "NULL".to_string());
    let table_sql = table_value.map(sql_string_literal).unwrap_or_else(|| "NULL".to_string());
    let sql = format!(
        "INSERT INTO grants (user, kind, \"table\", database) VALUES ({user}, '{kind}', {table}, {db})",
        user = user_sql,
        kind = kind_str,
        table = table_sql,
        db = sql_string_literal(database),
    );
    db.execute(&sql).await?;
    Ok(())
}

/// Deletes every grant row matching `(user, kind, table, database)` exactly
/// — the inverse of [`insert_grant`], used by `REVOKE`/`REVOKE TEMPLATE`.
pub async fn delete_grant(
    db: &dyn Database,
    user: Option<&[u8]>,
    kind: &PrivilegeKind,
    table: Option<&str>,
    database: &str,
) -> ExecutiveResult<()> {
    let (kind_str, kind_table_override) = kind_to_storage(kind)?;
    let table_value = kind_table_override.as_deref().or(table);
    let user_clause = match user {
        Some(u) => format!("user = {}", hex_literal(u)),
        None => "user IS NULL".to_string(),
    };
    let table_clause = match table_value {
        Some(t) => format!("\"table\" = {}", sql_string_literal(t)),
        None => "\"table\" IS NULL".to_string(),
    };
    let sql = format!(
        "DELETE FROM grants WHERE {user} AND kind = '{kind}' AND {table} AND database = {db}",
        user = user_clause,
        kind = kind_str,
        table = table_clause,
        db = sql_string_literal(database),
    );
    db.execute(&sql).await?;
    Ok(())
}

/// Loads every grant row scoped to `database`, for the authorization lookup
/// in §4.3. The caller still applies the user/kind/table matching rule via
/// `catena_grants::check` — this only does the "already filtered to this
/// database" part the grants crate expects of its caller.
pub async fn load_grants(db: &dyn Database, database: &str) -> ExecutiveResult<Vec<GrantRow>> {
    let sql = format!(
        "SELECT user, kind, \"table\", database FROM grants WHERE database = {}",
        sql_string_literal(database)
    );
    let rows = db.query(&sql).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let user = match row.get("user") {
            Some(Value::Blob(b)) => Some(Hash::try_from(b.as_slice()).map_err(|_| {
                ExecutiveError::ColumnDoesNotExist("user".to_string())
            })?),
            _ => None,
        };
        let kind_str = match row.get("kind") {
            Some(Value::Text(t)) => t.clone(),
            _ => continue,
        };
        let table_str = match row.get("table") {
            Some(Value::Text(t)) => Some(t.as_str()),
            _ => None,
        };
        let (kind, table) = kind_from_storage(&kind_str, table_str)?;
        out.push(GrantRow {
            user,
            kind,
            table,
            database: database.to_string(),
        });
    }
    Ok(out)
}

/// The `databases` table's owner for `name`, if the database has been
/// created.
pub async fn database_owner(db: &dyn Database, name: &str) -> ExecutiveResult<Option<Hash>> {
    let sql = format!(
        "SELECT owner FROM databases WHERE name = {}",
        sql_string_literal(name)
    );
    let rows = db.query(&sql).await?;
    match rows.first().and_then(|r| r.get("owner")) {
        Some(Value::Blob(b)) => Ok(Some(Hash::try_from(b.as_slice()).map_err(|_| {
            ExecutiveError::ColumnDoesNotExist("owner".to_string())
        })?)),
        _ => Ok(None),
    }
}
