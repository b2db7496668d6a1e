//! The metadata tables the core itself owns (§3): `grants`, `users`,
//! `databases`, `blocks`, `info`. Every user table is physically stored as
//! `<db>$<table>` by the backend visitor's renaming (§4.2), so these plain,
//! unscoped names can never collide with one — which is also exactly why
//! the reserved-table filter in §4.6 step 6 only needs to compare a
//! statement's *frontend* table name (pre-rewrite) against this list.

pub const GRANTS_TABLE: &str = "grants";
pub const USERS_TABLE: &str = "users";
pub const DATABASES_TABLE: &str = "databases";
pub const BLOCKS_TABLE: &str = "blocks";
pub const INFO_TABLE: &str = "info";

/// Every reserved metadata table name — a transaction whose declared
/// privileges would touch one of these is dropped by the payload filter
/// (§4.6 step 6), since metadata is managed exclusively by the core, never
/// by user SQL.
pub const RESERVED_TABLES: &[&str] = &[GRANTS_TABLE, USERS_TABLE, DATABASES_TABLE, BLOCKS_TABLE, INFO_TABLE];

pub const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS grants (\
        user BLOB NULL, \
        kind TEXT NOT NULL, \
        \"table\" TEXT NULL, \
        database TEXT NOT NULL\
    )",
    "CREATE TABLE IF NOT EXISTS users (\
        user BLOB PRIMARY KEY, \
        counter INTEGER NOT NULL\
    )",
    "CREATE TABLE IF NOT EXISTS databases (\
        name TEXT PRIMARY KEY, \
        owner BLOB NOT NULL\
    )",
    "CREATE TABLE IF NOT EXISTS blocks (\
        signature BLOB PRIMARY KEY, \
        \"index\" INTEGER NOT NULL, \
        previous BLOB NOT NULL, \
        payload BLOB NOT NULL\
    )",
    "CREATE TABLE IF NOT EXISTS info (\
        key TEXT PRIMARY KEY, \
        value TEXT NOT NULL\
    )",
];
