//! The SQL executive (§4.4): authorizes a statement against the on-chain
//! grants table, rewrites and statically verifies it, and dispatches it
//! against a `catena_db::Database` inside the caller's savepoint scope.
//!
//! This crate never opens its own savepoints — `catena-ledger`'s payload
//! applier (§4.6) owns the block-level/transaction-level savepoint nesting
//! and calls [`Executive::execute`] once per transaction, inside the
//! transaction's own savepoint.

mod context;
mod dispatch;
mod error;
mod metadata;
mod result;
mod verify;

pub use context::{BlockInfo, ExecutionContext};
pub use error::{ExecutiveError, ExecutiveResult};
pub use metadata::{database_owner, delete_grant, hex_literal, insert_grant, load_grants};
pub use result::{unmangle_rows, ExecutionOutcome};

/// Entry point for running one statement against a [`ExecutionContext`]
/// (§4.4). `template_granted` should be `false` at the top of a fresh
/// transaction.
pub struct Executive;

impl Executive {
    pub async fn execute(
        ctx: &ExecutionContext<'_>,
        stmt: &catena_sql::Statement,
        template_granted: bool,
    ) -> ExecutiveResult<ExecutionOutcome> {
        dispatch::execute(ctx, stmt, template_granted).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::KeyPair;
    use catena_db::{Database, SqliteDatabase, Value};
    use catena_sql::parse_statement;
    use catena_types::Hash;

    fn block_info() -> BlockInfo {
        BlockInfo {
            height: 1,
            signature: Hash::from([1u8; 32]),
            previous: Hash::ZERO,
            miner: Hash::from([2u8; 32]),
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn owner_can_create_table_and_insert_without_a_grant() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        let root = KeyPair::generate();
        let root_hash = root.public_key().invoker_hash();
        db.execute(&format!(
            "INSERT INTO databases (name, owner) VALUES ('mydb', X'{}')",
            hex::encode(root_hash.as_bytes())
        ))
        .await
        .unwrap();

        let ctx = ExecutionContext::new(&db, "mydb", root_hash, block_info());
        let create = parse_statement("CREATE TABLE test (x INT)").unwrap();
        Executive::execute(&ctx, &create, false).await.unwrap();

        let insert = parse_statement("INSERT INTO test (x) VALUES (42)").unwrap();
        Executive::execute(&ctx, &insert, false).await.unwrap();

        let select = parse_statement("SELECT x FROM test").unwrap();
        let outcome = Executive::execute(&ctx, &select, false).await.unwrap();
        match outcome {
            ExecutionOutcome::Rows(rows) => {
                assert_eq!(rows[0].get("x"), Some(&Value::Int(42)));
            }
            _ => panic!("expected rows"),
        }
    }

    #[tokio::test]
    async fn insert_without_a_grant_is_rejected() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        let root = KeyPair::generate();
        let root_hash = root.public_key().invoker_hash();
        db.execute(&format!(
            "INSERT INTO databases (name, owner) VALUES ('mydb', X'{}')",
            hex::encode(root_hash.as_bytes())
        ))
        .await
        .unwrap();
        let owner_ctx = ExecutionContext::new(&db, "mydb", root_hash, block_info());
        let create = parse_statement("CREATE TABLE test (x INT)").unwrap();
        Executive::execute(&owner_ctx, &create, false).await.unwrap();

        let other = KeyPair::generate().public_key().invoker_hash();
        let other_ctx = ExecutionContext::new(&db, "mydb", other, block_info());
        let insert = parse_statement("INSERT INTO test (x) VALUES (1)").unwrap();
        let err = Executive::execute(&other_ctx, &insert, false).await.unwrap_err();
        assert!(matches!(err, ExecutiveError::PrivilegeRequired));
    }

    #[tokio::test]
    async fn grant_then_insert_succeeds_for_the_granted_user() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        let root = KeyPair::generate();
        let root_hash = root.public_key().invoker_hash();
        db.execute(&format!(
            "INSERT INTO databases (name, owner) VALUES ('mydb', X'{}')",
            hex::encode(root_hash.as_bytes())
        ))
        .await
        .unwrap();
        let owner_ctx = ExecutionContext::new(&db, "mydb", root_hash, block_info());
        let create = parse_statement("CREATE TABLE test (x INT)").unwrap();
        Executive::execute(&owner_ctx, &create, false).await.unwrap();

        let user = KeyPair::generate().public_key().invoker_hash();
        let grant = parse_statement(&format!(
            "GRANT INSERT ON test TO X'{}'",
            hex::encode(user.as_bytes())
        ))
        .unwrap();
        Executive::execute(&owner_ctx, &grant, false).await.unwrap();

        let user_ctx = ExecutionContext::new(&db, "mydb", user, block_info());
        let insert = parse_statement("INSERT INTO test (x) VALUES (42)").unwrap();
        Executive::execute(&user_ctx, &insert, false).await.unwrap();

        let select = parse_statement("SELECT x FROM test").unwrap();
        let outcome = Executive::execute(&owner_ctx, &select, false).await.unwrap();
        match outcome {
            ExecutionOutcome::Rows(rows) => assert_eq!(rows[0].get("x"), Some(&Value::Int(42))),
            _ => panic!("expected rows"),
        }
    }

    #[tokio::test]
    async fn select_rowid_resolves_against_sqlites_own_alias() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        let root = KeyPair::generate();
        let root_hash = root.public_key().invoker_hash();
        db.execute(&format!(
            "INSERT INTO databases (name, owner) VALUES ('mydb', X'{}')",
            hex::encode(root_hash.as_bytes())
        ))
        .await
        .unwrap();

        let ctx = ExecutionContext::new(&db, "mydb", root_hash, block_info());
        let create = parse_statement("CREATE TABLE test (x INT)").unwrap();
        Executive::execute(&ctx, &create, false).await.unwrap();
        let insert = parse_statement("INSERT INTO test (x) VALUES (42)").unwrap();
        Executive::execute(&ctx, &insert, false).await.unwrap();

        let select = parse_statement("SELECT rowid, x FROM test").unwrap();
        let outcome = Executive::execute(&ctx, &select, false).await.unwrap();
        match outcome {
            ExecutionOutcome::Rows(rows) => {
                assert_eq!(rows[0].get("rowid"), Some(&Value::Int(1)));
                assert_eq!(rows[0].get("x"), Some(&Value::Int(42)));
            }
            _ => panic!("expected rows"),
        }
    }

    #[tokio::test]
    async fn fail_statement_always_fails() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        let invoker = KeyPair::generate().public_key().invoker_hash();
        let ctx = ExecutionContext::new(&db, "", invoker, block_info());
        let stmt = parse_statement("FAIL").unwrap();
        let err = Executive::execute(&ctx, &stmt, false).await.unwrap_err();
        assert!(matches!(err, ExecutiveError::ExecutionFailed));
    }

    #[tokio::test]
    async fn if_dispatches_first_truthy_branch() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        let root = KeyPair::generate();
        let root_hash = root.public_key().invoker_hash();
        db.execute(&format!(
            "INSERT INTO databases (name, owner) VALUES ('mydb', X'{}')",
            hex::encode(root_hash.as_bytes())
        ))
        .await
        .unwrap();
        let ctx = ExecutionContext::new(&db, "mydb", root_hash, block_info());
        let create = parse_statement("CREATE TABLE test (x INT)").unwrap();
        Executive::execute(&ctx, &create, false).await.unwrap();

        let stmt = parse_statement(
            "IF 1 = 2 THEN FAIL ELSE IF 1 = 1 THEN INSERT INTO test (x) VALUES (7) END",
        )
        .unwrap();
        Executive::execute(&ctx, &stmt, false).await.unwrap();

        let select = parse_statement("SELECT x FROM test").unwrap();
        let outcome = Executive::execute(&ctx, &select, false).await.unwrap();
        match outcome {
            ExecutionOutcome::Rows(rows) => assert_eq!(rows[0].get("x"), Some(&Value::Int(7))),
            _ => panic!("expected rows"),
        }
    }

    #[tokio::test]
    async fn dropping_a_non_empty_database_is_refused() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        let root = KeyPair::generate();
        let root_hash = root.public_key().invoker_hash();
        let ctx = ExecutionContext::new(&db, "", root_hash, block_info());
        let create_db = parse_statement("CREATE DATABASE mydb").unwrap();
        Executive::execute(&ctx, &create_db, false).await.unwrap();

        let scoped_ctx = ExecutionContext::new(&db, "mydb", root_hash, block_info());
        let create_table = parse_statement("CREATE TABLE test (x INT)").unwrap();
        Executive::execute(&scoped_ctx, &create_table, false).await.unwrap();

        let drop_db = parse_statement("DROP DATABASE mydb").unwrap();
        let err = Executive::execute(&ctx, &drop_db, false).await.unwrap_err();
        assert!(matches!(err, ExecutiveError::DatabaseNotEmpty(_)));
    }
}
