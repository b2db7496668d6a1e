use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Connection, Row as SqlxRow, SqliteConnection, TypeInfo, ValueRef};
use tokio::sync::Mutex;

use crate::error::{DbError, DbResult};
use crate::metadata::MIGRATIONS;
use crate::{ColumnInfo, Database, QueryResult, Row, Value};

/// A `sqlx`-backed SQLite implementation of [`Database`]. Savepoints are
/// connection-scoped in SQLite, so this holds exactly one physical
/// connection behind a mutex rather than a pool — matching §5's "the
/// backend database serializes writes" rather than allowing concurrent
/// writers to race on nested `SAVEPOINT`s.
pub struct SqliteDatabase {
    conn: Mutex<SqliteConnection>,
}

impl SqliteDatabase {
    /// Opens (creating if missing) a file-backed database, or `:memory:`
    /// for an ephemeral one (§6 "Persisted state").
    pub async fn open(path: &str) -> DbResult<Self> {
        let options = if path == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?.create_if_missing(true)
        };
        let mut conn = SqliteConnection::connect_with(&options).await?;
        for migration in MIGRATIONS {
            sqlx::query(migration).execute(&mut conn).await?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn convert_row(row: &SqliteRow) -> Row {
        let mut columns = Vec::with_capacity(row.columns().len());
        let mut values = Vec::with_capacity(row.columns().len());
        for (i, col) in row.columns().iter().enumerate() {
            columns.push(col.name().to_string());
            let value = match row.try_get_raw(i) {
                Ok(raw) if raw.is_null() => Value::Null,
                Ok(raw) => match raw.type_info().name() {
                    "TEXT" => row
                        .try_get::<String, _>(i)
                        .map(Value::Text)
                        .unwrap_or(Value::Null),
                    "BLOB" => row
                        .try_get::<Vec<u8>, _>(i)
                        .map(Value::Blob)
                        .unwrap_or(Value::Null),
                    "REAL" => row
                        .try_get::<f64, _>(i)
                        .map(|f| Value::Int(f as i64))
                        .unwrap_or(Value::Null),
                    _ => row
                        .try_get::<i64, _>(i)
                        .map(Value::Int)
                        .unwrap_or(Value::Null),
                },
                Err(_) => Value::Null,
            };
            values.push(value);
        }
        Row { columns, values }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn execute(&self, sql: &str) -> DbResult<QueryResult> {
        let mut conn = self.conn.lock().await;
        let result = sqlx::query(sql).execute(&mut *conn).await?;
        Ok(QueryResult {
            rows_affected: result.rows_affected(),
            last_insert_rowid: result.last_insert_rowid(),
        })
    }

    async fn query(&self, sql: &str) -> DbResult<Vec<Row>> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
        Ok(rows.iter().map(Self::convert_row).collect())
    }

    async fn savepoint(&self, name: &str) -> DbResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query(&format!("SAVEPOINT \"{name}\""))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn release_savepoint(&self, name: &str) -> DbResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query(&format!("RELEASE SAVEPOINT \"{name}\""))
            .execute(&mut *conn)
            .await
            .map_err(|_| DbError::UnknownSavepoint(name.to_string()))?;
        Ok(())
    }

    async fn rollback_to_savepoint(&self, name: &str) -> DbResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT \"{name}\""))
            .execute(&mut *conn)
            .await
            .map_err(|_| DbError::UnknownSavepoint(name.to_string()))?;
        Ok(())
    }

    async fn table_exists(&self, backend_table: &str) -> DbResult<bool> {
        let mut conn = self.conn.lock().await;
        let row = sqlx::query(
            "SELECT count(*) AS c FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(backend_table)
        .fetch_one(&mut *conn)
        .await?;
        let count: i64 = row.try_get("c").unwrap_or(0);
        Ok(count > 0)
    }

    async fn table_columns(&self, backend_table: &str) -> DbResult<Vec<ColumnInfo>> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(&format!("PRAGMA table_info(\"{backend_table}\")"))
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.try_get::<String, _>("name").unwrap_or_default(),
                type_name: row.try_get::<String, _>("type").unwrap_or_default(),
                primary_key: row.try_get::<i64, _>("pk").unwrap_or(0) != 0,
            })
            .collect())
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<String, _>("name").unwrap_or_default())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_creates_metadata_tables() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        let tables = db.list_tables().await.unwrap();
        for expected in ["grants", "users", "databases", "blocks", "info"] {
            assert!(tables.contains(&expected.to_string()), "{expected}");
        }
    }

    #[tokio::test]
    async fn executes_and_queries_a_user_table() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        db.execute("CREATE TABLE \"mydb$t\" (x INTEGER)").await.unwrap();
        db.execute("INSERT INTO \"mydb$t\" (x) VALUES (42)").await.unwrap();
        let rows = db.query("SELECT x FROM \"mydb$t\"").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("x"), Some(&Value::Int(42)));
    }

    #[tokio::test]
    async fn savepoint_rollback_undoes_writes() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        db.execute("CREATE TABLE \"mydb$t\" (x INTEGER)").await.unwrap();
        db.savepoint("sp1").await.unwrap();
        db.execute("INSERT INTO \"mydb$t\" (x) VALUES (1)").await.unwrap();
        db.rollback_to_savepoint("sp1").await.unwrap();
        db.release_savepoint("sp1").await.unwrap();
        let rows = db.query("SELECT x FROM \"mydb$t\"").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn nested_savepoints_only_roll_back_the_inner_one() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        db.execute("CREATE TABLE \"mydb$t\" (x INTEGER)").await.unwrap();
        db.savepoint("outer").await.unwrap();
        db.execute("INSERT INTO \"mydb$t\" (x) VALUES (1)").await.unwrap();
        db.savepoint("inner").await.unwrap();
        db.execute("INSERT INTO \"mydb$t\" (x) VALUES (2)").await.unwrap();
        db.rollback_to_savepoint("inner").await.unwrap();
        db.release_savepoint("inner").await.unwrap();
        db.release_savepoint("outer").await.unwrap();
        let rows = db.query("SELECT x FROM \"mydb$t\" ORDER BY x").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("x"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn table_columns_reports_declaration_order_and_primary_key() {
        let db = SqliteDatabase::open(":memory:").await.unwrap();
        db.execute("CREATE TABLE \"mydb$t\" (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        let cols = db.table_columns("mydb$t").await.unwrap();
        assert_eq!(cols[0].name, "id");
        assert!(cols[0].primary_key);
        assert_eq!(cols[1].name, "name");
        assert!(!cols[1].primary_key);
    }
}
