//! The node database (§6 "Persisted state"): `peers` and `config`
//! (`publicKey`, `privateKey`, `uuid`, `genesisSeed`). Distinct from the
//! chain-state `Database` capability in `catena-db` — this schema has
//! nothing to do with SQL payload tables, so it talks to `sqlx` directly
//! rather than going through that trait.

use std::str::FromStr;

use catena_crypto::KeyPair;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, Row, SqliteConnection};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::ConfigResult;

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS config (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS peers (uuid TEXT PRIMARY KEY, address TEXT NOT NULL)",
];

/// A node's persisted identity: its Ed25519 keypair, its gossip UUID, and
/// the genesis seed it was (or will be) initialized with.
pub struct NodeIdentity {
    pub key_pair: KeyPair,
    pub uuid: Uuid,
    pub genesis_seed: String,
}

pub struct NodeDatabase {
    conn: Mutex<SqliteConnection>,
}

impl NodeDatabase {
    pub async fn open(path: &str) -> ConfigResult<Self> {
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

    async fn get_config(&self, key: &str) -> ConfigResult<Option<String>> {
        let mut conn = self.conn.lock().await;
        let row = sqlx::query("SELECT value FROM config WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set_config(&self, key: &str, value: &str) -> ConfigResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query("INSERT INTO config (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(value)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Loads the persisted identity, or mints and persists a fresh one if
    /// this is a first run. `uuid_override`/`seed_override` let the CLI's
    /// `--node-uuid`/`--seed` flags win even on a first run.
    pub async fn load_or_create_identity(
        &self,
        uuid_override: Option<Uuid>,
        seed_override: Option<String>,
    ) -> ConfigResult<NodeIdentity> {
        let private_key = self.get_config("privateKey").await?;
        let uuid = self.get_config("uuid").await?;
        let genesis_seed = self.get_config("genesisSeed").await?;

        if let (Some(private_key), Some(uuid)) = (private_key, uuid) {
            let key_pair = KeyPair::from_private_key_hex(&private_key)?;
            let uuid = Uuid::parse_str(&uuid)?;
            let genesis_seed = genesis_seed.unwrap_or_default();
            return Ok(NodeIdentity {
                key_pair,
                uuid,
                genesis_seed,
            });
        }

        let key_pair = KeyPair::generate();
        let uuid = uuid_override.unwrap_or_else(Uuid::new_v4);
        let genesis_seed = seed_override.unwrap_or_else(|| uuid.to_string());

        self.set_config("publicKey", &key_pair.public_key().to_hex()).await?;
        self.set_config("privateKey", &key_pair.private_key_hex()).await?;
        self.set_config("uuid", &uuid.to_string()).await?;
        self.set_config("genesisSeed", &genesis_seed).await?;

        Ok(NodeIdentity {
            key_pair,
            uuid,
            genesis_seed,
        })
    }

    pub async fn record_peer(&self, uuid: Uuid, address: &str) -> ConfigResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query("INSERT INTO peers (uuid, address) VALUES (?, ?) ON CONFLICT(uuid) DO UPDATE SET address = excluded.address")
            .bind(uuid.to_string())
            .bind(address)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn known_peers(&self) -> ConfigResult<Vec<String>> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query("SELECT address FROM peers").fetch_all(&mut *conn).await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("address")).collect())
    }

    /// `--initialize` (§6): truncates the peer table, leaving identity and
    /// chain-state truncation to the caller.
    pub async fn truncate_peers(&self) -> ConfigResult<()> {
        let mut conn = self.conn.lock().await;
        sqlx::query("DELETE FROM peers").execute(&mut *conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_run_mints_and_persists_an_identity() {
        let db = NodeDatabase::open(":memory:").await.unwrap();
        let identity = db.load_or_create_identity(None, None).await.unwrap();
        let reloaded = db.load_or_create_identity(None, None).await.unwrap();
        assert_eq!(identity.key_pair.public_key(), reloaded.key_pair.public_key());
        assert_eq!(identity.uuid, reloaded.uuid);
    }

    #[tokio::test]
    async fn node_uuid_override_wins_on_first_run() {
        let db = NodeDatabase::open(":memory:").await.unwrap();
        let forced = Uuid::new_v4();
        let identity = db.load_or_create_identity(Some(forced), None).await.unwrap();
        assert_eq!(identity.uuid, forced);
    }

    #[tokio::test]
    async fn peers_round_trip_and_truncate() {
        let db = NodeDatabase::open(":memory:").await.unwrap();
        let uuid = Uuid::new_v4();
        db.record_peer(uuid, "ws://10.0.0.2:8338").await.unwrap();
        assert_eq!(db.known_peers().await.unwrap(), vec!["ws://10.0.0.2:8338".to_string()]);
        db.truncate_peers().await.unwrap();
        assert!(db.known_peers().await.unwrap().is_empty());
    }
}
