//! SQLite storage backend for `nwc-core`'s [`nwc_core::store::Store`]
//! traits, the durable backend `nwcd` runs against (mirroring the split
//! between `cdk-common`'s database traits and `cdk-sqlite`'s concrete
//! implementation).

#![warn(missing_docs)]

mod conn;
mod error;
mod migration;

use async_trait::async_trait;
use nwc_core::store::{Budget, ClientKey, ClientKeyStore, BudgetStore, ConfigStore, SpendRecord, SpendStore};
use nwc_core::validate::{assert_hex32, is_positive_msats, is_unix_timestamp, is_wallet_id};
use rusqlite::{params, OptionalExtension};

pub use error::Error;

/// A SQLite-backed [`nwc_core::store::Store`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: conn::Handle,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, running migrations.
    pub async fn open(path: &str) -> Result<Self, nwc_core::error::Error> {
        let conn = conn::Handle::open(path).map_err(nwc_core::error::Error::from)?;
        conn.with(|c| migration::run(c).map_err(Error::from))
            .await
            .map_err(nwc_core::error::Error::from)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database. Used by tests.
    pub async fn memory() -> Result<Self, nwc_core::error::Error> {
        Self::open(":memory:").await
    }
}

fn row_to_client_key(row: &rusqlite::Row) -> rusqlite::Result<ClientKey> {
    Ok(ClientKey {
        pubkey: row.get(0)?,
        wallet_id: row.get(1)?,
        description: row.get(2)?,
        permissions: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
        expires_at: row.get::<_, i64>(5)? as u64,
        last_used: row.get::<_, i64>(6)? as u64,
    })
}

#[async_trait]
impl ClientKeyStore for SqliteStore {
    async fn get_client_key(&self, pubkey: &str) -> Result<Option<ClientKey>, nwc_core::error::Error> {
        let pubkey = pubkey.to_string();
        self.conn
            .with(move |c| {
                c.query_row(
                    "SELECT pubkey, wallet_id, description, permissions, created_at, expires_at, last_used \
                     FROM client_keys WHERE pubkey = ?1",
                    params![pubkey],
                    row_to_client_key,
                )
                .optional()
                .map_err(Error::from)
            })
            .await
            .map_err(Into::into)
    }

    async fn put_client_key(&self, key: ClientKey) -> Result<(), nwc_core::error::Error> {
        assert_hex32(&key.pubkey, "ClientKey::pubkey");
        assert!(is_wallet_id(&key.wallet_id), "invalid wallet_id: {:?}", key.wallet_id);
        self.conn
            .with(move |c| {
                c.execute(
                    "INSERT INTO client_keys (pubkey, wallet_id, description, permissions, created_at, expires_at, last_used) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                     ON CONFLICT(pubkey) DO UPDATE SET \
                         wallet_id = excluded.wallet_id, \
                         description = excluded.description, \
                         permissions = excluded.permissions, \
                         created_at = excluded.created_at, \
                         expires_at = excluded.expires_at, \
                         last_used = excluded.last_used",
                    params![
                        key.pubkey,
                        key.wallet_id,
                        key.description,
                        key.permissions,
                        key.created_at as i64,
                        key.expires_at as i64,
                        key.last_used as i64,
                    ],
                )
                .map_err(Error::from)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn delete_client_key(&self, pubkey: &str) -> Result<(), nwc_core::error::Error> {
        let pubkey = pubkey.to_string();
        self.conn
            .with(move |c| {
                c.execute("DELETE FROM client_keys WHERE pubkey = ?1", params![pubkey])
                    .map_err(Error::from)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    async fn list_client_keys(&self) -> Result<Vec<ClientKey>, nwc_core::error::Error> {
        self.conn
            .with(|c| {
                let mut stmt = c
                    .prepare(
                        "SELECT pubkey, wallet_id, description, permissions, created_at, expires_at, last_used \
                         FROM client_keys ORDER BY created_at",
                    )
                    .map_err(Error::from)?;
                let rows = stmt
                    .query_map([], row_to_client_key)
                    .map_err(Error::from)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(Error::from)?;
                Ok(rows)
            })
            .await
            .map_err(Into::into)
    }

    async fn touch_last_used(&self, pubkey: &str, now: u64) -> Result<(), nwc_core::error::Error> {
        let pubkey = pubkey.to_string();
        self.conn
            .with(move |c| {
                c.execute(
                    "UPDATE client_keys SET last_used = ?1 WHERE pubkey = ?2",
                    params![now as i64, pubkey],
                )
                .map_err(Error::from)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl BudgetStore for SqliteStore {
    async fn budgets_for(&self, pubkey: &str) -> Result<Vec<Budget>, nwc_core::error::Error> {
        let pubkey = pubkey.to_string();
        self.conn
            .with(move |c| {
                let mut stmt = c
                    .prepare("SELECT id, pubkey, budget_msats, refresh_window, created_at FROM budgets WHERE pubkey = ?1")
                    .map_err(Error::from)?;
                let rows = stmt
                    .query_map(params![pubkey], |row| {
                        Ok(Budget {
                            id: row.get(0)?,
                            pubkey: row.get(1)?,
                            budget_msats: row.get::<_, i64>(2)? as u64,
                            refresh_window: row.get(3)?,
                            created_at: row.get::<_, i64>(4)? as u64,
                        })
                    })
                    .map_err(Error::from)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(Error::from)?;
                Ok(rows)
            })
            .await
            .map_err(Into::into)
    }

    async fn add_budget(&self, mut budget: Budget) -> Result<(), nwc_core::error::Error> {
        assert!(
            is_positive_msats(budget.budget_msats as i64),
            "invalid budget_msats: {}",
            budget.budget_msats
        );
        assert!(
            is_unix_timestamp(budget.created_at as i64),
            "invalid created_at: {}",
            budget.created_at
        );
        if budget.id.is_empty() {
            budget.id = fresh_id();
        }
        self.conn
            .with(move |c| {
                c.execute(
                    "INSERT INTO budgets (id, pubkey, budget_msats, refresh_window, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        budget.id,
                        budget.pubkey,
                        budget.budget_msats as i64,
                        budget.refresh_window,
                        budget.created_at as i64,
                    ],
                )
                .map_err(Error::from)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl SpendStore for SqliteStore {
    async fn sum_spend_in_window(&self, pubkey: &str, start: u64, end: u64) -> Result<u64, nwc_core::error::Error> {
        let pubkey = pubkey.to_string();
        self.conn
            .with(move |c| {
                let sum: i64 = c
                    .query_row(
                        "SELECT COALESCE(SUM(amount_msats), 0) FROM spend_records \
                         WHERE pubkey = ?1 AND created_at >= ?2 AND created_at < ?3",
                        params![pubkey, start as i64, end as i64],
                        |row| row.get(0),
                    )
                    .map_err(Error::from)?;
                Ok(sum as u64)
            })
            .await
            .map_err(Into::into)
    }

    async fn insert_spend(&self, mut record: SpendRecord) -> Result<(), nwc_core::error::Error> {
        assert!(
            is_positive_msats(record.amount_msats as i64),
            "invalid amount_msats: {}",
            record.amount_msats
        );
        if record.id.is_empty() {
            record.id = fresh_id();
        }
        self.conn
            .with(move |c| {
                c.execute(
                    "INSERT INTO spend_records (id, pubkey, amount_msats, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![record.id, record.pubkey, record.amount_msats as i64, record.created_at as i64],
                )
                .map_err(Error::from)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn get_config(&self, key: &str) -> Result<Option<String>, nwc_core::error::Error> {
        let key = key.to_string();
        self.conn
            .with(move |c| {
                c.query_row("SELECT value FROM config WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()
                    .map_err(Error::from)
            })
            .await
            .map_err(Into::into)
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<(), nwc_core::error::Error> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .with(move |c| {
                c.execute(
                    "INSERT INTO config (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )
                .map_err(Error::from)?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

/// Generate a fresh opaque id for a [`Budget`] or [`SpendRecord`] row.
pub fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_client_key_and_cascades_delete() {
        let store = SqliteStore::memory().await.unwrap();

        let key = ClientKey {
            pubkey: "a".repeat(64),
            wallet_id: "default".into(),
            description: "test client".into(),
            permissions: "pay_invoice get_balance".into(),
            created_at: 1000,
            expires_at: 0,
            last_used: 0,
        };
        store.put_client_key(key.clone()).await.unwrap();
        assert_eq!(store.get_client_key(&key.pubkey).await.unwrap(), Some(key.clone()));

        store
            .add_budget(Budget {
                id: fresh_id(),
                pubkey: key.pubkey.clone(),
                budget_msats: 100_000,
                refresh_window: 86_400,
                created_at: 1000,
            })
            .await
            .unwrap();
        assert_eq!(store.budgets_for(&key.pubkey).await.unwrap().len(), 1);

        store
            .insert_spend(SpendRecord {
                id: fresh_id(),
                pubkey: key.pubkey.clone(),
                amount_msats: 1_000,
                created_at: 1000,
            })
            .await
            .unwrap();
        assert_eq!(store.sum_spend_in_window(&key.pubkey, 0, 2000).await.unwrap(), 1_000);

        store.delete_client_key(&key.pubkey).await.unwrap();
        assert_eq!(store.get_client_key(&key.pubkey).await.unwrap(), None);
        assert!(store.budgets_for(&key.pubkey).await.unwrap().is_empty());
        assert_eq!(store.sum_spend_in_window(&key.pubkey, 0, 2000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn config_set_then_get_overwrites() {
        let store = SqliteStore::memory().await.unwrap();
        store.set_config("relay", "wss://relay.example.com").await.unwrap();
        assert_eq!(
            store.get_config("relay").await.unwrap(),
            Some("wss://relay.example.com".to_string())
        );
        store.set_config("relay", "wss://other.example.com").await.unwrap();
        assert_eq!(
            store.get_config("relay").await.unwrap(),
            Some("wss://other.example.com".to_string())
        );
        assert_eq!(store.get_config("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn touch_last_used_updates_only_that_field() {
        let store = SqliteStore::memory().await.unwrap();
        let key = ClientKey {
            pubkey: "b".repeat(64),
            wallet_id: "default".into(),
            description: String::new(),
            permissions: "get_balance".into(),
            created_at: 1,
            expires_at: 0,
            last_used: 0,
        };
        store.put_client_key(key.clone()).await.unwrap();
        store.touch_last_used(&key.pubkey, 42).await.unwrap();
        let updated = store.get_client_key(&key.pubkey).await.unwrap().unwrap();
        assert_eq!(updated.last_used, 42);
        assert_eq!(updated.permissions, key.permissions);
    }
}
