//! An in-process [`Store`](super::Store) implementation, guarded by a single
//! mutex. Used for tests and as a zero-config development default; the
//! `nwcd` binary uses `nwc-sqlite` for durability.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Budget, BudgetStore, ClientKey, ClientKeyStore, ConfigStore, SpendRecord, SpendStore};
use crate::error::Error;
use crate::validate::{assert_hex32, is_positive_msats, is_unix_timestamp, is_wallet_id};

#[derive(Default)]
struct Inner {
    client_keys: HashMap<String, ClientKey>,
    budgets: Vec<Budget>,
    spends: Vec<SpendRecord>,
    config: HashMap<String, String>,
    next_id: u64,
}

impl Inner {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// In-memory [`Store`](super::Store).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// A fresh, empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientKeyStore for MemoryStore {
    async fn get_client_key(&self, pubkey: &str) -> Result<Option<ClientKey>, Error> {
        Ok(self.inner.lock().await.client_keys.get(pubkey).cloned())
    }

    async fn put_client_key(&self, key: ClientKey) -> Result<(), Error> {
        assert_hex32(&key.pubkey, "ClientKey::pubkey");
        assert!(is_wallet_id(&key.wallet_id), "invalid wallet_id: {:?}", key.wallet_id);
        self.inner
            .lock()
            .await
            .client_keys
            .insert(key.pubkey.clone(), key);
        Ok(())
    }

    async fn delete_client_key(&self, pubkey: &str) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        inner.client_keys.remove(pubkey);
        inner.budgets.retain(|b| b.pubkey != pubkey);
        inner.spends.retain(|s| s.pubkey != pubkey);
        Ok(())
    }

    async fn list_client_keys(&self) -> Result<Vec<ClientKey>, Error> {
        Ok(self.inner.lock().await.client_keys.values().cloned().collect())
    }

    async fn touch_last_used(&self, pubkey: &str, now: u64) -> Result<(), Error> {
        if let Some(key) = self.inner.lock().await.client_keys.get_mut(pubkey) {
            key.last_used = now;
        }
        Ok(())
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn budgets_for(&self, pubkey: &str) -> Result<Vec<Budget>, Error> {
        Ok(self
            .inner
            .lock()
            .await
            .budgets
            .iter()
            .filter(|b| b.pubkey == pubkey)
            .cloned()
            .collect())
    }

    async fn add_budget(&self, mut budget: Budget) -> Result<(), Error> {
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
        let mut inner = self.inner.lock().await;
        if budget.id.is_empty() {
            budget.id = inner.fresh_id("budget");
        }
        inner.budgets.push(budget);
        Ok(())
    }
}

#[async_trait]
impl SpendStore for MemoryStore {
    async fn sum_spend_in_window(
        &self,
        pubkey: &str,
        start: u64,
        end: u64,
    ) -> Result<u64, Error> {
        Ok(self
            .inner
            .lock()
            .await
            .spends
            .iter()
            .filter(|s| s.pubkey == pubkey && s.created_at >= start && s.created_at < end)
            .map(|s| s.amount_msats)
            .sum())
    }

    async fn insert_spend(&self, mut record: SpendRecord) -> Result<(), Error> {
        assert!(
            is_positive_msats(record.amount_msats as i64),
            "invalid amount_msats: {}",
            record.amount_msats
        );
        let mut inner = self.inner.lock().await;
        if record.id.is_empty() {
            record.id = inner.fresh_id("spend");
        }
        inner.spends.push(record);
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_config(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.inner.lock().await.config.get(key).cloned())
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<(), Error> {
        self.inner
            .lock()
            .await
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cascade_delete_removes_budgets_and_spends() {
        let store = MemoryStore::new();
        store
            .put_client_key(ClientKey {
                pubkey: "abc".into(),
                wallet_id: "w1".into(),
                description: "".into(),
                permissions: "pay".into(),
                created_at: 0,
                expires_at: 0,
                last_used: 0,
            })
            .await
            .unwrap();
        store
            .add_budget(Budget {
                id: String::new(),
                pubkey: "abc".into(),
                budget_msats: 1000,
                refresh_window: 0,
                created_at: 0,
            })
            .await
            .unwrap();
        store
            .insert_spend(SpendRecord {
                id: String::new(),
                pubkey: "abc".into(),
                amount_msats: 100,
                created_at: 0,
            })
            .await
            .unwrap();

        store.delete_client_key("abc").await.unwrap();

        assert!(store.get_client_key("abc").await.unwrap().is_none());
        assert!(store.budgets_for("abc").await.unwrap().is_empty());
        assert_eq!(store.sum_spend_in_window("abc", 0, 1).await.unwrap(), 0);
    }
}
