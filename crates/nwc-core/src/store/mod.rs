//! Durable access to client keys, budgets, the spend ledger, and provider
//! configuration.
//!
//! This module defines the interface only: the persistent
//! key-value/relational store is an external collaborator. [`memory`] ships
//! an in-process implementation used for tests and zero-config development;
//! `nwc-sqlite` (a separate crate) ships the durable backend used by the
//! `nwcd` binary, mirroring the split between `cdk-common`'s database
//! traits and `cdk-sqlite`'s concrete implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub mod memory;

/// A client's identity and grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientKey {
    /// 32-byte schnorr x-only pubkey, hex. Primary key.
    pub pubkey: String,
    /// Identifier of the host wallet this client is bound to.
    pub wallet_id: String,
    /// Human-readable label set by the admin surface.
    pub description: String,
    /// Space-joined permission tags, e.g. `"pay invoice balance"`.
    pub permissions: String,
    /// Seconds since epoch.
    pub created_at: u64,
    /// Seconds since epoch; `0` means never expires.
    pub expires_at: u64,
    /// Seconds since epoch of the last successful authorization.
    pub last_used: u64,
}

impl ClientKey {
    /// The permission tags as a set.
    pub fn permission_set(&self) -> std::collections::HashSet<&str> {
        self.permissions.split_whitespace().collect()
    }

    /// Whether this key is expired at `now` and should be treated as absent.
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at != 0 && self.expires_at <= now
    }
}

/// A per-client spend cap. A client may hold several; all
/// must be satisfied simultaneously to permit a spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    /// Opaque identifier, assigned by the store.
    pub id: String,
    /// The `ClientKey::pubkey` this budget gates.
    pub pubkey: String,
    /// Cap, in millisatoshis.
    pub budget_msats: u64,
    /// Seconds; `<= 0` means "never refresh" (a single lifetime cap).
    pub refresh_window: i64,
    /// Seconds since epoch.
    pub created_at: u64,
}

/// An immutable ledger entry. Never deleted directly;
/// only cascade-deleted with its `ClientKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendRecord {
    /// Opaque identifier, assigned by the store.
    pub id: String,
    /// The `ClientKey::pubkey` this spend is attributed to.
    pub pubkey: String,
    /// Amount spent, in millisatoshis.
    pub amount_msats: u64,
    /// Seconds since epoch.
    pub created_at: u64,
}

/// CRUD over [`ClientKey`] rows.
#[async_trait]
pub trait ClientKeyStore: Send + Sync {
    /// Look up a client key by pubkey, ignoring expiry.
    async fn get_client_key(&self, pubkey: &str) -> Result<Option<ClientKey>, Error>;
    /// Insert or replace a client key.
    async fn put_client_key(&self, key: ClientKey) -> Result<(), Error>;
    /// Remove a client key and cascade-delete its budgets and spend records.
    async fn delete_client_key(&self, pubkey: &str) -> Result<(), Error>;
    /// List all client keys (used by the admin surface; not used by the core).
    async fn list_client_keys(&self) -> Result<Vec<ClientKey>, Error>;
    /// Bump `last_used` to `now`.
    async fn touch_last_used(&self, pubkey: &str, now: u64) -> Result<(), Error>;
}

/// CRUD over [`Budget`] rows.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// All budgets belonging to `pubkey`.
    async fn budgets_for(&self, pubkey: &str) -> Result<Vec<Budget>, Error>;
    /// Insert a new budget.
    async fn add_budget(&self, budget: Budget) -> Result<(), Error>;
}

/// The append-only spend ledger and its window-sum query.
#[async_trait]
pub trait SpendStore: Send + Sync {
    /// `sum(amount_msats WHERE pubkey = P AND start <= created_at < end)`.
    async fn sum_spend_in_window(
        &self,
        pubkey: &str,
        start: u64,
        end: u64,
    ) -> Result<u64, Error>;
    /// Append a new, immutable spend record.
    async fn insert_spend(&self, record: SpendRecord) -> Result<(), Error>;
}

/// The provider's key/value configuration store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read a config value.
    async fn get_config(&self, key: &str) -> Result<Option<String>, Error>;
    /// Write a config value.
    async fn set_config(&self, key: &str, value: &str) -> Result<(), Error>;
}

/// Required config keys.
pub mod config_keys {
    /// 32-byte hex secp256k1 private key, randomly generated at first boot.
    pub const PROVIDER_KEY: &str = "provider_key";
    /// Relay URL, or the sentinel [`RELAY_SENTINEL_DEFAULT`].
    pub const RELAY: &str = "relay";
    /// Optional relay URL override published in pairing URLs.
    pub const RELAY_ALIAS: &str = "relay_alias";
    /// Sentinel value of [`RELAY`] indicating "use the internal default".
    pub const RELAY_SENTINEL_DEFAULT: &str = "nostrclient";
}

/// The full store surface the core depends on.
pub trait Store: ClientKeyStore + BudgetStore + SpendStore + ConfigStore {}

impl<T> Store for T where T: ClientKeyStore + BudgetStore + SpendStore + ConfigStore {}
