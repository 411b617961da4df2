//! Schema definition and `PRAGMA user_version` migration, mirroring
//! `cdk-sqlite`'s `mint::migration` (the `INIT_SQL`/`user_version` idiom,
//! not its `sqlx` dependency, which that module imports but never wires
//! into `cdk-sqlite`'s own module tree).

use rusqlite::Connection;

use crate::Error;

/// Current schema version.
pub const DB_VERSION: i64 = 1;

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS client_keys (
    pubkey TEXT PRIMARY KEY NOT NULL,
    wallet_id TEXT NOT NULL,
    description TEXT NOT NULL,
    permissions TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    last_used INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS budgets (
    id TEXT PRIMARY KEY NOT NULL,
    pubkey TEXT NOT NULL REFERENCES client_keys(pubkey) ON DELETE CASCADE,
    budget_msats INTEGER NOT NULL,
    refresh_window INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_budgets_pubkey ON budgets(pubkey);

CREATE TABLE IF NOT EXISTS spend_records (
    id TEXT PRIMARY KEY NOT NULL,
    pubkey TEXT NOT NULL REFERENCES client_keys(pubkey) ON DELETE CASCADE,
    amount_msats INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_spend_records_pubkey_created_at ON spend_records(pubkey, created_at);

CREATE TABLE IF NOT EXISTS config (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

/// Create the schema if absent and record `DB_VERSION`. Idempotent.
pub fn run(conn: &Connection) -> Result<(), Error> {
    let current: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| Error::Sqlite(e.to_string()))?;

    if current == 0 {
        conn.execute_batch(INIT_SQL).map_err(|e| Error::Sqlite(e.to_string()))?;
        conn.pragma_update(None, "user_version", DB_VERSION)
            .map_err(|e| Error::Sqlite(e.to_string()))?;
        tracing::info!(version = DB_VERSION, "initialized database schema");
    }
    // No versions beyond 1 exist yet; a future migration would branch on
    // `current` here the way cdk-sqlite's migration module does.
    Ok(())
}
