//! SQLite-backed document store
//!
//! Documents are JSON objects keyed by (tenant, collection, key). Uses
//! parameterized queries exclusively; every write runs in its own
//! transaction so a single record is either fully merged or untouched.

use super::{DocumentStore, RawDocument, RawRecord};
use crate::config::ExchangeRateConfig;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `documents`: tenant-scoped JSON documents
/// - `tenant_config`: per-tenant exchange rate settings
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            tenant_id TEXT NOT NULL,
            collection TEXT NOT NULL,
            doc_key TEXT NOT NULL,
            fields TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (tenant_id, collection, doc_key)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_scope ON documents(tenant_id, collection);

        -- manual_rate wins over market_rate while manual_rate_enabled = 1
        CREATE TABLE IF NOT EXISTS tenant_config (
            tenant_id TEXT PRIMARY KEY,
            manual_rate_enabled INTEGER NOT NULL DEFAULT 0,
            manual_rate REAL,
            market_rate REAL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Document store over a shared SQLite connection
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialise the schema
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        log::info!("Opened database: {}", path.display());
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SyncError::InvalidState("database lock poisoned".to_string()))
    }

    /// Store a manual exchange rate and make it the effective one
    pub fn set_manual_rate(&self, tenant_id: &str, rate: f64) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO tenant_config (tenant_id, manual_rate_enabled, manual_rate, updated_at)
             VALUES (?1, 1, ?2, datetime('now'))
             ON CONFLICT(tenant_id) DO UPDATE SET
                manual_rate_enabled = 1,
                manual_rate = excluded.manual_rate,
                updated_at = excluded.updated_at",
            params![tenant_id, rate],
        )?;
        log::info!("Manual exchange rate for {} set to {}", tenant_id, rate);
        Ok(())
    }

    /// Store the latest market exchange rate
    pub fn set_market_rate(&self, tenant_id: &str, rate: f64) -> Result<()> {
        self.lock()?.execute(
            "INSERT INTO tenant_config (tenant_id, market_rate, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(tenant_id) DO UPDATE SET
                market_rate = excluded.market_rate,
                updated_at = excluded.updated_at",
            params![tenant_id, rate],
        )?;
        Ok(())
    }

    /// Fall back to the market rate
    pub fn clear_manual_rate(&self, tenant_id: &str) -> Result<()> {
        self.lock()?.execute(
            "UPDATE tenant_config SET manual_rate_enabled = 0, updated_at = datetime('now')
             WHERE tenant_id = ?1",
            params![tenant_id],
        )?;
        Ok(())
    }

    /// Number of documents in a tenant's collection
    pub fn count(&self, tenant_id: &str, collection: &str) -> Result<i64> {
        let count = self.lock()?.query_row(
            "SELECT COUNT(*) FROM documents WHERE tenant_id = ?1 AND collection = ?2",
            params![tenant_id, collection],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Fetch a single document, if present
    pub fn get(&self, tenant_id: &str, collection: &str, key: &str) -> Result<Option<RawRecord>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT fields FROM documents
                 WHERE tenant_id = ?1 AND collection = ?2 AND doc_key = ?3",
                params![tenant_id, collection, key],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| parse_fields(&j)).transpose()
    }
}

fn parse_fields(json: &str) -> Result<RawRecord> {
    Ok(serde_json::from_str(json)?)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list_records(&self, tenant_id: &str, collection: &str) -> Result<Vec<RawDocument>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT doc_key, fields FROM documents
             WHERE tenant_id = ?1 AND collection = ?2
             ORDER BY doc_key",
        )?;

        let rows: Vec<(String, String)> = stmt
            .query_map(params![tenant_id, collection], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<_>>()?;

        rows.into_iter()
            .map(|(key, json)| {
                Ok(RawDocument {
                    key,
                    fields: parse_fields(&json)?,
                })
            })
            .collect()
    }

    async fn upsert(
        &self,
        tenant_id: &str,
        collection: &str,
        key: &str,
        fields: RawRecord,
        merge: bool,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT fields FROM documents
                 WHERE tenant_id = ?1 AND collection = ?2 AND doc_key = ?3",
                params![tenant_id, collection, key],
                |row| row.get(0),
            )
            .optional()?;

        let merged = match existing.as_deref().map(parse_fields).transpose()? {
            Some(mut current) if merge => {
                let before = current.clone();
                current.extend(fields);
                if current == before {
                    // identical merge: leave updated_at alone
                    return Ok(());
                }
                current
            }
            Some(current) if current == fields => return Ok(()),
            _ => fields,
        };

        tx.execute(
            "INSERT INTO documents (tenant_id, collection, doc_key, fields, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT(tenant_id, collection, doc_key) DO UPDATE SET
                fields = excluded.fields,
                updated_at = excluded.updated_at",
            params![
                tenant_id,
                collection,
                key,
                serde_json::to_string(&merged)?
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn delete(&self, tenant_id: &str, collection: &str, key: &str) -> Result<()> {
        self.lock()?.execute(
            "DELETE FROM documents WHERE tenant_id = ?1 AND collection = ?2 AND doc_key = ?3",
            params![tenant_id, collection, key],
        )?;
        Ok(())
    }

    async fn get_exchange_rate(&self, tenant_id: &str) -> Result<ExchangeRateConfig> {
        let conn = self.lock()?;
        let row: Option<(bool, Option<f64>, Option<f64>)> = conn
            .query_row(
                "SELECT manual_rate_enabled, manual_rate, market_rate
                 FROM tenant_config WHERE tenant_id = ?1",
                params![tenant_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let missing = || SyncError::ConfigMissing(format!("no exchange rate for tenant {tenant_id}"));
        match row {
            Some((true, Some(rate), _)) => Ok(ExchangeRateConfig { manual: true, rate }),
            Some((_, _, Some(rate))) => Ok(ExchangeRateConfig {
                manual: false,
                rate,
            }),
            _ => Err(missing()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::INVENTORY_COLLECTION;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn updated_at(store: &SqliteStore, key: &str) -> String {
        store
            .lock()
            .unwrap()
            .query_row(
                "SELECT updated_at FROM documents WHERE doc_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn init_schema_creates_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        let conn = store.lock().unwrap();
        for table in ["documents", "tenant_config"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn upsert_inserts_and_lists() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert("shop", INVENTORY_COLLECTION, "A", fields(json!({"quantity": 1})), true)
            .await
            .unwrap();
        store
            .upsert("shop", INVENTORY_COLLECTION, "B", fields(json!({"quantity": 2})), true)
            .await
            .unwrap();

        let docs = store.list_records("shop", INVENTORY_COLLECTION).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].key, "A");
        assert_eq!(docs[1].fields["quantity"], json!(2));
    }

    #[tokio::test]
    async fn upsert_merge_preserves_other_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert(
                "shop",
                INVENTORY_COLLECTION,
                "A",
                fields(json!({"quantity": 1, "location": "Estante 3"})),
                true,
            )
            .await
            .unwrap();
        store
            .upsert("shop", INVENTORY_COLLECTION, "A", fields(json!({"quantity": 5})), true)
            .await
            .unwrap();

        let doc = store.get("shop", INVENTORY_COLLECTION, "A").unwrap().unwrap();
        assert_eq!(doc["quantity"], json!(5));
        assert_eq!(doc["location"], json!("Estante 3"));
    }

    #[tokio::test]
    async fn upsert_without_merge_replaces() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert("shop", INVENTORY_COLLECTION, "A", fields(json!({"a": 1, "b": 2})), true)
            .await
            .unwrap();
        store
            .upsert("shop", INVENTORY_COLLECTION, "A", fields(json!({"a": 3})), false)
            .await
            .unwrap();

        let doc = store.get("shop", INVENTORY_COLLECTION, "A").unwrap().unwrap();
        assert_eq!(doc, fields(json!({"a": 3})));
    }

    #[tokio::test]
    async fn identical_merge_is_noop() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert("shop", INVENTORY_COLLECTION, "A", fields(json!({"q": 1})), true)
            .await
            .unwrap();
        // push updated_at into the past so a rewrite would be visible
        store
            .lock()
            .unwrap()
            .execute("UPDATE documents SET updated_at = '2000-01-01 00:00:00'", [])
            .unwrap();

        store
            .upsert("shop", INVENTORY_COLLECTION, "A", fields(json!({"q": 1})), true)
            .await
            .unwrap();
        assert_eq!(updated_at(&store, "A"), "2000-01-01 00:00:00");
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert("shop-1", INVENTORY_COLLECTION, "A", fields(json!({})), true)
            .await
            .unwrap();
        assert!(store
            .list_records("shop-2", INVENTORY_COLLECTION)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.count("shop-1", INVENTORY_COLLECTION).unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert("shop", INVENTORY_COLLECTION, "A", fields(json!({})), true)
            .await
            .unwrap();
        store.delete("shop", INVENTORY_COLLECTION, "A").await.unwrap();
        assert!(store.get("shop", INVENTORY_COLLECTION, "A").unwrap().is_none());
    }

    #[tokio::test]
    async fn exchange_rate_missing_is_config_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.get_exchange_rate("shop").await.unwrap_err();
        assert!(matches!(err, SyncError::ConfigMissing(_)));
    }

    #[tokio::test]
    async fn manual_rate_overrides_market() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_market_rate("shop", 36.0).unwrap();
        assert_eq!(
            store.get_exchange_rate("shop").await.unwrap(),
            ExchangeRateConfig { manual: false, rate: 36.0 }
        );

        store.set_manual_rate("shop", 40.0).unwrap();
        assert_eq!(
            store.get_exchange_rate("shop").await.unwrap(),
            ExchangeRateConfig { manual: true, rate: 40.0 }
        );

        store.clear_manual_rate("shop").unwrap();
        assert_eq!(store.get_exchange_rate("shop").await.unwrap().rate, 36.0);
    }

    #[test]
    fn open_creates_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("inventory.db");
        SqliteStore::open(&path).unwrap();
        assert!(path.exists());
    }
}
