use std::path::Path;
use std::sync::{Arc, Mutex};

use aies_core::config::{STORAGE_KEY, STORAGE_VERSION};
use aies_core::ScheduleDocument;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::init_db;
use crate::envelope::{decode, encode};
use crate::error::{Result, StoreError};
use crate::store::DocumentStore;

/// Keeps the document envelope in one row of the `documents` table.
///
/// rusqlite is synchronous, so every call runs on the blocking pool behind a
/// shared `Mutex<Connection>`.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    fn load_blocking(conn: &Connection) -> Result<Option<ScheduleDocument>> {
        let row = conn.query_row(
            "SELECT version, data FROM documents WHERE key = ?1",
            [STORAGE_KEY],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        );
        match row {
            Ok((version, _)) if version != i64::from(STORAGE_VERSION) => {
                warn!(
                    found = version,
                    expected = STORAGE_VERSION,
                    "stored document has a different storage version; ignoring it"
                );
                Ok(None)
            }
            Ok((_, data)) => decode(&data),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    fn save_blocking(conn: &Connection, encoded: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO documents (key, version, data, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                version = excluded.version,
                data = excluded.data,
                updated_at = excluded.updated_at",
            rusqlite::params![STORAGE_KEY, STORAGE_VERSION, encoded, now],
        )?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn load(&self) -> Result<Option<ScheduleDocument>> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            Self::load_blocking(&conn)
        })
        .await?
    }

    async fn save(&self, doc: &ScheduleDocument) -> Result<()> {
        let encoded = encode(doc)?;
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            Self::save_blocking(&conn, &encoded)
        })
        .await??;
        debug!("schedule document saved to sqlite");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aies_core::DeviceSchedule;

    fn store() -> SqliteStore {
        SqliteStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn empty_table_loads_none() {
        assert_eq!(store().load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_overwrites_single_row() {
        let s = store();
        let a = ScheduleDocument::from_devices([DeviceSchedule::new("a", vec![])]);
        let b = ScheduleDocument::from_devices([DeviceSchedule::new("b", vec![])]);
        s.save(&a).await.unwrap();
        s.save(&b).await.unwrap();
        assert_eq!(s.load().await.unwrap(), Some(b));

        let rows: i64 = s
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn other_version_row_loads_none() {
        let s = store();
        s.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO documents (key, version, data, updated_at) VALUES (?1, 0, '{}', 'x')",
                [STORAGE_KEY],
            )
            .unwrap();
        assert_eq!(s.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_row_is_malformed() {
        let s = store();
        s.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO documents (key, version, data, updated_at) VALUES (?1, 1, 'garbage', 'x')",
                [STORAGE_KEY],
            )
            .unwrap();
        assert!(matches!(s.load().await, Err(StoreError::Malformed(_))));
    }
}
