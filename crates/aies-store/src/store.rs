use std::sync::Arc;

use aies_core::config::{StorageBackend, StorageConfig};
use aies_core::ScheduleDocument;
use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::{JsonFileStore, MemoryStore, SqliteStore};

/// Durable home of the schedule document.
///
/// The coordinator only needs these two calls; the backing medium is up to
/// the implementation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the persisted document. `Ok(None)` means nothing usable is stored
    /// (never written, or written by an incompatible storage version).
    async fn load(&self) -> Result<Option<ScheduleDocument>>;

    /// Persist `doc`, replacing whatever was stored before.
    async fn save(&self, doc: &ScheduleDocument) -> Result<()>;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}

/// Build the backend selected in config.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(&config.path)?),
        StorageBackend::Json => Arc::new(JsonFileStore::new(&config.path)),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!(backend = store.backend(), path = %config.path, "document store ready");
    Ok(store)
}
