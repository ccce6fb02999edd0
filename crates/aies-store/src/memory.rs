use aies_core::ScheduleDocument;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::envelope::{decode, encode};
use crate::error::Result;
use crate::store::DocumentStore;

/// In-process store. Keeps the encoded envelope so loads go through the same
/// decode path as the durable backends.
#[derive(Debug, Default)]
pub struct MemoryStore {
    raw: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with arbitrary stored text (e.g. a corrupt payload).
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    /// Currently stored text, if any.
    pub async fn raw(&self) -> Option<String> {
        self.raw.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self) -> Result<Option<ScheduleDocument>> {
        match self.raw.lock().await.as_deref() {
            Some(raw) => decode(raw),
            None => Ok(None),
        }
    }

    async fn save(&self, doc: &ScheduleDocument) -> Result<()> {
        let encoded = encode(doc)?;
        *self.raw.lock().await = Some(encoded);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
