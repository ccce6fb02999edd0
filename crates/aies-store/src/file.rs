use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aies_core::ScheduleDocument;
use async_trait::async_trait;
use tracing::debug;

use crate::envelope::{decode, encode};
use crate::error::Result;
use crate::store::DocumentStore;

/// Single JSON file, replaced atomically (write temp file, then rename).
///
/// Every save writes its own temp file, so a save abandoned by a timeout
/// can never interleave bytes with the next one.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    saves: Arc<AtomicU64>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            saves: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        let n = self.saves.fetch_add(1, Ordering::Relaxed);
        name.push(format!(".{}.{n}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self) -> Result<Option<ScheduleDocument>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => decode(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no schedule file yet");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, doc: &ScheduleDocument) -> Result<()> {
        let encoded = encode(doc)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path();
        let written = match tokio::fs::write(&tmp, encoded).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), "schedule file written");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_save_gets_its_own_temp_file() {
        let store = JsonFileStore::new("/var/lib/aies/schedule.json");
        let clone = store.clone();
        let a = store.tmp_path();
        let b = store.tmp_path();
        let c = clone.tmp_path();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a.parent(), Some(Path::new("/var/lib/aies")));
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("schedule.json."));
        assert!(name.ends_with(".tmp"));
    }
}
