//! Versioned wrapper around the persisted document.
//!
//! `{ "version": 1, "key": "ai_energy_scheduler_data", "data": { ... } }`
//!
//! Decoding never panics: a different version is reported as "nothing
//! stored" so the coordinator starts empty, while bytes that are not a
//! document at all surface as [`StoreError::Malformed`].

use aies_core::config::{STORAGE_KEY, STORAGE_VERSION};
use aies_core::ScheduleDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, StoreError};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    key: String,
    data: ScheduleDocument,
}

/// Encode `doc` in the current envelope version.
pub fn encode(doc: &ScheduleDocument) -> Result<String> {
    let env = Envelope {
        version: STORAGE_VERSION,
        key: STORAGE_KEY.to_string(),
        data: doc.clone(),
    };
    Ok(serde_json::to_string(&env)?)
}

/// Decode stored text. `Ok(None)` means "treat as not found".
pub fn decode(raw: &str) -> Result<Option<ScheduleDocument>> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| StoreError::Malformed(e.to_string()))?;

    let Value::Object(obj) = &value else {
        return Err(StoreError::Malformed(
            "persisted state is not a JSON object".to_string(),
        ));
    };

    if let (Some(version), Some(data)) = (obj.get("version"), obj.get("data")) {
        let version = version.as_u64();
        if version != Some(u64::from(STORAGE_VERSION)) {
            warn!(
                found = ?version,
                expected = STORAGE_VERSION,
                "persisted document has a different storage version; ignoring it"
            );
            return Ok(None);
        }
        let doc = serde_json::from_value(data.clone())
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        return Ok(Some(doc));
    }

    // Pre-envelope layout: the bare document.
    if obj.contains_key("devices") || obj.contains_key("schedules") {
        let doc =
            serde_json::from_value(value).map_err(|e| StoreError::Malformed(e.to_string()))?;
        return Ok(Some(doc));
    }

    Err(StoreError::Malformed(
        "persisted state has neither an envelope nor a devices map".to_string(),
    ))
}
