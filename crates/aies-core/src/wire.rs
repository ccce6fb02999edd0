//! Serialized shape of a [`ScheduleDocument`].
//!
//! On the wire the device id is the map key and each entry only carries its
//! interval list. Older payloads name the map `schedules`; both spellings are
//! accepted and `devices` is always written.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::document::ScheduleDocument;
use crate::types::{DeviceId, DeviceSchedule, Interval};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireDocument {
    #[serde(default, alias = "schedules")]
    pub devices: BTreeMap<String, WireDevice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireDevice {
    #[serde(default)]
    pub intervals: Vec<Interval>,
}

impl From<WireDocument> for ScheduleDocument {
    fn from(wire: WireDocument) -> Self {
        let devices = wire
            .devices
            .into_iter()
            .map(|(id, dev)| {
                let id = DeviceId::from(id);
                (id.clone(), DeviceSchedule::new(id, dev.intervals))
            })
            .collect();
        ScheduleDocument {
            devices,
            last_update: wire.last_update,
        }
    }
}

impl From<ScheduleDocument> for WireDocument {
    fn from(doc: ScheduleDocument) -> Self {
        WireDocument {
            devices: doc
                .devices
                .into_iter()
                .map(|(id, sched)| {
                    (
                        id.0,
                        WireDevice {
                            intervals: sched.intervals,
                        },
                    )
                })
                .collect(),
            last_update: doc.last_update,
        }
    }
}

/// Serialize a document into an untyped JSON value (schema checks run on this).
pub fn to_value(doc: &ScheduleDocument) -> crate::error::Result<serde_json::Value> {
    Ok(serde_json::to_value(doc)?)
}

/// Convert an untyped JSON value into a typed document.
pub fn from_value(value: serde_json::Value) -> crate::error::Result<ScheduleDocument> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntervalSource;

    const PAYLOAD: &str = r#"{
        "schedules": {
            "heater": {
                "intervals": [
                    {
                        "start": "2025-06-02T00:00:00+02:00",
                        "end": "2025-06-02T01:00:00+02:00",
                        "command": "heat",
                        "power_kw": 2.5,
                        "energy_kwh": 1.1,
                        "source": "manual",
                        "command_override": "boost"
                    }
                ]
            }
        }
    }"#;

    #[test]
    fn legacy_schedules_key_is_accepted() {
        let doc: ScheduleDocument = serde_json::from_str(PAYLOAD).unwrap();
        let heater = doc.device(&"heater".into()).unwrap();
        assert_eq!(heater.device_id.as_str(), "heater");
        assert_eq!(heater.intervals[0].source, IntervalSource::Manual);
        assert_eq!(heater.intervals[0].command_override.as_deref(), Some("boost"));
        assert!(doc.last_update.is_none());
    }

    #[test]
    fn serializes_under_devices_key_and_keeps_offset() {
        let doc: ScheduleDocument = serde_json::from_str(PAYLOAD).unwrap();
        let value = to_value(&doc).unwrap();
        assert!(value.get("schedules").is_none());
        assert_eq!(
            value["devices"]["heater"]["intervals"][0]["start"],
            "2025-06-02T00:00:00+02:00"
        );
        // no last_update key when unset
        assert!(value.get("last_update").is_none());

        let back = from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn empty_object_is_empty_document() {
        let doc = from_value(serde_json::json!({})).unwrap();
        assert!(doc.is_empty());
    }
}
