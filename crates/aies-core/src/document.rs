use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{DeviceId, DeviceSchedule, Interval};
use crate::wire::WireDocument;

/// All devices' interval lists plus bookkeeping.
///
/// This is the unit of validation, persistence and notification. The
/// transforms below never mutate the receiver; they return a new document so
/// a candidate can be validated before anything shared is touched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "WireDocument", into = "WireDocument")]
pub struct ScheduleDocument {
    pub devices: BTreeMap<DeviceId, DeviceSchedule>,
    pub last_update: Option<DateTime<FixedOffset>>,
}

impl ScheduleDocument {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a document from device schedules. Later duplicates of the same
    /// device id replace earlier ones.
    pub fn from_devices(devices: impl IntoIterator<Item = DeviceSchedule>) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|d| (d.device_id.clone(), d))
                .collect(),
            last_update: None,
        }
    }

    pub fn with_last_update(mut self, at: DateTime<FixedOffset>) -> Self {
        self.last_update = Some(at);
        self
    }

    pub fn device(&self, id: &DeviceId) -> Option<&DeviceSchedule> {
        self.devices.get(id)
    }

    pub fn contains_device(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Total replacement. The caller validates `candidate` first.
    pub fn replace_all(&self, candidate: ScheduleDocument) -> ScheduleDocument {
        candidate
    }

    /// Copy of `self` with `device_id`'s intervals swapped for `intervals`.
    ///
    /// Returns [`CoreError::UnknownDevice`] when the device is absent: new
    /// devices only arrive through a full-document submission.
    pub fn merge_device_intervals(
        &self,
        device_id: &DeviceId,
        intervals: Vec<Interval>,
    ) -> Result<ScheduleDocument> {
        if !self.devices.contains_key(device_id) {
            return Err(CoreError::UnknownDevice {
                device_id: device_id.to_string(),
            });
        }
        let mut next = self.clone();
        if let Some(schedule) = next.devices.get_mut(device_id) {
            schedule.intervals = intervals;
        }
        Ok(next)
    }

    /// Copy of `self` without `device_id`. Absent devices are a no-op.
    pub fn remove_device(&self, device_id: &DeviceId) -> ScheduleDocument {
        let mut next = self.clone();
        next.devices.remove(device_id);
        next
    }

    /// Device ids whose interval lists differ between `self` and `other`,
    /// including devices present on only one side.
    pub fn changed_devices(&self, other: &ScheduleDocument) -> Vec<DeviceId> {
        let mut changed: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|(id, sched)| other.devices.get(*id) != Some(*sched))
            .map(|(id, _)| id.clone())
            .collect();
        changed.extend(
            other
                .devices
                .keys()
                .filter(|id| !self.devices.contains_key(*id))
                .cloned(),
        );
        changed.sort();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn heat() -> Interval {
        Interval::new(
            ts("2025-06-02T00:00:00+02:00"),
            ts("2025-06-02T01:00:00+02:00"),
            "heat",
        )
        .with_power(2.5)
        .with_energy(1.1)
    }

    fn doc() -> ScheduleDocument {
        ScheduleDocument::from_devices([
            DeviceSchedule::new("heater", vec![heat()]),
            DeviceSchedule::new("boiler", vec![]),
        ])
    }

    #[test]
    fn merge_replaces_only_target_device() {
        let d = doc();
        let edit = vec![heat().with_power(1.0)];
        let merged = d.merge_device_intervals(&"boiler".into(), edit.clone()).unwrap();

        assert_eq!(merged.device(&"boiler".into()).unwrap().intervals, edit);
        assert_eq!(merged.device(&"heater".into()), d.device(&"heater".into()));
        // receiver untouched
        assert!(d.device(&"boiler".into()).unwrap().intervals.is_empty());
    }

    #[test]
    fn merge_unknown_device_fails() {
        let err = doc()
            .merge_device_intervals(&"fridge".into(), vec![heat()])
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownDevice { ref device_id } if device_id == "fridge"));
        assert_eq!(err.code(), "UNKNOWN_DEVICE");
    }

    #[test]
    fn merge_is_idempotent() {
        let d = doc();
        let x = vec![heat()];
        let once = d.merge_device_intervals(&"boiler".into(), x.clone()).unwrap();
        let twice = once.merge_device_intervals(&"boiler".into(), x).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn remove_device_is_idempotent() {
        let d = doc();
        let removed = d.remove_device(&"heater".into());
        assert_eq!(removed.device_count(), 1);
        assert_eq!(removed.remove_device(&"heater".into()), removed);
        assert_eq!(d.device_count(), 2);
    }

    #[test]
    fn replace_all_returns_candidate() {
        let d = doc();
        let candidate = ScheduleDocument::empty();
        assert_eq!(d.replace_all(candidate.clone()), candidate);
    }

    #[test]
    fn changed_devices_covers_both_sides() {
        let a = doc();
        let b = a
            .remove_device(&"boiler".into())
            .merge_device_intervals(&"heater".into(), vec![])
            .unwrap();
        let c = ScheduleDocument::from_devices([DeviceSchedule::new("pump", vec![])]);

        assert_eq!(a.changed_devices(&a), Vec::<DeviceId>::new());
        assert_eq!(a.changed_devices(&b), vec![DeviceId::from("boiler"), DeviceId::from("heater")]);
        assert_eq!(b.changed_devices(&c).len(), 2);
    }
}
