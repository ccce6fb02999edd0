//! Read-only time queries over a document snapshot.
//!
//! Every function is pure: it takes a snapshot and a reference instant and
//! never mutates. Intervals are treated as a set ordered by `start`; list
//! position only breaks ties.

use std::collections::BTreeMap;

use aies_core::{DeviceId, Interval, ScheduleDocument};
use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use serde::Serialize;

/// Command reported for a device with no active interval.
pub const IDLE_COMMAND: &str = "off";

/// The interval containing `now`. On overlap the latest start wins, and on an
/// equal start the one listed later.
pub fn active_interval<'a>(
    doc: &'a ScheduleDocument,
    device: &DeviceId,
    now: DateTime<Utc>,
) -> Option<&'a Interval> {
    doc.device(device)
        .and_then(|schedule| active_in(&schedule.intervals, now))
}

/// The future interval with the earliest start, then earliest end, then the
/// one listed first.
pub fn next_interval<'a>(
    doc: &'a ScheduleDocument,
    device: &DeviceId,
    now: DateTime<Utc>,
) -> Option<&'a Interval> {
    doc.device(device)
        .and_then(|schedule| next_in(&schedule.intervals, now))
}

fn active_in(intervals: &[Interval], now: DateTime<Utc>) -> Option<&Interval> {
    // max_by keeps the last of equal elements
    intervals
        .iter()
        .filter(|i| i.contains(now))
        .max_by(|a, b| a.start.cmp(&b.start))
}

fn next_in(intervals: &[Interval], now: DateTime<Utc>) -> Option<&Interval> {
    // min_by keeps the first of equal elements
    intervals
        .iter()
        .filter(|i| i.is_future(now))
        .min_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)))
}

/// Sum of `power_kw` over each device's single active interval.
pub fn aggregate_power(doc: &ScheduleDocument, now: DateTime<Utc>) -> f64 {
    doc.devices
        .values()
        .filter_map(|s| active_in(&s.intervals, now))
        .filter_map(|i| i.power_kw)
        .sum()
}

/// Sum of `energy_kwh` over every interval fully inside `[window_start, now]`.
///
/// An interval still running at `now` does not count, even if it started
/// inside the window.
pub fn aggregate_energy_today(
    doc: &ScheduleDocument,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let from = window_start.fixed_offset();
    let to = now.fixed_offset();
    doc.devices
        .values()
        .flat_map(|s| s.intervals.iter())
        .filter(|i| i.start >= from && i.end <= to)
        .filter_map(|i| i.energy_kwh)
        .sum()
}

/// Local midnight of `now`'s day, for a fixed offset east of UTC in seconds.
pub fn start_of_day(now: DateTime<Utc>, day_offset_secs: i32) -> DateTime<Utc> {
    let offset = FixedOffset::east_opt(day_offset_secs).unwrap_or_else(|| Utc.fix());
    now.with_timezone(&offset)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Intervals of `device` overlapping the closed range `[from, to]`, by start.
pub fn events_in_range<'a>(
    doc: &'a ScheduleDocument,
    device: &DeviceId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> EventsInRange<'a> {
    let intervals = doc
        .device(device)
        .map(|s| s.intervals.as_slice())
        .unwrap_or(&[]);
    EventsInRange::new(intervals, from, to)
}

/// Lazy iterator behind [`events_in_range`].
///
/// Only the start ordering is computed up front; the overlap filter runs as
/// the caller pulls. [`EventsInRange::restart`] (or a clone) replays it.
#[derive(Debug, Clone)]
pub struct EventsInRange<'a> {
    intervals: &'a [Interval],
    order: Vec<usize>,
    pos: usize,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl<'a> EventsInRange<'a> {
    fn new(intervals: &'a [Interval], from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        let mut order: Vec<usize> = if from <= to {
            (0..intervals.len()).collect()
        } else {
            Vec::new()
        };
        // stable: equal starts keep list order
        order.sort_by_key(|&i| intervals[i].start);
        Self {
            intervals,
            order,
            pos: 0,
            from,
            to,
        }
    }

    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

impl<'a> Iterator for EventsInRange<'a> {
    type Item = &'a Interval;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&idx) = self.order.get(self.pos) {
            self.pos += 1;
            let interval = &self.intervals[idx];
            if interval.overlaps(self.from, self.to) {
                return Some(interval);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.order.len() - self.pos))
    }
}

/// What a per-device display shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    /// Active command, or [`IDLE_COMMAND`].
    pub command: String,
    pub power_kw: Option<f64>,
    pub energy_kwh: Option<f64>,
    pub next_command: Option<String>,
    pub next_start: Option<DateTime<FixedOffset>>,
}

/// `None` when the device is not in the document.
pub fn device_status(
    doc: &ScheduleDocument,
    device: &DeviceId,
    now: DateTime<Utc>,
) -> Option<DeviceStatus> {
    let schedule = doc.device(device)?;
    let active = active_in(&schedule.intervals, now);
    let next = next_in(&schedule.intervals, now);
    Some(DeviceStatus {
        device_id: device.clone(),
        command: active
            .map(|i| i.command.clone())
            .unwrap_or_else(|| IDLE_COMMAND.to_string()),
        power_kw: active.and_then(|i| i.power_kw),
        energy_kwh: active.and_then(|i| i.energy_kwh),
        next_command: next.map(|i| i.command.clone()),
        next_start: next.map(|i| i.start),
    })
}

/// Fleet-wide figures, rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetSummary {
    pub total_power_kw: f64,
    pub total_energy_kwh_today: f64,
    pub last_update: Option<DateTime<FixedOffset>>,
    pub num_devices: usize,
}

pub fn fleet_summary(doc: &ScheduleDocument, now: DateTime<Utc>, day_offset_secs: i32) -> FleetSummary {
    let today = start_of_day(now, day_offset_secs);
    FleetSummary {
        total_power_kw: round2(aggregate_power(doc, now)),
        total_energy_kwh_today: round2(aggregate_energy_today(doc, today, now)),
        last_update: doc.last_update,
        num_devices: doc.device_count(),
    }
}

/// Active command per device (`None` when idle).
pub fn active_commands(doc: &ScheduleDocument, now: DateTime<Utc>) -> BTreeMap<DeviceId, Option<String>> {
    doc.devices
        .iter()
        .map(|(id, s)| (id.clone(), active_in(&s.intervals, now).map(|i| i.command.clone())))
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
