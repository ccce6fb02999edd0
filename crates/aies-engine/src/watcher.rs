use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use aies_core::DeviceId;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::info;

use crate::bus::Topic;
use crate::coordinator::Coordinator;
use crate::query::active_commands;

/// Devices whose active command differs from `prev`.
///
/// A device seen for the first time counts as changed; devices that
/// disappeared are dropped silently.
pub fn detect_changes(
    prev: &BTreeMap<DeviceId, Option<String>>,
    current: &BTreeMap<DeviceId, Option<String>>,
) -> Vec<(DeviceId, Option<String>)> {
    current
        .iter()
        .filter(|(id, cmd)| prev.get(*id) != Some(*cmd))
        .map(|(id, cmd)| (id.clone(), cmd.clone()))
        .collect()
}

/// Publishes `command_activated` whenever a device's active command changes,
/// either because time moved into a new interval or because a new document
/// was installed.
pub struct CommandWatcher {
    coordinator: Arc<Coordinator>,
    tick: Duration,
    last: BTreeMap<DeviceId, Option<String>>,
}

impl CommandWatcher {
    pub fn new(coordinator: Arc<Coordinator>, tick: Duration) -> Self {
        Self {
            coordinator,
            tick,
            last: BTreeMap::new(),
        }
    }

    /// Compare the commands active at `now` with the previous evaluation and
    /// publish one event per change. Returns the number of events published.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> usize {
        let snapshot = self.coordinator.snapshot();
        let current = active_commands(&snapshot, now);
        let changes = detect_changes(&self.last, &current);
        for (device_id, command) in &changes {
            info!(%device_id, ?command, "active command changed");
            self.coordinator
                .bus()
                .publish_command(device_id.clone(), command.clone());
        }
        self.last = current;
        changes.len()
    }

    /// Evaluate on every tick and after every document update until
    /// `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.tick.as_secs(), "command watcher started");
        let mut updates = self.coordinator.subscribe(Topic::Updated);
        let mut interval = tokio::time::interval(self.tick.max(Duration::from_millis(10)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.evaluate(Utc::now());
                }
                event = updates.recv() => {
                    if event.is_none() {
                        break;
                    }
                    self.evaluate(Utc::now());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("command watcher shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Option<&str>)]) -> BTreeMap<DeviceId, Option<String>> {
        entries
            .iter()
            .map(|(id, cmd)| (DeviceId::from(*id), cmd.map(str::to_string)))
            .collect()
    }

    #[test]
    fn first_sight_counts_as_change() {
        let changes = detect_changes(&BTreeMap::new(), &map(&[("heater", None)]));
        assert_eq!(changes, vec![(DeviceId::from("heater"), None)]);
    }

    #[test]
    fn only_differences_reported() {
        let prev = map(&[("heater", Some("heat")), ("ev", None), ("gone", Some("x"))]);
        let current = map(&[("heater", Some("heat")), ("ev", Some("charge"))]);
        let changes = detect_changes(&prev, &current);
        assert_eq!(changes, vec![(DeviceId::from("ev"), Some("charge".to_string()))]);
    }
}
