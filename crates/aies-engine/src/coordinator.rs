use std::sync::{Arc, RwLock};
use std::time::Duration;

use aies_core::config::{AiesConfig, DEFAULT_BUS_CAPACITY, DEFAULT_PERSIST_TIMEOUT_MS};
use aies_core::{DeviceId, Interval, ScheduleDocument};
use aies_store::{DocumentStore, StoreError};
use aies_validate::{ValidationReport, ValidationResult, Validator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::bus::{NotificationBus, Subscription, Topic};
use crate::error::{CoordinatorError, Result};

/// Tunables for a [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Upper bound on one load or save; exceeding it is a persistence failure.
    pub persist_timeout: Duration,
    pub bus_capacity: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            persist_timeout: Duration::from_millis(DEFAULT_PERSIST_TIMEOUT_MS),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl From<&AiesConfig> for CoordinatorOptions {
    fn from(config: &AiesConfig) -> Self {
        Self {
            persist_timeout: Duration::from_millis(config.storage.persist_timeout_ms),
            bus_capacity: config.bus.capacity,
        }
    }
}

/// Externally observable coordinator health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorStatus {
    /// False after a rejected submission or a corrupt initial load.
    pub valid: bool,
    pub last_error: Option<String>,
    /// Whether the durable copy matches the in-memory document.
    pub persisted: bool,
    /// When the in-memory document last changed.
    pub updated_at: Option<DateTime<Utc>>,
    pub device_count: usize,
}

struct CoordinatorState {
    current: Arc<ScheduleDocument>,
    valid: bool,
    last_error: Option<String>,
    persisted: bool,
    updated_at: Option<DateTime<Utc>>,
}

/// Single owner of the live schedule document.
///
/// Writers are serialized by an async mutex held across
/// validate → commit → persist → publish. Readers never take that lock: they
/// clone an `Arc` snapshot out of a short-lived `RwLock` and query it at
/// leisure, so a concurrent write can never produce a torn read.
pub struct Coordinator {
    state: RwLock<CoordinatorState>,
    writer: Mutex<()>,
    validator: Validator,
    store: Arc<dyn DocumentStore>,
    bus: NotificationBus,
    persist_timeout: Duration,
}

impl Coordinator {
    /// Start from whatever the store holds.
    ///
    /// Never fails: a missing document starts empty and valid, while an
    /// unreadable or invalid one starts empty and invalid.
    pub async fn load(
        store: Arc<dyn DocumentStore>,
        validator: Validator,
        options: CoordinatorOptions,
    ) -> Self {
        let loaded = match tokio::time::timeout(options.persist_timeout, store.load()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                ms: options.persist_timeout.as_millis() as u64,
            }),
        };

        let state = match loaded {
            Ok(Some(doc)) => match validator.validate(&doc) {
                ValidationResult::Valid => {
                    info!(
                        backend = store.backend(),
                        devices = doc.device_count(),
                        "schedule document loaded"
                    );
                    CoordinatorState {
                        current: Arc::new(doc),
                        valid: true,
                        last_error: None,
                        persisted: true,
                        updated_at: None,
                    }
                }
                ValidationResult::Invalid(report) => {
                    error!(backend = store.backend(), %report, "persisted document is invalid; starting empty");
                    Self::degraded_state(format!("persisted document is invalid: {report}"))
                }
            },
            Ok(None) => {
                info!(backend = store.backend(), "no persisted schedule; starting empty");
                CoordinatorState {
                    current: Arc::new(ScheduleDocument::empty()),
                    valid: true,
                    last_error: None,
                    persisted: true,
                    updated_at: None,
                }
            }
            Err(e) => {
                error!(backend = store.backend(), "failed to load persisted schedule: {e}");
                Self::degraded_state(format!("failed to load persisted document: {e}"))
            }
        };

        Self {
            state: RwLock::new(state),
            writer: Mutex::new(()),
            validator,
            store,
            bus: NotificationBus::new(options.bus_capacity),
            persist_timeout: options.persist_timeout,
        }
    }

    fn degraded_state(reason: String) -> CoordinatorState {
        CoordinatorState {
            current: Arc::new(ScheduleDocument::empty()),
            valid: false,
            last_error: Some(reason),
            persisted: false,
            updated_at: None,
        }
    }

    // --- reads --------------------------------------------------------------

    /// Immutable view of the current document.
    pub fn snapshot(&self) -> Arc<ScheduleDocument> {
        Arc::clone(&self.state.read().unwrap().current)
    }

    pub fn status(&self) -> CoordinatorStatus {
        let state = self.state.read().unwrap();
        CoordinatorStatus {
            valid: state.valid,
            last_error: state.last_error.clone(),
            persisted: state.persisted,
            updated_at: state.updated_at,
            device_count: state.current.device_count(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state.read().unwrap().valid
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.bus.subscribe(topic)
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    // --- writes -------------------------------------------------------------

    /// Replace the whole document after validating it. Returns the document
    /// this call installed, even if another writer has replaced it since.
    pub async fn submit_full(&self, candidate: ScheduleDocument) -> Result<Arc<ScheduleDocument>> {
        let _guard = self.writer.lock().await;
        match self.validator.validate(&candidate) {
            ValidationResult::Valid => {
                let next = self.snapshot().replace_all(candidate);
                self.commit(next).await
            }
            ValidationResult::Invalid(report) => Err(self.reject(report)),
        }
    }

    /// Same as [`submit_full`](Self::submit_full) for an untyped payload.
    ///
    /// Structural problems in the payload are reported as validation
    /// failures with field paths, exactly like invariant violations.
    pub async fn submit_json(&self, raw: Value) -> Result<Arc<ScheduleDocument>> {
        let _guard = self.writer.lock().await;
        match self.validator.parse(raw) {
            Ok(candidate) => {
                let next = self.snapshot().replace_all(candidate);
                self.commit(next).await
            }
            Err(report) => Err(self.reject(report)),
        }
    }

    /// Replace one existing device's intervals.
    ///
    /// The merged document as a whole must validate. An unknown device is
    /// refused before validation and leaves every piece of state untouched.
    #[instrument(skip(self, device_id, intervals), fields(device_id = %device_id, count = intervals.len()))]
    pub async fn submit_partial(
        &self,
        device_id: &DeviceId,
        intervals: Vec<Interval>,
    ) -> Result<Arc<ScheduleDocument>> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();
        // merge only fails for an absent device
        let candidate = current
            .merge_device_intervals(device_id, intervals)
            .map_err(|_| Self::unknown_device(device_id))?;
        match self.validator.validate(&candidate) {
            ValidationResult::Valid => self.commit(candidate).await,
            ValidationResult::Invalid(report) => Err(self.reject(report)),
        }
    }

    /// [`submit_partial`](Self::submit_partial) for an untyped interval list.
    ///
    /// The device must exist before the fragment is looked at. A malformed
    /// fragment is then rejected like any other invalid candidate.
    #[instrument(skip(self, device_id, intervals), fields(device_id = %device_id))]
    pub async fn submit_partial_json(
        &self,
        device_id: &DeviceId,
        intervals: Value,
    ) -> Result<Arc<ScheduleDocument>> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot();
        if !current.contains_device(device_id) {
            return Err(Self::unknown_device(device_id));
        }
        match self.validator.parse_partial(&current, device_id, intervals) {
            Ok(candidate) => self.commit(candidate).await,
            Err(report) => Err(self.reject(report)),
        }
    }

    /// Drop a device. Not validated, and idempotent for absent devices.
    ///
    /// Only a persistence failure is reported; the removal itself always
    /// takes effect in memory.
    pub async fn remove_device(&self, device_id: &DeviceId) -> Result<()> {
        let _guard = self.writer.lock().await;
        let next = self.snapshot().remove_device(device_id);
        info!(%device_id, "removing device");
        self.install(next, None).await.map(|_| ())
    }

    /// Install a validated document and mark the coordinator valid.
    async fn commit(&self, next: ScheduleDocument) -> Result<Arc<ScheduleDocument>> {
        self.install(next, Some(true)).await
    }

    /// Swap the document in, persist it, and announce it.
    ///
    /// `valid` of `None` keeps the current validity flag. A persistence
    /// failure does not roll back the in-memory swap.
    async fn install(
        &self,
        next: ScheduleDocument,
        valid: Option<bool>,
    ) -> Result<Arc<ScheduleDocument>> {
        let next = Arc::new(next);
        let changed = {
            let mut state = self.state.write().unwrap();
            let changed = state.current.changed_devices(&next);
            state.current = Arc::clone(&next);
            state.updated_at = Some(Utc::now());
            if let Some(valid) = valid {
                state.valid = valid;
                if valid {
                    state.last_error = None;
                }
            }
            changed
        };

        let persisted = self.persist(&next).await;
        self.state.write().unwrap().persisted = persisted.is_ok();

        info!(devices = next.device_count(), changed = changed.len(), "schedule committed");
        self.bus.publish_updated(Arc::clone(&next), changed);
        persisted.map(|()| next).map_err(CoordinatorError::from)
    }

    async fn persist(&self, doc: &ScheduleDocument) -> std::result::Result<(), StoreError> {
        let result = match tokio::time::timeout(self.persist_timeout, self.store.save(doc)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                ms: self.persist_timeout.as_millis() as u64,
            }),
        };
        if let Err(e) = &result {
            error!(
                backend = self.store.backend(),
                "persist failed, serving in-memory document (degraded): {e}"
            );
        }
        result
    }

    fn unknown_device(device_id: &DeviceId) -> CoordinatorError {
        warn!(%device_id, "partial edit refused: unknown device");
        CoordinatorError::UnknownDevice {
            device_id: device_id.to_string(),
        }
    }

    fn reject(&self, report: ValidationReport) -> CoordinatorError {
        warn!(issues = report.issues.len(), "schedule rejected: {report}");
        {
            let mut state = self.state.write().unwrap();
            state.valid = false;
            state.last_error = Some(report.to_string());
        }
        self.bus.publish_error(report.clone());
        CoordinatorError::Validation(report)
    }
}
