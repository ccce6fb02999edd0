use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static DEVICE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_]{0,63}$").unwrap());

/// Stable identity key of a scheduled device.
///
/// Collaborators derive display names and storage paths from it, so the
/// validator restricts it to `[a-z0-9_]` (see [`DeviceId::is_safe`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id is 1 to 64 chars, starts with `[a-z0-9]` and only
    /// contains `[a-z0-9_]`.
    pub fn is_safe(&self) -> bool {
        DEVICE_ID_REGEX.is_match(&self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Who decided an interval: the external planner or a manual calendar edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntervalSource {
    #[default]
    Ai,
    Manual,
}

impl fmt::Display for IntervalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalSource::Ai => write!(f, "ai"),
            IntervalSource::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for IntervalSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ai" => Ok(IntervalSource::Ai),
            "manual" => Ok(IntervalSource::Manual),
            other => Err(format!("unknown interval source: {other}")),
        }
    }
}

/// One scheduled command window for one device.
///
/// The range is half-open: `[start, end)`. Timestamps keep the offset they
/// were submitted with; comparisons are always by instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_kw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_kwh: Option<f64>,
    #[serde(default)]
    pub source: IntervalSource,
    /// Stored and round-tripped, never interpreted by queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_override: Option<String>,
}

impl Interval {
    pub fn new(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            start,
            end,
            command: command.into(),
            power_kw: None,
            energy_kwh: None,
            source: IntervalSource::Ai,
            command_override: None,
        }
    }

    pub fn with_power(mut self, kw: f64) -> Self {
        self.power_kw = Some(kw);
        self
    }

    pub fn with_energy(mut self, kwh: f64) -> Self {
        self.energy_kwh = Some(kwh);
        self
    }

    pub fn with_source(mut self, source: IntervalSource) -> Self {
        self.source = source;
        self
    }

    /// `start <= t < end`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        let t = t.fixed_offset();
        self.start <= t && t < self.end
    }

    /// `start > t`.
    pub fn is_future(&self, t: DateTime<Utc>) -> bool {
        self.start > t.fixed_offset()
    }

    /// True when the closed range `[from, to]` touches this interval.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.end >= from.fixed_offset() && self.start <= to.fixed_offset()
    }
}

/// All intervals of a single device.
///
/// Storage order is not significant for time lookups; queries order by
/// `start` themselves and only fall back to list position to break ties.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSchedule {
    pub device_id: DeviceId,
    pub intervals: Vec<Interval>,
}

impl DeviceSchedule {
    pub fn new(device_id: impl Into<DeviceId>, intervals: Vec<Interval>) -> Self {
        Self {
            device_id: device_id.into(),
            intervals,
        }
    }
}
