//! `aies-core`: schedule data model shared by every other crate.
//!
//! A [`ScheduleDocument`] maps each [`DeviceId`] to its [`DeviceSchedule`],
//! an ordered list of half-open [`Interval`]s. The document is a strict tree:
//! no cross-device references, so copy-on-write transforms are plain clones.

pub mod config;
pub mod document;
pub mod error;
pub mod types;
pub mod wire;

pub use document::ScheduleDocument;
pub use error::{CoreError, Result};
pub use types::{DeviceId, DeviceSchedule, Interval, IntervalSource};
