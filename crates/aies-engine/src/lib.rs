//! `aies-engine`: the live schedule (coordinator, queries, events).
//!
//! # Overview
//!
//! The [`Coordinator`] owns the one current [`ScheduleDocument`]. Writers go
//! through it (validate → commit → persist → publish); readers take an
//! immutable snapshot and run the pure functions in [`query`] against it.
//!
//! # Events
//!
//! | Topic               | Published when                                   |
//! |---------------------|--------------------------------------------------|
//! | `updated`           | a document (full, partial, or removal) is in effect |
//! | `error`             | a candidate was rejected                         |
//! | `command_activated` | the [`CommandWatcher`] sees a device's active command change |
//!
//! [`ScheduleDocument`]: aies_core::ScheduleDocument

pub mod bus;
pub mod coordinator;
pub mod error;
pub mod query;
pub mod watcher;

pub use bus::{NotificationBus, ScheduleEvent, Subscription, Topic};
pub use coordinator::{Coordinator, CoordinatorOptions, CoordinatorStatus};
pub use error::{CoordinatorError, Result};
pub use query::{DeviceStatus, EventsInRange, FleetSummary};
pub use watcher::CommandWatcher;
