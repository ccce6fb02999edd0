pub mod devices;
pub mod error;
pub mod health;
pub mod query;
pub mod schedule;
