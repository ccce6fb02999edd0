//! `aies-validate`: structural schema checks plus model invariants.
//!
//! [`Validator::validate`] is the single gate every candidate document passes
//! before the coordinator commits it. Schema *content* is external: load it
//! with [`Schema::load`] or fall back to [`Schema::builtin`].

pub mod error;
pub mod schema;
pub mod validator;

pub use error::{FieldIssue, Result, SchemaError, ValidationReport};
pub use schema::Schema;
pub use validator::{check_invariants, ValidationResult, Validator};
