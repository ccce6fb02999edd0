use aies_store::StoreError;
use aies_validate::ValidationReport;
use thiserror::Error;

/// Errors returned by coordinator operations.
///
/// None of these are fatal: every path leaves the coordinator serving a
/// well-defined document.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The candidate failed structural or invariant checks. State unchanged.
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    /// A partial edit named a device the current document does not have.
    #[error("Unknown device: {device_id}")]
    UnknownDevice { device_id: String },

    /// The in-memory commit happened but the durable copy could not be written.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl CoordinatorError {
    /// Short error code string reported to transport clients.
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::Validation(_) => "VALIDATION_ERROR",
            CoordinatorError::UnknownDevice { .. } => "UNKNOWN_DEVICE",
            CoordinatorError::Persistence(_) => "IO_ERROR",
        }
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            CoordinatorError::Validation(report) => Some(report),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
