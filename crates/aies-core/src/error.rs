use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Partial edits may only touch devices that already exist in the document.
    #[error("Unknown device: {device_id}")]
    UnknownDevice { device_id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Short error code string reported to transport clients.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::UnknownDevice { .. } => "UNKNOWN_DEVICE",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
