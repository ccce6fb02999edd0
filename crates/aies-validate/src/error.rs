use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The schema document itself could not be read or compiled.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid schema keyword at {path}: {reason}")]
    InvalidKeyword { path: String, reason: String },

    #[error("unsupported schema keyword at {path}: {keyword}")]
    Unsupported { path: String, keyword: String },
}

/// One failed check, located by a `$.a.b[0].c` style path into the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub path: String,
    pub reason: String,
}

impl FieldIssue {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Every issue found in a rejected candidate. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<FieldIssue>,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation issue(s)", self.issues.len())?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

pub type Result<T> = std::result::Result<T, SchemaError>;
