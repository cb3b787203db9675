use thiserror::Error;

/// A record failed one or more field rules.
///
/// Carries every violated rule, not just the first, so a caller can fix all
/// of them in one pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed: {}", .violations.join("; "))]
pub struct ValidationError {
    pub violations: Vec<String>,
}

impl ValidationError {
    pub fn new(violations: Vec<String>) -> Self {
        Self { violations }
    }

    pub fn contains(&self, message: &str) -> bool {
        self.violations.iter().any(|v| v == message)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("An active record already exists for {key}")]
    Duplicate { key: String },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed document: {0}")]
    Json(#[from] serde_json::Error),
}
