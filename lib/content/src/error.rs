//! Error types for content management.

use sos_admin_store::StoreError;
use std::fmt;

/// Errors from content operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// The record failed validation; nothing was written.
    Validation { issues: Vec<String> },
    /// The addressed record does not exist.
    NotFound { kind: &'static str, id: String },
    /// The document store failed.
    Store { details: String },
}

impl ContentError {
    pub(crate) fn from_store(kind: &'static str, err: &StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => Self::NotFound {
                kind,
                id: id.clone(),
            },
            other => Self::Store {
                details: other.to_string(),
            },
        }
    }
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { issues } => write!(f, "{}", issues.join(", ")),
            Self::NotFound { kind, id } => write!(f, "{kind} '{id}' not found"),
            Self::Store { details } => write!(f, "storage error: {details}"),
        }
    }
}

impl std::error::Error for ContentError {}
