//! Error types for the document store.

use std::fmt;

/// Errors from document store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    Unavailable { details: String },
    /// The addressed document does not exist.
    NotFound { collection: String, id: String },
    /// The store refused the request (permissions, invalid argument, ...).
    Rejected { status: u16, details: String },
    /// A document could not be decoded.
    InvalidDocument { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => {
                write!(f, "document store unavailable: {details}")
            }
            Self::NotFound { collection, id } => {
                write!(f, "document '{collection}/{id}' not found")
            }
            Self::Rejected { status, details } => {
                write!(f, "document store rejected request ({status}): {details}")
            }
            Self::InvalidDocument { details } => {
                write!(f, "invalid document: {details}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
