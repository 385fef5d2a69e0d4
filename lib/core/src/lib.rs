//! Core domain types and utilities for the SOS admin backend.
//!
//! This crate provides the identifiers and the error-handling foundation
//! shared by the document store, platform access, and content crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{DocumentId, IdentityId, ParseIdError};
