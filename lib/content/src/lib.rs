//! Content managed through the SOS admin dashboard.
//!
//! Operators edit three collections of public safety content:
//! - emergency hotline numbers (`emergency_numbers`)
//! - emergency guides (`emergency_guides`)
//! - first-aid articles (`first_aids`)
//!
//! App users, their emergency contacts and their SOS history are read-only.

pub mod error;
pub mod record;
pub mod service;
pub mod stats;
pub mod users;

pub use error::ContentError;
pub use record::{ContentRecord, EmergencyGuide, EmergencyNumber, Entry, FirstAid};
pub use service::CollectionService;
pub use stats::{Content, ContentStats};
pub use users::{AppUser, Contact, DEFAULT_SOS_HISTORY_LIMIT, SosRecord, UserDirectory};
