//! Document store collaborator for the SOS admin backend.
//!
//! Data lives in named collections of documents, each document being a map
//! of typed fields keyed by a [`DocumentId`]. Collection paths may address
//! sub-collections (`users/<uid>/contacts`).
//!
//! Two backends are provided:
//! - [`MemoryDocumentStore`]: process-local, used in tests and local runs
//! - [`FirestoreDocumentStore`]: Cloud Firestore over its REST API
//!
//! # Example
//!
//! ```
//! use sos_admin_store::{DocumentStore, FieldValue, Fields, MemoryDocumentStore};
//!
//! # tokio_test_block_on(async {
//! let store = MemoryDocumentStore::new();
//! let mut fields = Fields::new();
//! fields.insert("name".to_string(), FieldValue::from("Police"));
//! let id = store.create("emergency_numbers", fields).await.expect("create");
//!
//! let doc = store.get("emergency_numbers", &id).await.expect("get").expect("exists");
//! assert_eq!(doc.string("name"), Some("Police"));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().expect("runtime").block_on(f)
//! # }
//! ```
//!
//! [`DocumentId`]: sos_admin_core::DocumentId

pub mod document;
pub mod error;
pub mod firestore;
pub mod memory;
pub mod store;

pub use document::{Document, FieldValue, Fields};
pub use error::StoreError;
pub use firestore::{FirestoreConfig, FirestoreDocumentStore};
pub use memory::MemoryDocumentStore;
pub use store::{AccessTokenSource, DocumentStore};
