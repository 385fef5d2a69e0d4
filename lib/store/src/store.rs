//! The document store trait.

use crate::document::{Document, FieldValue, Fields};
use crate::error::StoreError;
use async_trait::async_trait;
use rootcause::prelude::Report;
use sos_admin_core::DocumentId;

/// Generic document store addressed by collection path and document id.
///
/// All reads are single-shot: `list` returns the whole collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one document, returning `None` when it does not exist.
    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, Report<StoreError>>;

    /// Reads every document of a collection.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, Report<StoreError>>;

    /// Adds a document under a store-generated key.
    async fn create(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<DocumentId, Report<StoreError>>;

    /// Writes a document at a known key, replacing any previous content.
    async fn set(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), Report<StoreError>>;

    /// Merges the given fields into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), Report<StoreError>>;

    /// Deletes a document. Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), Report<StoreError>>;

    /// Updates a single field of an existing document.
    async fn set_field(
        &self,
        collection: &str,
        id: &DocumentId,
        field: &str,
        value: FieldValue,
    ) -> Result<(), Report<StoreError>> {
        let mut fields = Fields::new();
        fields.insert(field.to_string(), value);
        self.update(collection, id, fields).await
    }
}

/// Supplies the bearer token of the signed-in principal for store requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Returns the current token, or `None` when nobody is signed in.
    async fn access_token(&self) -> Option<String>;
}
