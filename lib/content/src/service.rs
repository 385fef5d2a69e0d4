//! CRUD over one content collection.

use crate::error::ContentError;
use crate::record::{ContentRecord, Entry};
use rootcause::prelude::Report;
use sos_admin_core::DocumentId;
use sos_admin_store::DocumentStore;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Lists, reads and edits the records of one [`ContentRecord`] collection.
pub struct CollectionService<T> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CollectionService<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: ContentRecord> CollectionService<T> {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// Lists every record, ordered by the record's sort key.
    ///
    /// Documents that cannot be decoded are skipped.
    #[instrument(skip(self), fields(collection = T::COLLECTION))]
    pub async fn list(&self) -> Result<Vec<Entry<T>>, Report<ContentError>> {
        let docs = self
            .store
            .list(T::COLLECTION)
            .await
            .map_err(|e| ContentError::from_store(T::KIND, e.current_context()))?;
        let mut entries: Vec<Entry<T>> = docs
            .iter()
            .filter_map(|doc| match T::from_document(doc) {
                Ok(record) => Some(Entry::new(doc.id.clone(), record)),
                Err(reason) => {
                    warn!(id = %doc.id, %reason, "skipping undecodable document");
                    None
                }
            })
            .collect();
        entries.sort_by(|a, b| a.record.sort_key().cmp(b.record.sort_key()));
        debug!(count = entries.len(), "listed records");
        Ok(entries)
    }

    /// Reads one record.
    #[instrument(skip(self), fields(collection = T::COLLECTION))]
    pub async fn get(&self, id: &DocumentId) -> Result<Entry<T>, Report<ContentError>> {
        let doc = self
            .store
            .get(T::COLLECTION, id)
            .await
            .map_err(|e| ContentError::from_store(T::KIND, e.current_context()))?
            .ok_or_else(|| ContentError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            })?;
        let record = T::from_document(&doc).map_err(|reason| ContentError::Store {
            details: reason,
        })?;
        Ok(Entry::new(doc.id, record))
    }

    /// Validates and adds a record under a generated id.
    #[instrument(skip(self, record), fields(collection = T::COLLECTION))]
    pub async fn create(&self, record: T) -> Result<Entry<T>, Report<ContentError>> {
        let record = Self::checked(record)?;
        let id = self
            .store
            .create(T::COLLECTION, record.to_fields())
            .await
            .map_err(|e| ContentError::from_store(T::KIND, e.current_context()))?;
        debug!(%id, "created record");
        Ok(Entry::new(id, record))
    }

    /// Validates and overwrites the fields of an existing record.
    #[instrument(skip(self, record), fields(collection = T::COLLECTION))]
    pub async fn update(&self, id: &DocumentId, record: T) -> Result<Entry<T>, Report<ContentError>> {
        let record = Self::checked(record)?;
        self.store
            .update(T::COLLECTION, id, record.to_fields())
            .await
            .map_err(|e| ContentError::from_store(T::KIND, e.current_context()))?;
        debug!("updated record");
        Ok(Entry::new(id.clone(), record))
    }

    /// Deletes a record. Deleting a missing record succeeds.
    #[instrument(skip(self), fields(collection = T::COLLECTION))]
    pub async fn delete(&self, id: &DocumentId) -> Result<(), Report<ContentError>> {
        self.store
            .delete(T::COLLECTION, id)
            .await
            .map_err(|e| ContentError::from_store(T::KIND, e.current_context()))?;
        debug!("deleted record");
        Ok(())
    }

    /// Counts the records without decoding them.
    pub async fn count(&self) -> Result<usize, Report<ContentError>> {
        let docs = self
            .store
            .list(T::COLLECTION)
            .await
            .map_err(|e| ContentError::from_store(T::KIND, e.current_context()))?;
        Ok(docs.len())
    }

    fn checked(record: T) -> Result<T, ContentError> {
        let record = record.normalized();
        let issues = record.validate();
        if issues.is_empty() {
            Ok(record)
        } else {
            Err(ContentError::Validation { issues })
        }
    }
}
