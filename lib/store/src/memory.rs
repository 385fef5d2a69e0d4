//! Process-local document store.

use crate::document::{Document, Fields};
use crate::error::StoreError;
use crate::store::DocumentStore;
use async_trait::async_trait;
use rootcause::prelude::Report;
use sos_admin_core::DocumentId;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, watch};

type Collection = BTreeMap<DocumentId, Fields>;

/// In-memory document store.
///
/// Documents are kept per collection path in key order. Reads and writes can
/// be switched to fail, which simulates an unreachable backend, and reads can
/// be held back to simulate a slow one.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads_open: watch::Sender<bool>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self {
            collections: RwLock::default(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads_open: watch::channel(true).0,
        }
    }
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read fail with [`StoreError::Unavailable`].
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent write fail with [`StoreError::Unavailable`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// While held, reads wait until released instead of completing.
    pub fn hold_reads(&self, hold: bool) {
        self.reads_open.send_replace(!hold);
    }

    async fn wait_for_reads(&self) {
        let mut open = self.reads_open.subscribe();
        // The sender lives as long as the store, so this only returns once open.
        let _ = open.wait_for(|open| *open).await;
    }

    fn check_reads(&self) -> Result<(), Report<StoreError>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                details: "reads disabled".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), Report<StoreError>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                details: "writes disabled".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, Report<StoreError>> {
        self.wait_for_reads().await;
        self.check_reads()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id.clone(), fields.clone())))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, Report<StoreError>> {
        self.wait_for_reads().await;
        self.check_reads()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<DocumentId, Report<StoreError>> {
        self.check_writes()?;
        let id = DocumentId::generate();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn set(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), Report<StoreError>> {
        self.check_writes()?;
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<(), Report<StoreError>> {
        self.check_writes()?;
        let mut collections = self.collections.write().await;
        let existing = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        existing.extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), Report<StoreError>> {
        self.check_writes()?;
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}
