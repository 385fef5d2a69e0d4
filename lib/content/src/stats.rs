//! Content facade and dashboard counters.

use crate::error::ContentError;
use crate::record::{ContentRecord, EmergencyGuide, EmergencyNumber, FirstAid};
use crate::service::CollectionService;
use crate::users::UserDirectory;
use rootcause::prelude::Report;
use serde::Serialize;
use sos_admin_platform_access::ADMINS_COLLECTION;
use sos_admin_store::DocumentStore;
use std::sync::Arc;
use tracing::instrument;

/// Record counts shown on the dashboard landing page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStats {
    pub emergency_numbers: usize,
    pub emergency_guides: usize,
    pub first_aid: usize,
    pub users: usize,
    pub admins: usize,
}

/// Entry point to every content collection over one store.
#[derive(Clone)]
pub struct Content {
    store: Arc<dyn DocumentStore>,
}

impl Content {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Returns the service for one record type.
    #[must_use]
    pub fn collection<T: ContentRecord>(&self) -> CollectionService<T> {
        CollectionService::new(Arc::clone(&self.store))
    }

    /// Returns the app user directory.
    #[must_use]
    pub fn users(&self) -> UserDirectory {
        UserDirectory::new(Arc::clone(&self.store))
    }

    /// Counts every collection concurrently.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<ContentStats, Report<ContentError>> {
        let (numbers, guides, aid, directory) = (
            self.collection::<EmergencyNumber>(),
            self.collection::<EmergencyGuide>(),
            self.collection::<FirstAid>(),
            self.users(),
        );
        let (emergency_numbers, emergency_guides, first_aid, users, admins) = futures::try_join!(
            numbers.count(),
            guides.count(),
            aid.count(),
            directory.count(),
            self.count_admins()
        )?;
        Ok(ContentStats {
            emergency_numbers,
            emergency_guides,
            first_aid,
            users,
            admins,
        })
    }

    /// Counts registry entries without decoding them.
    async fn count_admins(&self) -> Result<usize, Report<ContentError>> {
        let docs = self
            .store
            .list(ADMINS_COLLECTION)
            .await
            .map_err(|e| ContentError::from_store("admin", e.current_context()))?;
        Ok(docs.len())
    }
}
