//! Read-only access to mobile app users.
//!
//! Users are written by the mobile app, never by the dashboard. Each user
//! document has two sub-collections: `contacts` (emergency contacts) and
//! `sos_history` (past SOS alerts).

use crate::error::ContentError;
use crate::record::{Entry, optional_text, text};
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::Serialize;
use sos_admin_core::DocumentId;
use sos_admin_store::{Document, DocumentStore, FieldValue};
use std::cmp::Reverse;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Collection holding app users.
pub const USERS_COLLECTION: &str = "users";

/// Emergency contacts returned per user.
pub const CONTACTS_LIMIT: usize = 5;

/// SOS alerts returned when no limit is given.
pub const DEFAULT_SOS_HISTORY_LIMIT: usize = 10;

/// Upper bound on the SOS history limit.
pub const MAX_SOS_HISTORY_LIMIT: usize = 100;

const USER_KIND: &str = "user";

/// A mobile app user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUser {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub gender: Option<String>,
    pub blood_type: Option<String>,
    pub disease: Option<String>,
    pub allergy: Option<String>,
}

impl AppUser {
    fn from_document(doc: &Document) -> Result<Self, String> {
        Ok(Self {
            name: text(doc, "name")?,
            phone: text(doc, "phone")?,
            email: text(doc, "email")?,
            gender: optional_text(doc, "gender")?,
            blood_type: optional_text(doc, "bloodType")?,
            disease: optional_text(doc, "disease")?,
            allergy: optional_text(doc, "allergy")?,
        })
    }
}

/// An emergency contact of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub added_at: Option<DateTime<Utc>>,
}

impl Contact {
    fn from_document(doc: &Document) -> Result<Self, String> {
        Ok(Self {
            name: text(doc, "name")?,
            phone: text(doc, "phone")?,
            added_at: doc.timestamp("addedAt"),
        })
    }
}

/// One SOS alert sent by a user, with the profile snapshot taken at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SosRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub status: String,
    pub message: String,
    pub phone_numbers: Vec<String>,
    pub user_name: String,
    pub user_phone: String,
    pub user_gender: Option<String>,
    pub user_blood_type: Option<String>,
    pub user_disease: Option<String>,
    pub user_allergy: Option<String>,
}

impl SosRecord {
    fn from_document(doc: &Document) -> Result<Self, String> {
        Ok(Self {
            timestamp: doc.timestamp("timestamp"),
            status: text(doc, "status")?,
            message: text(doc, "message")?,
            phone_numbers: phone_numbers(doc.get("phoneNumbers"))?,
            user_name: text(doc, "userName")?,
            user_phone: text(doc, "userPhone")?,
            user_gender: optional_text(doc, "userGender")?,
            user_blood_type: optional_text(doc, "userBloodType")?,
            user_disease: optional_text(doc, "userDisease")?,
            user_allergy: optional_text(doc, "userAllergy")?,
        })
    }
}

/// The app stores recipients either as an array or as one comma-separated string.
fn phone_numbers(value: Option<&FieldValue>) -> Result<Vec<String>, String> {
    match value {
        None | Some(FieldValue::Null) => Ok(Vec::new()),
        Some(FieldValue::String(joined)) => Ok(joined
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect()),
        Some(FieldValue::Array(items)) => items
            .iter()
            .map(|item| match item {
                FieldValue::String(n) => Ok(n.trim().to_string()),
                FieldValue::Integer(n) => Ok(n.to_string()),
                other => Err(format!("phoneNumbers entry is not text: {other:?}")),
            })
            .collect(),
        Some(other) => Err(format!("phoneNumbers has unexpected type: {other:?}")),
    }
}

/// Decodes every document, skipping the ones that fail.
fn decode_all<T>(docs: &[Document], decode: fn(&Document) -> Result<T, String>) -> Vec<Entry<T>> {
    docs.iter()
        .filter_map(|doc| match decode(doc) {
            Ok(record) => Some(Entry::new(doc.id.clone(), record)),
            Err(reason) => {
                warn!(id = %doc.id, %reason, "skipping undecodable document");
                None
            }
        })
        .collect()
}

/// Newest first; entries without a time go last.
fn newest_first<T>(entries: &mut [Entry<T>], at: fn(&T) -> Option<DateTime<Utc>>) {
    entries.sort_by_key(|entry| Reverse(at(&entry.record)));
}

/// Read access to app users and their sub-collections.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn DocumentStore>,
}

impl UserDirectory {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Lists every user ordered by name.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Entry<AppUser>>, Report<ContentError>> {
        let docs = self
            .store
            .list(USERS_COLLECTION)
            .await
            .map_err(|e| ContentError::from_store(USER_KIND, e.current_context()))?;
        let mut users = decode_all(&docs, AppUser::from_document);
        users.sort_by(|a, b| a.record.name.cmp(&b.record.name));
        debug!(count = users.len(), "listed users");
        Ok(users)
    }

    /// Reads one user.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &DocumentId) -> Result<Entry<AppUser>, Report<ContentError>> {
        let doc = self
            .store
            .get(USERS_COLLECTION, id)
            .await
            .map_err(|e| ContentError::from_store(USER_KIND, e.current_context()))?
            .ok_or_else(|| ContentError::NotFound {
                kind: USER_KIND,
                id: id.to_string(),
            })?;
        let user = AppUser::from_document(&doc)
            .map_err(|reason| ContentError::Store { details: reason })?;
        Ok(Entry::new(doc.id, user))
    }

    /// Returns the user's most recently added contacts.
    #[instrument(skip(self))]
    pub async fn contacts(&self, id: &DocumentId) -> Result<Vec<Entry<Contact>>, Report<ContentError>> {
        let docs = self.sub_collection(id, "contacts").await?;
        let mut contacts = decode_all(&docs, Contact::from_document);
        newest_first(&mut contacts, |c| c.added_at);
        contacts.truncate(CONTACTS_LIMIT);
        Ok(contacts)
    }

    /// Returns the user's most recent SOS alerts.
    ///
    /// `limit` defaults to [`DEFAULT_SOS_HISTORY_LIMIT`] and is clamped to
    /// `1..=MAX_SOS_HISTORY_LIMIT`.
    #[instrument(skip(self))]
    pub async fn sos_history(
        &self,
        id: &DocumentId,
        limit: Option<usize>,
    ) -> Result<Vec<Entry<SosRecord>>, Report<ContentError>> {
        let limit = limit
            .unwrap_or(DEFAULT_SOS_HISTORY_LIMIT)
            .clamp(1, MAX_SOS_HISTORY_LIMIT);
        let docs = self.sub_collection(id, "sos_history").await?;
        let mut history = decode_all(&docs, SosRecord::from_document);
        newest_first(&mut history, |r| r.timestamp);
        history.truncate(limit);
        Ok(history)
    }

    /// Counts users without decoding them.
    pub async fn count(&self) -> Result<usize, Report<ContentError>> {
        let docs = self
            .store
            .list(USERS_COLLECTION)
            .await
            .map_err(|e| ContentError::from_store(USER_KIND, e.current_context()))?;
        Ok(docs.len())
    }

    async fn sub_collection(
        &self,
        id: &DocumentId,
        name: &str,
    ) -> Result<Vec<Document>, Report<ContentError>> {
        let path = format!("{USERS_COLLECTION}/{id}/{name}");
        self.store
            .list(&path)
            .await
            .map_err(|e| ContentError::from_store(USER_KIND, e.current_context()).into())
    }
}
