//! Administrator registry.
//!
//! One document per operator in the `admins` collection, keyed by the
//! identity provider's uid. Entries whose role is not a known operator role
//! are treated as if they did not exist.

use crate::error::RegistryError;
use crate::role::AdminRole;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use sos_admin_core::{DocumentId, IdentityId};
use sos_admin_store::{Document, DocumentStore, FieldValue, Fields, StoreError};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Collection holding the registry.
pub const ADMINS_COLLECTION: &str = "admins";

/// A registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    pub admin_id: IdentityId,
    pub email: String,
    pub full_name: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AdminRecord {
    /// Decodes a stored document.
    ///
    /// A missing role reads as `admin` and a missing `isActive` as `true`;
    /// a role outside the operator roles is an error.
    pub fn from_document(doc: &Document) -> Result<Self, String> {
        let admin_id = IdentityId::new(doc.id.as_str()).map_err(|e| e.to_string())?;
        let role = match doc.get("role") {
            None | Some(FieldValue::Null) => AdminRole::default(),
            Some(FieldValue::String(raw)) => raw.parse::<AdminRole>()?,
            Some(other) => return Err(format!("role has unexpected type: {other:?}")),
        };
        let is_active = match doc.get("isActive") {
            None | Some(FieldValue::Null) => true,
            Some(FieldValue::Boolean(active)) => *active,
            Some(other) => return Err(format!("isActive has unexpected type: {other:?}")),
        };
        Ok(Self {
            admin_id,
            email: text_field(doc, "email")?,
            full_name: text_field(doc, "fullName")?,
            role,
            is_active,
            last_login_at: doc.timestamp("lastLoginAt"),
        })
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("email".to_string(), self.email.clone().into());
        fields.insert("fullName".to_string(), self.full_name.clone().into());
        fields.insert("role".to_string(), self.role.as_str().into());
        fields.insert("isActive".to_string(), self.is_active.into());
        fields.insert("lastLoginAt".to_string(), self.last_login_at.into());
        fields
    }
}

/// Reads a text field; missing and null read as empty.
fn text_field(doc: &Document, name: &str) -> Result<String, String> {
    match doc.get(name) {
        None | Some(FieldValue::Null) => Ok(String::new()),
        Some(FieldValue::String(value)) => Ok(value.clone()),
        Some(other) => Err(format!("{name} has unexpected type: {other:?}")),
    }
}

/// Input for creating or replacing a registry entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminInput {
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub role: Option<AdminRole>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AdminInput {
    /// Returns every validation problem, empty when valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.email.trim().is_empty() {
            issues.push("email is required".to_string());
        }
        issues
    }
}

/// Read/write access to the registry.
#[derive(Clone)]
pub struct AdminRegistry {
    store: Arc<dyn DocumentStore>,
}

impl AdminRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Looks up the entry for an identity.
    ///
    /// Returns `Ok(None)` when the entry is missing or malformed. Fails only
    /// when the registry cannot be read.
    #[instrument(skip(self))]
    pub async fn lookup(
        &self,
        uid: &IdentityId,
    ) -> Result<Option<AdminRecord>, Report<RegistryError>> {
        let doc = match self
            .store
            .get(ADMINS_COLLECTION, &DocumentId::from(uid.clone()))
            .await
        {
            Ok(doc) => doc,
            Err(e) => match e.current_context() {
                StoreError::InvalidDocument { details } => {
                    warn!(%details, "ignoring undecodable registry entry");
                    return Ok(None);
                }
                _ => {
                    return Err(RegistryError::Unavailable {
                        details: e.to_string(),
                    }
                    .into());
                }
            },
        };
        let Some(doc) = doc else {
            debug!("no registry entry");
            return Ok(None);
        };
        match AdminRecord::from_document(&doc) {
            Ok(record) => Ok(Some(record)),
            Err(reason) => {
                warn!(%reason, "ignoring malformed registry entry");
                Ok(None)
            }
        }
    }

    /// Lists all well-formed entries ordered by email.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<AdminRecord>, Report<RegistryError>> {
        let docs = self
            .store
            .list(ADMINS_COLLECTION)
            .await
            .map_err(|e| RegistryError::Unavailable {
                details: e.to_string(),
            })?;
        let mut records: Vec<AdminRecord> = docs
            .iter()
            .filter_map(|doc| match AdminRecord::from_document(doc) {
                Ok(record) => Some(record),
                Err(reason) => {
                    warn!(id = %doc.id, %reason, "skipping malformed registry entry");
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| a.email.cmp(&b.email));
        debug!(count = records.len(), "listed registry entries");
        Ok(records)
    }

    /// Creates or replaces the entry for an identity.
    ///
    /// An absent `lastLoginAt` is stamped with the current time.
    #[instrument(skip(self, input))]
    pub async fn save(
        &self,
        uid: &IdentityId,
        input: AdminInput,
    ) -> Result<AdminRecord, Report<RegistryError>> {
        let issues = input.validate();
        if !issues.is_empty() {
            return Err(RegistryError::InvalidRecord { issues }.into());
        }
        let record = AdminRecord {
            admin_id: uid.clone(),
            email: input.email.trim().to_string(),
            full_name: input.full_name.trim().to_string(),
            role: input.role.unwrap_or_default(),
            is_active: input.is_active.unwrap_or(true),
            last_login_at: Some(input.last_login_at.unwrap_or_else(Utc::now)),
        };
        self.store
            .set(
                ADMINS_COLLECTION,
                &DocumentId::from(uid.clone()),
                record.to_fields(),
            )
            .await
            .map_err(|e| RegistryError::WriteFailed {
                details: e.to_string(),
            })?;
        debug!(role = %record.role, "saved registry entry");
        Ok(record)
    }

    /// Stamps `lastLoginAt` with the current time.
    #[instrument(skip(self))]
    pub async fn touch_last_login(&self, uid: &IdentityId) -> Result<(), Report<RegistryError>> {
        self.store
            .set_field(
                ADMINS_COLLECTION,
                &DocumentId::from(uid.clone()),
                "lastLoginAt",
                Utc::now().into(),
            )
            .await
            .map_err(|e| RegistryError::WriteFailed {
                details: e.to_string(),
            })?;
        Ok(())
    }
}
