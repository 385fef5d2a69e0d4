//! Editable content records.

use serde::{Deserialize, Serialize};
use sos_admin_core::DocumentId;
use sos_admin_store::{Document, FieldValue, Fields};

/// A record type stored in its own collection and edited by operators.
pub trait ContentRecord: Sized + Send + Sync + 'static {
    /// Collection holding the records.
    const COLLECTION: &'static str;
    /// Human-readable name used in messages.
    const KIND: &'static str;

    /// Decodes a stored document.
    fn from_document(doc: &Document) -> Result<Self, String>;

    /// Encodes the record for storage.
    fn to_fields(&self) -> Fields;

    /// Returns the record with its text fields trimmed.
    #[must_use]
    fn normalized(self) -> Self;

    /// Returns every validation problem, empty when valid.
    fn validate(&self) -> Vec<String>;

    /// Key lists are ordered by.
    fn sort_key(&self) -> &str;
}

/// A stored record together with its document id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry<T> {
    pub id: DocumentId,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Entry<T> {
    #[must_use]
    pub fn new(id: DocumentId, record: T) -> Self {
        Self { id, record }
    }
}

/// Reads a field as text. Missing and null read as empty; scalars are
/// rendered; arrays and maps are an error.
pub(crate) fn text(doc: &Document, name: &str) -> Result<String, String> {
    match doc.get(name) {
        None | Some(FieldValue::Null) => Ok(String::new()),
        Some(FieldValue::String(s)) => Ok(s.clone()),
        Some(FieldValue::Integer(i)) => Ok(i.to_string()),
        Some(FieldValue::Double(d)) => Ok(d.to_string()),
        Some(FieldValue::Boolean(b)) => Ok(b.to_string()),
        Some(other) => Err(format!("{name} is not text: {other:?}")),
    }
}

/// Reads an optional text field. Missing, null and empty read as `None`.
pub(crate) fn optional_text(doc: &Document, name: &str) -> Result<Option<String>, String> {
    text(doc, name).map(|value| (!value.is_empty()).then_some(value))
}

fn required(issues: &mut Vec<String>, name: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push(format!("{name} is required"));
    }
}

/// A hotline entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyNumber {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub category: String,
}

impl ContentRecord for EmergencyNumber {
    const COLLECTION: &'static str = "emergency_numbers";
    const KIND: &'static str = "emergency number";

    fn from_document(doc: &Document) -> Result<Self, String> {
        Ok(Self {
            name: text(doc, "name")?,
            number: text(doc, "number")?,
            category: text(doc, "category")?,
        }
        .normalized())
    }

    fn to_fields(&self) -> Fields {
        Fields::from([
            ("name".to_string(), self.name.clone().into()),
            ("number".to_string(), self.number.clone().into()),
            ("category".to_string(), self.category.clone().into()),
        ])
    }

    fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            number: self.number.trim().to_string(),
            category: self.category.trim().to_string(),
        }
    }

    fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        required(&mut issues, "name", &self.name);
        required(&mut issues, "number", &self.number);
        required(&mut issues, "category", &self.category);
        issues
    }

    fn sort_key(&self) -> &str {
        &self.name
    }
}

/// Title plus body text; the shape shared by guides and first-aid articles.
macro_rules! define_article {
    ($(#[$meta:meta])* $name:ident, $collection:literal, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            #[serde(default)]
            pub title: String,
            #[serde(default)]
            pub description: String,
        }

        impl ContentRecord for $name {
            const COLLECTION: &'static str = $collection;
            const KIND: &'static str = $kind;

            fn from_document(doc: &Document) -> Result<Self, String> {
                Ok(Self {
                    title: text(doc, "title")?,
                    description: text(doc, "description")?,
                })
            }

            fn to_fields(&self) -> Fields {
                Fields::from([
                    ("title".to_string(), self.title.clone().into()),
                    ("description".to_string(), self.description.clone().into()),
                ])
            }

            fn normalized(self) -> Self {
                Self {
                    title: self.title.trim().to_string(),
                    description: self.description.trim().to_string(),
                }
            }

            fn validate(&self) -> Vec<String> {
                let mut issues = Vec::new();
                required(&mut issues, "title", &self.title);
                required(&mut issues, "description", &self.description);
                issues
            }

            fn sort_key(&self) -> &str {
                &self.title
            }
        }
    };
}

define_article!(
    /// Guidance for a kind of emergency (flood, fire, ...).
    EmergencyGuide,
    "emergency_guides",
    "emergency guide"
);

define_article!(
    /// A first-aid procedure.
    FirstAid,
    "first_aids",
    "first aid article"
);
