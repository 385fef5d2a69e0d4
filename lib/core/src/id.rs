//! Strongly-typed identifiers.
//!
//! Identity ids are issued by the external identity provider and document
//! ids by the document store. Both are opaque strings, but they share the
//! document-store key rules because registry entries are keyed by identity id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Checks a raw key against the document-store key rules.
fn validate_key(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err("must not be empty".to_string());
    }
    if raw.contains('/') {
        return Err("must not contain '/'".to_string());
    }
    if raw == "." || raw == ".." {
        return Err("must not be '.' or '..'".to_string());
    }
    if raw.len() > 1500 {
        return Err("must be at most 1500 bytes".to_string());
    }
    Ok(())
}

/// Macro to generate a strongly-typed string key wrapper.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates an ID after checking the key rules.
            ///
            /// # Errors
            ///
            /// Returns an error if the key is empty, contains `/`, or is
            /// otherwise not usable as a document key.
            pub fn new(raw: impl Into<String>) -> Result<Self, ParseIdError> {
                let raw = raw.into();
                validate_key(&raw).map_err(|reason| ParseIdError {
                    id_type: stringify!($name),
                    reason,
                })?;
                Ok(Self(raw))
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseIdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Unique identifier of an authenticated principal, issued by the
    /// identity provider (the provider's `uid`/`localId`).
    IdentityId
);

define_id!(
    /// Key of a document within a collection.
    DocumentId
);

impl DocumentId {
    /// Generates a fresh, lexicographically sortable document key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl From<IdentityId> for DocumentId {
    fn from(id: IdentityId) -> Self {
        // Identity ids pass the same key rules, so no re-validation is needed.
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_identity_id() {
        let id: IdentityId = "Xy12abc".parse().expect("should parse");
        assert_eq!(id.as_str(), "Xy12abc");
        assert_eq!(id.to_string(), "Xy12abc");
    }

    #[test]
    fn parse_rejects_empty() {
        let err = IdentityId::new("").unwrap_err();
        assert_eq!(err.id_type, "IdentityId");
        assert!(err.reason.contains("empty"));
    }

    #[test]
    fn parse_rejects_slash() {
        let err = DocumentId::new("admins/abc").unwrap_err();
        assert_eq!(err.id_type, "DocumentId");
        assert!(err.to_string().contains("'/'"));
    }

    #[test]
    fn parse_rejects_dot_segments() {
        assert!(DocumentId::new(".").is_err());
        assert!(DocumentId::new("..").is_err());
    }

    #[test]
    fn generated_ids_are_unique_and_valid() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert_ne!(a, b);
        assert!(DocumentId::new(a.as_str()).is_ok());
    }

    #[test]
    fn identity_id_converts_to_document_id() {
        let uid = IdentityId::new("U1").expect("valid");
        let doc: DocumentId = uid.into();
        assert_eq!(doc.as_str(), "U1");
    }

    #[test]
    fn serde_rejects_invalid_key() {
        let parsed: Result<DocumentId, _> = serde_json::from_str("\"a/b\"");
        assert!(parsed.is_err());

        let parsed: DocumentId = serde_json::from_str("\"abc\"").expect("deserialize");
        assert_eq!(parsed.as_str(), "abc");
        assert_eq!(serde_json::to_string(&parsed).expect("serialize"), "\"abc\"");
    }
}
