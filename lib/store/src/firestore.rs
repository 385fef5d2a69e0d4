//! Cloud Firestore backend over the REST API.
//!
//! Documents are exchanged in Firestore's typed-value JSON encoding
//! (`{"stringValue": "..."}`, `{"timestampValue": "..."}`, ...).

use crate::document::{Document, FieldValue, Fields};
use crate::error::StoreError;
use crate::store::{AccessTokenSource, DocumentStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sos_admin_core::DocumentId;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Documents requested per list page. Lists follow page tokens to the end.
const LIST_PAGE_SIZE: u32 = 300;

/// Connection settings for a Firestore database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirestoreConfig {
    /// Google Cloud project id.
    project_id: String,
    /// Database id. Default: "(default)"
    #[serde(default = "default_database")]
    database: String,
    /// REST endpoint, overridable for the local emulator.
    /// Default: "https://firestore.googleapis.com/v1"
    #[serde(default = "default_endpoint")]
    endpoint: String,
    /// Web API key appended to requests, if any.
    #[serde(default)]
    api_key: Option<String>,
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_endpoint() -> String {
    "https://firestore.googleapis.com/v1".to_string()
}

impl FirestoreConfig {
    /// Creates a configuration for the default database of a project.
    #[must_use]
    pub fn new(project_id: String) -> Self {
        Self {
            project_id,
            database: default_database(),
            endpoint: default_endpoint(),
            api_key: None,
        }
    }

    /// Sets the database id.
    #[must_use]
    pub fn with_database(mut self, database: String) -> Self {
        self.database = database;
        self
    }

    /// Sets the REST endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Sets the web API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Returns the project id.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns the URL prefix of all documents in the database.
    #[must_use]
    pub fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.endpoint.trim_end_matches('/'),
            self.project_id,
            self.database
        )
    }
}

/// Firestore-backed document store.
#[derive(Clone)]
pub struct FirestoreDocumentStore {
    http: reqwest::Client,
    config: FirestoreConfig,
    tokens: Option<Arc<dyn AccessTokenSource>>,
}

impl FirestoreDocumentStore {
    /// Creates a store that sends requests without a bearer token.
    #[must_use]
    pub fn new(http: reqwest::Client, config: FirestoreConfig) -> Self {
        Self {
            http,
            config,
            tokens: None,
        }
    }

    /// Sends the signed-in principal's token with every request.
    #[must_use]
    pub fn with_token_source(mut self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.config.documents_url(), collection)
    }

    fn document_url(&self, collection: &str, id: &DocumentId) -> String {
        format!("{}/{}/{}", self.config.documents_url(), collection, id)
    }

    async fn request(&self, method: Method, url: String) -> RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.config.api_key {
            builder = builder.query(&[("key", key.as_str())]);
        }
        if let Some(tokens) = &self.tokens {
            if let Some(token) = tokens.access_token().await {
                builder = builder.bearer_auth(token);
            }
        }
        builder
    }

    async fn send(builder: RequestBuilder) -> Result<Response, Report<StoreError>> {
        builder.send().await.map_err(|e| {
            StoreError::Unavailable {
                details: e.to_string(),
            }
            .into()
        })
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        response: Response,
    ) -> Result<T, Report<StoreError>> {
        response.json::<T>().await.map_err(|e| {
            StoreError::InvalidDocument {
                details: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    #[instrument(skip(self), fields(project = %self.config.project_id))]
    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, Report<StoreError>> {
        let url = self.document_url(collection, id);
        let response = Self::send(self.request(Method::GET, url).await).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("document not found");
            return Ok(None);
        }
        let response = error_for_status(response).await?;
        let raw: RawDocument = Self::read_json(response).await?;
        Ok(Some(decode_document(raw)?))
    }

    #[instrument(skip(self), fields(project = %self.config.project_id))]
    async fn list(&self, collection: &str) -> Result<Vec<Document>, Report<StoreError>> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut builder = self
                .request(Method::GET, self.collection_url(collection))
                .await
                .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token.as_str())]);
            }
            let response = error_for_status(Self::send(builder).await?).await?;
            let page: ListResponse = Self::read_json(response).await?;
            documents.extend(decode_page(page.documents));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        debug!(count = documents.len(), "listed collection");
        Ok(documents)
    }

    #[instrument(skip(self, values), fields(project = %self.config.project_id))]
    async fn create(
        &self,
        collection: &str,
        values: Fields,
    ) -> Result<DocumentId, Report<StoreError>> {
        let builder = self
            .request(Method::POST, self.collection_url(collection))
            .await
            .json(&json!({ "fields": encode_fields(&values) }));
        let response = error_for_status(Self::send(builder).await?).await?;
        let raw: RawDocument = Self::read_json(response).await?;
        let id = document_id_from_name(&raw.name)?;
        debug!(id = %id, "document created");
        Ok(id)
    }

    #[instrument(skip(self, values), fields(project = %self.config.project_id))]
    async fn set(
        &self,
        collection: &str,
        id: &DocumentId,
        values: Fields,
    ) -> Result<(), Report<StoreError>> {
        let builder = self
            .request(Method::PATCH, self.document_url(collection, id))
            .await
            .json(&json!({ "fields": encode_fields(&values) }));
        error_for_status(Self::send(builder).await?).await?;
        Ok(())
    }

    #[instrument(skip(self, values), fields(project = %self.config.project_id))]
    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        values: Fields,
    ) -> Result<(), Report<StoreError>> {
        let mut params: Vec<(&str, String)> =
            vec![("currentDocument.exists", "true".to_string())];
        params.extend(
            values
                .keys()
                .map(|name| ("updateMask.fieldPaths", field_path(name))),
        );
        let builder = self
            .request(Method::PATCH, self.document_url(collection, id))
            .await
            .query(&params)
            .json(&json!({ "fields": encode_fields(&values) }));
        let response = Self::send(builder).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }
            .into());
        }
        error_for_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(project = %self.config.project_id))]
    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), Report<StoreError>> {
        let builder = self
            .request(Method::DELETE, self.document_url(collection, id))
            .await;
        error_for_status(Self::send(builder).await?).await?;
        Ok(())
    }
}

/// A document as returned by the REST API.
#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turns a non-success response into a [`StoreError::Rejected`].
async fn error_for_status(response: Response) -> Result<Response, Report<StoreError>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let details = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body);
    Err(StoreError::Rejected {
        status: status.as_u16(),
        details,
    }
    .into())
}

/// Extracts the trailing key from a full resource name
/// (`projects/p/databases/d/documents/admins/U1` yields `U1`).
fn document_id_from_name(name: &str) -> Result<DocumentId, Report<StoreError>> {
    let last = name.rsplit('/').next().unwrap_or_default();
    DocumentId::new(last).map_err(|e| {
        StoreError::InvalidDocument {
            details: format!("bad document name '{name}': {e}"),
        }
        .into()
    })
}

/// Quotes a field name for an update mask when it is not a simple identifier.
fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn decode_document(raw: RawDocument) -> Result<Document, Report<StoreError>> {
    let id = document_id_from_name(&raw.name)?;
    let fields = decode_fields(&raw.fields)?;
    Ok(Document::new(id, fields))
}

/// Decodes one page of a listing. Documents that cannot be decoded are
/// skipped so one bad entry never hides the rest of the collection.
fn decode_page(raw: Vec<RawDocument>) -> Vec<Document> {
    raw.into_iter()
        .filter_map(|raw| {
            let name = raw.name.clone();
            match decode_document(raw) {
                Ok(document) => Some(document),
                Err(e) => {
                    warn!(%name, error = %e.current_context(), "skipping undecodable document");
                    None
                }
            }
        })
        .collect()
}

/// Encodes a field map into Firestore's typed-value JSON.
#[must_use]
pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(name, value)| (name.clone(), encode_value(value)))
            .collect(),
    )
}

fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Boolean(b) => json!({ "booleanValue": b }),
        // The REST API carries 64-bit integers as strings.
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Double(d) => json!({ "doubleValue": d }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        FieldValue::Array(values) => {
            let values: Vec<Value> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        FieldValue::Map(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

/// Decodes Firestore's typed-value JSON into a field map.
///
/// # Errors
///
/// Returns [`StoreError::InvalidDocument`] for values of an unknown shape.
pub fn decode_fields(raw: &Map<String, Value>) -> Result<Fields, Report<StoreError>> {
    raw.iter()
        .map(|(name, value)| {
            decode_value(value)
                .map(|decoded| (name.clone(), decoded))
                .map_err(|details| {
                    Report::from(StoreError::InvalidDocument {
                        details: format!("field '{name}': {details}"),
                    })
                })
        })
        .collect()
}

fn decode_value(value: &Value) -> Result<FieldValue, String> {
    let Some(object) = value.as_object() else {
        return Err("expected a typed value object".to_string());
    };
    let Some((kind, inner)) = object.iter().next() else {
        return Err("empty typed value".to_string());
    };
    match kind.as_str() {
        "nullValue" => Ok(FieldValue::Null),
        "booleanValue" => inner
            .as_bool()
            .map(FieldValue::Boolean)
            .ok_or_else(|| "booleanValue is not a boolean".to_string()),
        "integerValue" => match inner {
            Value::String(s) => s
                .parse()
                .map(FieldValue::Integer)
                .map_err(|e| format!("integerValue '{s}': {e}")),
            Value::Number(n) => n
                .as_i64()
                .map(FieldValue::Integer)
                .ok_or_else(|| format!("integerValue {n} out of range")),
            _ => Err("integerValue is not an integer".to_string()),
        },
        "doubleValue" => match inner {
            Value::Number(n) => n
                .as_f64()
                .map(FieldValue::Double)
                .ok_or_else(|| format!("doubleValue {n} is not finite")),
            // NaN and infinities arrive as strings.
            Value::String(s) => s
                .parse()
                .map(FieldValue::Double)
                .map_err(|e| format!("doubleValue '{s}': {e}")),
            _ => Err("doubleValue is not a number".to_string()),
        },
        "stringValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(|| format!("{kind} is not a string")),
        "timestampValue" => {
            let raw = inner
                .as_str()
                .ok_or_else(|| "timestampValue is not a string".to_string())?;
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| format!("timestampValue '{raw}': {e}"))
        }
        "geoPointValue" => {
            let mut point = Fields::new();
            for axis in ["latitude", "longitude"] {
                let coordinate = inner.get(axis).and_then(Value::as_f64).unwrap_or(0.0);
                point.insert(axis.to_string(), FieldValue::Double(coordinate));
            }
            Ok(FieldValue::Map(point))
        }
        "arrayValue" => inner
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
            .unwrap_or_else(|| Ok(Vec::new()))
            .map(FieldValue::Array),
        "mapValue" => {
            let mut decoded = Fields::new();
            if let Some(fields) = inner.get("fields").and_then(Value::as_object) {
                for (name, value) in fields {
                    decoded.insert(name.clone(), decode_value(value)?);
                }
            }
            Ok(FieldValue::Map(decoded))
        }
        other => Err(format!("unsupported value type '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn documents_url_uses_defaults() {
        let config = FirestoreConfig::new("sos-app".to_string());
        assert_eq!(
            config.documents_url(),
            "https://firestore.googleapis.com/v1/projects/sos-app/databases/(default)/documents"
        );
    }

    #[test]
    fn documents_url_for_emulator() {
        let config = FirestoreConfig::new("demo".to_string())
            .with_endpoint("http://localhost:8080/v1/".to_string());
        assert_eq!(
            config.documents_url(),
            "http://localhost:8080/v1/projects/demo/databases/(default)/documents"
        );
    }

    #[test]
    fn id_taken_from_resource_name() {
        let id = document_id_from_name("projects/p/databases/(default)/documents/admins/U1")
            .expect("valid name");
        assert_eq!(id.as_str(), "U1");
    }

    #[test]
    fn integers_encode_as_strings() {
        let mut fields = Fields::new();
        fields.insert("count".to_string(), FieldValue::Integer(42));
        assert_eq!(
            encode_fields(&fields),
            json!({ "count": { "integerValue": "42" } })
        );
    }

    #[test]
    fn decode_admin_document() {
        let raw = json!({
            "role": { "stringValue": "super_admin" },
            "isActive": { "booleanValue": true },
            "lastLoginAt": { "timestampValue": "2024-05-01T10:00:00.123456Z" },
            "fullName": { "nullValue": null }
        });
        let fields = decode_fields(raw.as_object().expect("object")).expect("decode");

        assert_eq!(fields["role"].as_str(), Some("super_admin"));
        assert_eq!(fields["isActive"].as_bool(), Some(true));
        assert!(fields["fullName"].is_null());
        let expected = Utc
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .single()
            .expect("valid date")
            + chrono::Duration::microseconds(123_456);
        assert_eq!(fields["lastLoginAt"].as_timestamp(), Some(expected));
    }

    #[test]
    fn decode_nested_values() {
        let raw = json!({
            "phones": { "arrayValue": { "values": [
                { "stringValue": "191" },
                { "integerValue": 1669 }
            ] } },
            "empty": { "arrayValue": {} },
            "meta": { "mapValue": { "fields": { "v": { "doubleValue": 1.5 } } } }
        });
        let fields = decode_fields(raw.as_object().expect("object")).expect("decode");

        assert_eq!(
            fields["phones"],
            FieldValue::Array(vec![
                FieldValue::String("191".to_string()),
                FieldValue::Integer(1669),
            ])
        );
        assert_eq!(fields["empty"], FieldValue::Array(Vec::new()));
        let FieldValue::Map(meta) = &fields["meta"] else {
            panic!("expected map");
        };
        assert_eq!(meta["v"], FieldValue::Double(1.5));
    }

    #[test]
    fn listing_skips_undecodable_documents() {
        let page: ListResponse = serde_json::from_value(json!({
            "documents": [
                {
                    "name": "projects/p/databases/(default)/documents/admins/U1",
                    "fields": { "email": { "stringValue": "a@sos.com" } }
                },
                {
                    "name": "projects/p/databases/(default)/documents/admins/U2",
                    "fields": { "email": { "mysteryValue": 1 } }
                },
                {
                    "name": "projects/p/databases/(default)/documents/admins/U3",
                    "fields": {}
                }
            ],
            "nextPageToken": ""
        }))
        .expect("page");

        let documents = decode_page(page.documents);
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["U1", "U3"]);
        assert_eq!(documents[0].string("email"), Some("a@sos.com"));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let raw = json!({ "x": { "mysteryValue": 1 } });
        let err = decode_fields(raw.as_object().expect("object")).unwrap_err();
        assert!(err.current_context().to_string().contains("mysteryValue"));
    }

    #[test]
    fn field_path_quotes_special_names() {
        assert_eq!(field_path("lastLoginAt"), "lastLoginAt");
        assert_eq!(field_path("first-aid"), "`first-aid`");
        assert_eq!(field_path("9lives"), "`9lives`");
    }
}
