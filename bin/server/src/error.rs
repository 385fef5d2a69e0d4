//! Error responses for API handlers.
//!
//! Domain errors are mapped onto status codes here. Internal details are
//! logged and replaced with a generic message in the response body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rootcause::prelude::Report;
use serde_json::json;
use sos_admin_content::ContentError;
use sos_admin_platform_access::RegistryError;

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    Content(ContentError),
    Registry(RegistryError),
}

impl From<Report<ContentError>> for ApiError {
    fn from(report: Report<ContentError>) -> Self {
        Self::Content(report.current_context().clone())
    }
}

impl From<Report<RegistryError>> for ApiError {
    fn from(report: Report<RegistryError>) -> Self {
        Self::Registry(report.current_context().clone())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Content(ContentError::Validation { issues })
            | Self::Registry(RegistryError::InvalidRecord { issues }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": issues.join(", "), "issues": issues }),
            ),
            Self::Content(err @ ContentError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
            }
            Self::Content(err @ ContentError::Store { .. }) => {
                tracing::error!("Storage error: {}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "Storage unavailable" }),
                )
            }
            Self::Registry(err) => {
                tracing::error!("Registry error: {}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "Administrator registry unavailable" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_unprocessable() {
        let response = ApiError::Content(ContentError::Validation {
            issues: vec!["name is required".to_string()],
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn not_found_is_404() {
        let response = ApiError::Content(ContentError::NotFound {
            kind: "user",
            id: "x".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn registry_outage_is_503() {
        let response = ApiError::Registry(RegistryError::Unavailable {
            details: "timeout".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
