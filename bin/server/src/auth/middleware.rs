//! Route guard extractors for Axum.
//!
//! Every protected handler takes one of these extractors. They evaluate the
//! current operator session with the route guard and reject the request
//! before the handler runs unless the decision is to allow.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use sos_admin_platform_access::{
    RouteDecision, SIGN_IN_PATH, Session, evaluate, evaluate_super_admin,
};
use std::sync::Arc;

use crate::state::AppState;

/// Seconds a client should wait before retrying while a session resolves.
const RETRY_AFTER_SECS: &str = "1";

/// Extractor for requiring an operator session.
pub struct RequireOperator(pub Session);

impl<S> FromRequestParts<S> for RequireOperator
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = GuardRejection;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let session = app_state.sessions.session();
        match evaluate(&session) {
            RouteDecision::Allow => Ok(RequireOperator(session)),
            decision => Err(GuardRejection(decision)),
        }
    }
}

/// Extractor for requiring a super-admin session.
pub struct RequireSuperAdmin(pub Session);

impl<S> FromRequestParts<S> for RequireSuperAdmin
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = GuardRejection;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let session = app_state.sessions.session();
        match evaluate_super_admin(&session) {
            RouteDecision::Allow => Ok(RequireSuperAdmin(session)),
            decision => Err(GuardRejection(decision)),
        }
    }
}

/// Rejection carrying the guard's decision.
#[derive(Debug)]
pub struct GuardRejection(pub RouteDecision);

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        match self.0 {
            RouteDecision::Pending => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
                Json(json!({ "error": "Session is still loading" })),
            )
                .into_response(),
            RouteDecision::RedirectToSignIn => Redirect::to(SIGN_IN_PATH).into_response(),
            RouteDecision::AccessDenied { reason } => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": reason }))).into_response()
            }
            // Never constructed from an allowed decision.
            RouteDecision::Allow => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
