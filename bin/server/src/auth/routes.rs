//! Authentication routes for login, logout and session inspection.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sos_admin_platform_access::{AuthenticationError, LoginError, Role, Session};
use std::sync::Arc;

use crate::state::AppState;

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// Session as exposed to the dashboard client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub uid: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub loading: bool,
    pub error: Option<String>,
    pub authenticated: bool,
    pub authorized: bool,
    pub super_admin: bool,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            uid: session.identity().map(|i| i.uid().to_string()),
            email: session.identity().map(|i| i.email().to_string()),
            role: session.role(),
            loading: session.is_loading(),
            error: session.error().map(str::to_string),
            authenticated: session.is_authenticated(),
            authorized: session.is_authorized(),
            super_admin: session.is_super_admin(),
        }
    }
}

/// Signs an operator in.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionView>, AuthError> {
    state
        .sessions
        .login(&request.email, &request.password)
        .await
        .map_err(|report| AuthError::Login(report.current_context().clone()))?;
    Ok(Json(SessionView::from(&state.sessions.session())))
}

/// Signs the operator out.
pub async fn logout(State(state): State<Arc<AppState>>) -> Result<StatusCode, AuthError> {
    state
        .sessions
        .logout()
        .await
        .map_err(|report| AuthError::Logout(report.current_context().clone()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Dismisses the recorded error.
pub async fn clear_error(State(state): State<Arc<AppState>>) -> StatusCode {
    state.sessions.clear_error();
    StatusCode::NO_CONTENT
}

/// Returns the current session.
pub async fn session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(SessionView::from(&state.sessions.session()))
}

/// Re-resolves the signed-in identity, for example after a registry outage.
pub async fn refresh(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    state.sessions.refresh().await;
    Json(SessionView::from(&state.sessions.session()))
}

/// Sign-in entry point that redirects land on.
pub async fn sign_in_page(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let session = state.sessions.session();
    Json(json!({
        "signIn": { "method": "POST", "path": "/auth/login" },
        "error": session.error(),
    }))
}

/// Authentication errors.
#[derive(Debug)]
pub enum AuthError {
    Login(LoginError),
    Logout(AuthenticationError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Login(LoginError::Authentication(
                AuthenticationError::ProviderUnavailable { details },
            )) => {
                tracing::error!("Identity provider unavailable: {}", details);
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Login(LoginError::Authentication(_)) => StatusCode::UNAUTHORIZED,
            Self::Login(LoginError::Authorization(_)) => StatusCode::FORBIDDEN,
            Self::Login(LoginError::RegistryUnavailable(err)) => {
                tracing::error!("Registry unavailable during login: {}", err);
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Logout(err) => {
                tracing::error!("Sign-out failed: {}", err);
                StatusCode::BAD_GATEWAY
            }
        };
        let message = match self {
            Self::Login(err) => err.to_string(),
            Self::Logout(err) => err.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
