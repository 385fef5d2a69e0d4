//! Firebase Authentication over the Identity Toolkit REST API.
//!
//! Email/password sign-in goes through `accounts:signInWithPassword`; the
//! returned ID token authorizes document store requests and is refreshed
//! through the secure token endpoint shortly before it expires. Signing out
//! is local: the tokens are dropped and subscribers are notified.

use crate::error::AuthenticationError;
use crate::identity::{Identity, IdentityBroadcast, IdentityProvider, IdentitySubscription};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Response;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use sos_admin_core::IdentityId;
use sos_admin_store::AccessTokenSource;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the provider reports one that does not parse.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Connection settings for Firebase Authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseAuthConfig {
    /// Web API key of the Firebase project.
    api_key: String,
    /// Identity Toolkit endpoint, overridable for the local emulator.
    /// Default: "https://identitytoolkit.googleapis.com/v1"
    #[serde(default = "default_identity_endpoint")]
    identity_endpoint: String,
    /// Secure token endpoint.
    /// Default: "https://securetoken.googleapis.com/v1"
    #[serde(default = "default_token_endpoint")]
    token_endpoint: String,
}

fn default_identity_endpoint() -> String {
    "https://identitytoolkit.googleapis.com/v1".to_string()
}

fn default_token_endpoint() -> String {
    "https://securetoken.googleapis.com/v1".to_string()
}

impl FirebaseAuthConfig {
    /// Creates a configuration for the hosted service.
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            identity_endpoint: default_identity_endpoint(),
            token_endpoint: default_token_endpoint(),
        }
    }

    /// Points both endpoints at an emulator host such as `http://localhost:9099`.
    #[must_use]
    pub fn with_emulator(mut self, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        self.identity_endpoint = format!("{host}/identitytoolkit.googleapis.com/v1");
        self.token_endpoint = format!("{host}/securetoken.googleapis.com/v1");
        self
    }

    fn sign_in_url(&self) -> String {
        format!(
            "{}/accounts:signInWithPassword",
            self.identity_endpoint.trim_end_matches('/')
        )
    }

    fn refresh_url(&self) -> String {
        format!("{}/token", self.token_endpoint.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Clone)]
struct Tokens {
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Tokens {
    fn new(id_token: String, refresh_token: String, expires_in: &str) -> Self {
        let seconds = match expires_in.parse::<i64>() {
            Ok(seconds) => seconds,
            Err(e) => {
                warn!(
                    %expires_in,
                    error = %e,
                    fallback = DEFAULT_TOKEN_LIFETIME_SECS,
                    "unparseable token lifetime"
                );
                DEFAULT_TOKEN_LIFETIME_SECS
            }
        };
        Self {
            id_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(seconds),
        }
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) <= now
    }
}

/// Identity provider backed by Firebase Authentication.
pub struct FirebaseIdentityProvider {
    http: reqwest::Client,
    config: FirebaseAuthConfig,
    broadcast: IdentityBroadcast,
    tokens: Mutex<Option<Tokens>>,
}

impl FirebaseIdentityProvider {
    /// Creates a provider. Nobody is signed in until `sign_in` succeeds.
    #[must_use]
    pub fn new(http: reqwest::Client, config: FirebaseAuthConfig) -> Self {
        Self {
            http,
            config,
            broadcast: IdentityBroadcast::default(),
            tokens: Mutex::new(None),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, Report<AuthenticationError>> {
        let response = self
            .http
            .post(self.config.refresh_url())
            .query(&[("key", self.config.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| AuthenticationError::ProviderUnavailable {
                details: e.to_string(),
            })?;
        let response = error_for_status(response).await?;
        let body: RefreshResponse =
            response
                .json()
                .await
                .map_err(|e| AuthenticationError::ProviderUnavailable {
                    details: e.to_string(),
                })?;
        Ok(Tokens::new(body.id_token, body.refresh_token, &body.expires_in))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    #[instrument(skip(self, password))]
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, Report<AuthenticationError>> {
        let response = self
            .http
            .post(self.config.sign_in_url())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&SignInRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(|e| AuthenticationError::ProviderUnavailable {
                details: e.to_string(),
            })?;
        let response = error_for_status(response).await?;
        let body: SignInResponse =
            response
                .json()
                .await
                .map_err(|e| AuthenticationError::ProviderUnavailable {
                    details: e.to_string(),
                })?;

        let uid = IdentityId::new(body.local_id).map_err(|e| {
            AuthenticationError::ProviderRejected {
                code: e.to_string(),
            }
        })?;
        let identity = Identity::new(uid, body.email.unwrap_or_else(|| email.to_string()));
        *self.tokens.lock().await = Some(Tokens::new(
            body.id_token,
            body.refresh_token,
            &body.expires_in,
        ));
        debug!(uid = %identity.uid(), "signed in");
        self.broadcast.signed_in(identity.clone());
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), Report<AuthenticationError>> {
        self.tokens.lock().await.take();
        if self.broadcast.signed_out() {
            debug!("signed out");
        }
        Ok(())
    }

    fn subscribe(&self) -> IdentitySubscription {
        self.broadcast.subscribe()
    }

    fn current(&self) -> Option<Identity> {
        self.broadcast.current()
    }
}

#[async_trait]
impl AccessTokenSource for FirebaseIdentityProvider {
    async fn access_token(&self) -> Option<String> {
        let mut guard = self.tokens.lock().await;
        let tokens = guard.as_ref()?;
        if !tokens.needs_refresh(Utc::now()) {
            return Some(tokens.id_token.clone());
        }

        match self.refresh(&tokens.refresh_token).await {
            Ok(fresh) => {
                let token = fresh.id_token.clone();
                *guard = Some(fresh);
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "failed to refresh id token");
                None
            }
        }
    }
}

/// Maps an Identity Toolkit error response onto [`AuthenticationError`].
async fn error_for_status(response: Response) -> Result<Response, Report<AuthenticationError>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.is_server_error() {
        return Err(AuthenticationError::ProviderUnavailable {
            details: format!("status {status}"),
        }
        .into());
    }
    let message = response
        .json::<ErrorEnvelope>()
        .await
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| status.to_string());
    Err(classify_error_code(&message).into())
}

/// Messages look like `INVALID_PASSWORD` or `TOO_MANY_ATTEMPTS_TRY_LATER : details`.
fn classify_error_code(message: &str) -> AuthenticationError {
    let code = message.split([' ', ':']).next().unwrap_or(message);
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL"
        | "MISSING_PASSWORD" => AuthenticationError::InvalidCredentials,
        "USER_DISABLED" => AuthenticationError::AccountDisabled,
        other => AuthenticationError::ProviderRejected {
            code: other.to_string(),
        },
    }
}
