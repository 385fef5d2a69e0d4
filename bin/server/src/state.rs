//! Shared application state and backend wiring.

use crate::config::{Backend, ServerConfig};
use rootcause::prelude::Report;
use sos_admin_content::Content;
use sos_admin_platform_access::{
    AccessConfig, AdminRegistry, FirebaseAuthConfig, FirebaseIdentityProvider, IdentityProvider,
    MemoryIdentityProvider, RoleResolver, SessionListener, SessionManager,
};
use sos_admin_store::{DocumentStore, FirestoreConfig, FirestoreDocumentStore, MemoryDocumentStore};
use std::fmt;
use std::sync::Arc;

/// Errors raised while assembling the application state.
#[derive(Debug)]
pub enum StartupError {
    /// A setting is missing or malformed.
    InvalidConfig { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { details } => write!(f, "invalid configuration: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

/// Shared application state.
pub struct AppState {
    /// Owner of the operator session.
    pub sessions: SessionManager,
    /// Administrator registry.
    pub registry: AdminRegistry,
    /// Content collections.
    pub content: Content,
    _listener: SessionListener,
}

impl AppState {
    /// Wires the services together and starts following the identity provider.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        access: &AccessConfig,
    ) -> Self {
        let registry = AdminRegistry::new(store.clone());
        let resolver = RoleResolver::new(registry.clone(), access);
        let sessions = SessionManager::new(provider, resolver);
        let listener = sessions.attach();
        Self {
            sessions,
            registry,
            content: Content::new(store),
            _listener: listener,
        }
    }

    /// Builds the backends named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected backend is missing settings.
    pub fn from_config(config: &ServerConfig) -> Result<Self, Report<StartupError>> {
        match config.backend {
            Backend::Memory => {
                let accounts = config
                    .memory
                    .parse_accounts()
                    .map_err(|details| StartupError::InvalidConfig { details })?;
                let provider = MemoryIdentityProvider::new();
                for account in accounts {
                    tracing::info!(email = %account.email, "registering in-memory account");
                    provider.add_account(account.uid, account.email, account.password);
                }
                Ok(Self::new(
                    Arc::new(provider),
                    Arc::new(MemoryDocumentStore::new()),
                    &config.access,
                ))
            }
            Backend::Firebase => {
                let settings =
                    config
                        .firebase
                        .as_ref()
                        .ok_or_else(|| StartupError::InvalidConfig {
                            details: "FIREBASE__API_KEY and FIREBASE__PROJECT_ID are required"
                                .to_string(),
                        })?;
                let http = reqwest::Client::new();

                let mut auth = FirebaseAuthConfig::new(settings.api_key.clone());
                if let Some(host) = &settings.auth_emulator_host {
                    auth = auth.with_emulator(host);
                }
                let provider = Arc::new(FirebaseIdentityProvider::new(http.clone(), auth));

                let mut firestore = FirestoreConfig::new(settings.project_id.clone())
                    .with_api_key(Some(settings.api_key.clone()));
                if let Some(database) = &settings.database {
                    firestore = firestore.with_database(database.clone());
                }
                if let Some(endpoint) = &settings.firestore_endpoint {
                    firestore = firestore.with_endpoint(endpoint.clone());
                }
                let store =
                    FirestoreDocumentStore::new(http, firestore).with_token_source(provider.clone());

                Ok(Self::new(provider, Arc::new(store), &config.access))
            }
        }
    }
}
