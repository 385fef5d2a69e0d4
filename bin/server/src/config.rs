//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! `__` as separator, for example `FIREBASE__PROJECT_ID` or
//! `ACCESS__BOOTSTRAP_EMAIL`.
//!
//! See [`AccessConfig`](sos_admin_platform_access::AccessConfig) for the
//! role resolution settings.

use serde::Deserialize;
use sos_admin_core::IdentityId;
use sos_admin_platform_access::AccessConfig;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server listens on.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Which identity provider and document store to use.
    #[serde(default)]
    pub backend: Backend,

    /// Firebase settings, required for the firebase backend.
    #[serde(default)]
    pub firebase: Option<FirebaseSettings>,

    /// Accounts of the in-memory identity provider.
    #[serde(default)]
    pub memory: MemorySettings,

    /// Role resolution configuration.
    #[serde(default)]
    pub access: AccessConfig,
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

/// Backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process identity provider and document store.
    #[default]
    Memory,
    /// Firebase Authentication and Cloud Firestore.
    Firebase,
}

/// Firebase project settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseSettings {
    /// Web API key of the project.
    pub api_key: String,
    /// Google Cloud project id.
    pub project_id: String,
    /// Firestore database id.
    #[serde(default)]
    pub database: Option<String>,
    /// Auth emulator host, for example `http://localhost:9099`.
    #[serde(default)]
    pub auth_emulator_host: Option<String>,
    /// Firestore REST endpoint override, for example the emulator's.
    #[serde(default)]
    pub firestore_endpoint: Option<String>,
}

/// Settings of the in-memory backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemorySettings {
    /// Comma-separated `uid:email:password` triples.
    #[serde(default)]
    pub accounts: String,
}

/// An account of the in-memory identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAccount {
    pub uid: IdentityId,
    pub email: String,
    pub password: String,
}

impl MemorySettings {
    /// Parses the configured accounts.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first malformed entry.
    pub fn parse_accounts(&self) -> Result<Vec<MemoryAccount>, String> {
        self.accounts
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let mut parts = entry.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(uid), Some(email), Some(password)) if !email.is_empty() => {
                        let uid = IdentityId::new(uid).map_err(|e| e.to_string())?;
                        Ok(MemoryAccount {
                            uid,
                            email: email.to_string(),
                            password: password.to_string(),
                        })
                    }
                    _ => Err(format!("malformed account entry '{entry}'")),
                }
            })
            .collect()
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_accounts() {
        let settings = MemorySettings {
            accounts: "U1:admin@sos.com:secret, U2:op@sos.com:pa:ss".to_string(),
        };
        let accounts = settings.parse_accounts().expect("parse");
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].email, "admin@sos.com");
        assert_eq!(accounts[1].password, "pa:ss");
    }

    #[test]
    fn empty_accounts_are_allowed() {
        assert!(MemorySettings::default().parse_accounts().expect("parse").is_empty());
    }

    #[test]
    fn malformed_account_is_rejected() {
        let settings = MemorySettings {
            accounts: "U1-admin".to_string(),
        };
        assert!(settings.parse_accounts().is_err());
    }

    #[test]
    fn defaults_without_environment() {
        let config: ServerConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.bind_address, "127.0.0.1:3000");
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.access.bootstrap_email(), Some("admin@sos.com"));
        assert!(config.firebase.is_none());
    }

    #[test]
    fn firebase_backend_settings() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"backend":"firebase","firebase":{"api_key":"k","project_id":"sos-app"}}"#,
        )
        .expect("deserialize");
        assert_eq!(config.backend, Backend::Firebase);
        assert_eq!(
            config.firebase.map(|f| f.project_id),
            Some("sos-app".to_string())
        );
    }
}
