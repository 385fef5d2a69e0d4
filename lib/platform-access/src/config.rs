//! Access-control configuration.

use serde::{Deserialize, Serialize};

/// Configuration of the role resolver.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Email granted `super_admin` when no active registry entry exists for
    /// its identity, so the first operator can provision the registry.
    /// An empty string disables the rule.
    /// Default: "admin@sos.com"
    #[serde(default = "default_bootstrap_email")]
    bootstrap_email: String,
}

fn default_bootstrap_email() -> String {
    "admin@sos.com".to_string()
}

impl AccessConfig {
    /// Creates a configuration with the given bootstrap email.
    #[must_use]
    pub fn new(bootstrap_email: Option<String>) -> Self {
        Self {
            bootstrap_email: bootstrap_email.unwrap_or_default(),
        }
    }

    /// Returns the bootstrap email, or `None` when the rule is disabled.
    #[must_use]
    pub fn bootstrap_email(&self) -> Option<&str> {
        let email = self.bootstrap_email.trim();
        (!email.is_empty()).then_some(email)
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            bootstrap_email: default_bootstrap_email(),
        }
    }
}
