//! Role resolution.
//!
//! A role is derived from an identity by walking [`RESOLUTION_RULES`] in
//! order; the first rule that applies decides. The table is the whole
//! policy:
//!
//! | # | Rule                   | Role                 |
//! |---|------------------------|----------------------|
//! | 1 | no identity            | `unauthenticated`    |
//! | 2 | active registry entry  | the entry's role     |
//! | 3 | bootstrap email        | `super_admin`        |
//! | 4 | anything else          | `unauthorized`       |
//!
//! A registry read failure stops the walk with an error. It never falls
//! through to rule 3.

use crate::config::AccessConfig;
use crate::error::RegistryError;
use crate::identity::Identity;
use crate::registry::AdminRegistry;
use crate::role::Role;
use rootcause::prelude::Report;
use std::fmt;
use tracing::{debug, instrument, warn};

/// One row of the resolution table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionRule {
    NoIdentity,
    ActiveRegistryEntry,
    BootstrapEmail,
    Fallback,
}

impl fmt::Display for ResolutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoIdentity => "no_identity",
            Self::ActiveRegistryEntry => "active_registry_entry",
            Self::BootstrapEmail => "bootstrap_email",
            Self::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Resolution rules in precedence order.
pub const RESOLUTION_RULES: [ResolutionRule; 4] = [
    ResolutionRule::NoIdentity,
    ResolutionRule::ActiveRegistryEntry,
    ResolutionRule::BootstrapEmail,
    ResolutionRule::Fallback,
];

/// Outcome of a resolution: the role and the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub role: Role,
    pub rule: ResolutionRule,
}

/// Maps identities to roles.
#[derive(Clone)]
pub struct RoleResolver {
    registry: AdminRegistry,
    bootstrap_email: Option<String>,
}

impl RoleResolver {
    #[must_use]
    pub fn new(registry: AdminRegistry, config: &AccessConfig) -> Self {
        Self {
            registry,
            bootstrap_email: config.bootstrap_email().map(str::to_string),
        }
    }

    /// Returns the registry this resolver reads.
    #[must_use]
    pub fn registry(&self) -> &AdminRegistry {
        &self.registry
    }

    /// Resolves the role of an identity.
    ///
    /// On a registry hit the entry's `lastLoginAt` is refreshed in the
    /// background; failures there are logged and never affect the result.
    #[instrument(skip_all, fields(uid = identity.map(|i| i.uid().as_str())))]
    pub async fn resolve(
        &self,
        identity: Option<&Identity>,
    ) -> Result<Resolution, Report<RegistryError>> {
        for rule in RESOLUTION_RULES {
            if let Some(role) = self.apply(rule, identity).await? {
                debug!(%rule, %role, "resolved role");
                return Ok(Resolution { role, rule });
            }
        }
        Ok(Resolution {
            role: Role::Unauthorized,
            rule: ResolutionRule::Fallback,
        })
    }

    async fn apply(
        &self,
        rule: ResolutionRule,
        identity: Option<&Identity>,
    ) -> Result<Option<Role>, Report<RegistryError>> {
        let Some(identity) = identity else {
            return Ok(matches!(rule, ResolutionRule::NoIdentity).then_some(Role::Unauthenticated));
        };
        match rule {
            ResolutionRule::NoIdentity => Ok(None),
            ResolutionRule::ActiveRegistryEntry => {
                let Some(record) = self.registry.lookup(identity.uid()).await? else {
                    return Ok(None);
                };
                if !record.is_active {
                    debug!("registry entry is inactive");
                    return Ok(None);
                }
                self.spawn_touch(identity);
                Ok(Some(record.role.into()))
            }
            ResolutionRule::BootstrapEmail => Ok(self
                .bootstrap_email
                .as_deref()
                .filter(|email| *email == identity.email())
                .map(|_| Role::SuperAdmin)),
            ResolutionRule::Fallback => Ok(Some(Role::Unauthorized)),
        }
    }

    fn spawn_touch(&self, identity: &Identity) {
        let registry = self.registry.clone();
        let uid = identity.uid().clone();
        tokio::spawn(async move {
            if let Err(e) = registry.touch_last_login(&uid).await {
                warn!(%uid, error = %e, "failed to record last login");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ADMINS_COLLECTION;
    use sos_admin_core::{DocumentId, IdentityId};
    use sos_admin_store::{DocumentStore, FieldValue, Fields, MemoryDocumentStore};
    use std::sync::Arc;

    fn identity(uid: &str, email: &str) -> Identity {
        Identity::new(IdentityId::new(uid).expect("valid id"), email)
    }

    async fn seed(store: &MemoryDocumentStore, uid: &str, role: &str, active: bool) {
        let mut fields = Fields::new();
        fields.insert("email".to_string(), FieldValue::from("seed@sos.com"));
        fields.insert("role".to_string(), FieldValue::from(role));
        fields.insert("isActive".to_string(), FieldValue::from(active));
        store
            .set(ADMINS_COLLECTION, &DocumentId::new(uid).expect("valid id"), fields)
            .await
            .expect("seed");
    }

    fn resolver(store: Arc<MemoryDocumentStore>) -> RoleResolver {
        RoleResolver::new(AdminRegistry::new(store), &AccessConfig::default())
    }

    #[test]
    fn rule_order() {
        assert_eq!(
            RESOLUTION_RULES,
            [
                ResolutionRule::NoIdentity,
                ResolutionRule::ActiveRegistryEntry,
                ResolutionRule::BootstrapEmail,
                ResolutionRule::Fallback,
            ]
        );
    }

    #[tokio::test]
    async fn no_identity_is_unauthenticated() {
        let resolver = resolver(Arc::new(MemoryDocumentStore::new()));
        let resolution = resolver.resolve(None).await.expect("resolve");
        assert_eq!(resolution.role, Role::Unauthenticated);
        assert_eq!(resolution.rule, ResolutionRule::NoIdentity);
    }

    #[tokio::test]
    async fn active_entry_grants_its_role() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "U2", "admin", true).await;
        let resolver = resolver(store);

        let resolution = resolver
            .resolve(Some(&identity("U2", "op@sos.com")))
            .await
            .expect("resolve");
        assert_eq!(resolution.role, Role::Admin);
        assert_eq!(resolution.rule, ResolutionRule::ActiveRegistryEntry);
    }

    #[tokio::test]
    async fn registry_entry_wins_over_bootstrap_email() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "U1", "admin", true).await;
        let resolver = resolver(store);

        let resolution = resolver
            .resolve(Some(&identity("U1", "admin@sos.com")))
            .await
            .expect("resolve");
        assert_eq!(resolution.role, Role::Admin);
    }

    #[tokio::test]
    async fn inactive_entry_falls_through_to_bootstrap() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "U1", "admin", false).await;
        let resolver = resolver(store);

        let resolution = resolver
            .resolve(Some(&identity("U1", "admin@sos.com")))
            .await
            .expect("resolve");
        assert_eq!(resolution.role, Role::SuperAdmin);
        assert_eq!(resolution.rule, ResolutionRule::BootstrapEmail);
    }

    #[tokio::test]
    async fn inactive_entry_without_bootstrap_is_unauthorized() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "U3", "super_admin", false).await;
        let resolver = resolver(store);

        let resolution = resolver
            .resolve(Some(&identity("U3", "x@y.com")))
            .await
            .expect("resolve");
        assert_eq!(resolution.role, Role::Unauthorized);
        assert_eq!(resolution.rule, ResolutionRule::Fallback);
    }

    #[tokio::test]
    async fn bootstrap_email_is_exact_match() {
        let resolver = resolver(Arc::new(MemoryDocumentStore::new()));
        let resolution = resolver
            .resolve(Some(&identity("U4", "Admin@sos.com")))
            .await
            .expect("resolve");
        assert_eq!(resolution.role, Role::Unauthorized);
    }

    #[tokio::test]
    async fn disabled_bootstrap_rule() {
        let resolver = RoleResolver::new(
            AdminRegistry::new(Arc::new(MemoryDocumentStore::new())),
            &AccessConfig::new(None),
        );
        let resolution = resolver
            .resolve(Some(&identity("U1", "admin@sos.com")))
            .await
            .expect("resolve");
        assert_eq!(resolution.role, Role::Unauthorized);
    }

    #[tokio::test]
    async fn registry_failure_does_not_fall_back_to_bootstrap() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_reads(true);
        let resolver = resolver(store);

        let err = resolver
            .resolve(Some(&identity("U1", "admin@sos.com")))
            .await
            .unwrap_err();
        assert!(matches!(
            err.current_context(),
            RegistryError::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn hit_records_last_login() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "U2", "admin", true).await;
        let resolver = resolver(store.clone());

        resolver
            .resolve(Some(&identity("U2", "op@sos.com")))
            .await
            .expect("resolve");

        let key = DocumentId::new("U2").expect("valid id");
        for _ in 0..50 {
            let doc = store.get(ADMINS_COLLECTION, &key).await.expect("get");
            if doc.and_then(|d| d.timestamp("lastLoginAt")).is_some() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("lastLoginAt was not recorded");
    }

    #[tokio::test]
    async fn last_login_write_failure_keeps_role() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "U2", "super_admin", true).await;
        store.fail_writes(true);
        let resolver = resolver(store);

        let resolution = resolver
            .resolve(Some(&identity("U2", "op@sos.com")))
            .await
            .expect("resolve");
        assert_eq!(resolution.role, Role::SuperAdmin);
    }
}
